/// GeoJSON feature loading
///
/// Reads the flowline network, the watershed polygons and species range
/// polygons from GeoJSON FeatureCollections and converts them into the
/// pipeline's domain types.
///
/// Ids and stream orders are read from feature properties (names from
/// `config::FieldNames`). Integer ids such as NHDPlus COMIDs are rendered as
/// decimal strings; the GeoJSON `id` member is used when the property is
/// missing.

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GeoValue};
use serde_json::Value as JsonValue;
use std::fs;

use crate::config::FieldNames;
use crate::model::{PipelineError, StreamSegment, Watershed};
use crate::spatial::geometry::{Point, Polygon, Region, midpoint_along};

// ============================================================================
// Reading
// ============================================================================

/// Parses GeoJSON text that must be a FeatureCollection.
pub fn parse_feature_collection(text: &str, source: &str) -> Result<FeatureCollection, PipelineError> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| PipelineError::Parse(format!("{}: {}", source, e)))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(PipelineError::Parse(format!(
            "{}: expected a FeatureCollection",
            source
        ))),
    }
}

/// Reads a GeoJSON FeatureCollection from disk.
pub fn read_feature_collection(path: &str) -> Result<FeatureCollection, PipelineError> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    parse_feature_collection(&text, path)
}

// ============================================================================
// Attribute helpers
// ============================================================================

/// Renders an id-like JSON value as a key. Integral floats (`948010091.0`)
/// are rendered without the fraction.
fn json_to_key(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| format!("{}", f as i64))
            }
        }
        _ => None,
    }
}

pub(crate) fn feature_key(feature: &Feature, field: &str) -> Option<String> {
    if let Some(key) = feature.property(field).and_then(json_to_key) {
        return Some(key);
    }
    feature
        .id
        .as_ref()
        .and_then(|id| serde_json::to_value(id).ok())
        .and_then(|v| json_to_key(&v))
}

/// Stream order as an integer. Missing, null, non-integral or non-numeric
/// values become `None`; negative sentinels are preserved.
pub fn parse_stream_order(value: Option<&JsonValue>) -> Option<i32> {
    match value? {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).ok()
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .and_then(|f| {
                        if f >= i32::MIN as f64 && f <= i32::MAX as f64 {
                            Some(f as i32)
                        } else {
                            None
                        }
                    })
            }
        }
        JsonValue::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

// ============================================================================
// Geometry conversion
// ============================================================================

fn to_point(coords: &[f64], source: &str) -> Result<Point, PipelineError> {
    match coords {
        [x, y, ..] => Ok(Point::new(*x, *y)),
        _ => Err(PipelineError::Parse(format!(
            "{}: coordinate has fewer than two values",
            source
        ))),
    }
}

fn to_ring(ring: &[Vec<f64>], source: &str) -> Result<Vec<Point>, PipelineError> {
    ring.iter().map(|c| to_point(c, source)).collect()
}

fn to_polygon(rings: &[Vec<Vec<f64>>], source: &str) -> Result<Option<Polygon>, PipelineError> {
    let Some((exterior, holes)) = rings.split_first() else {
        return Ok(None);
    };
    let exterior = to_ring(exterior, source)?;
    let holes = holes
        .iter()
        .map(|h| to_ring(h, source))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Polygon::new(exterior, holes)))
}

fn collect_polygons(geometry: &Geometry, source: &str, out: &mut Vec<Polygon>) -> Result<(), PipelineError> {
    match &geometry.value {
        GeoValue::Polygon(rings) => {
            if let Some(poly) = to_polygon(rings, source)? {
                out.push(poly);
            }
        }
        GeoValue::MultiPolygon(polys) => {
            for rings in polys {
                if let Some(poly) = to_polygon(rings, source)? {
                    out.push(poly);
                }
            }
        }
        GeoValue::GeometryCollection(parts) => {
            for part in parts {
                collect_polygons(part, source, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Polygonal content of a feature, or `None` if it has none.
fn feature_region(feature: &Feature, source: &str) -> Result<Option<Region>, PipelineError> {
    let Some(geometry) = &feature.geometry else {
        return Ok(None);
    };
    let mut polygons = Vec::new();
    collect_polygons(geometry, source, &mut polygons)?;
    if polygons.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Region::new(polygons)))
    }
}

/// Representative point of a flowline: halfway along a line, or the point
/// itself for point features.
fn representative_point(geometry: &Geometry, source: &str) -> Result<Option<Point>, PipelineError> {
    match &geometry.value {
        GeoValue::Point(c) => to_point(c, source).map(Some),
        GeoValue::LineString(line) => {
            let line = to_ring(line, source)?;
            Ok(midpoint_along(&[line]))
        }
        GeoValue::MultiLineString(lines) => {
            let parts = lines
                .iter()
                .map(|l| to_ring(l, source))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(midpoint_along(&parts))
        }
        _ => Ok(None),
    }
}

// ============================================================================
// Domain conversion
// ============================================================================

/// Converts flowline features into stream segments.
pub fn segments_from_collection(
    fc: &FeatureCollection,
    fields: &FieldNames,
) -> Result<Vec<StreamSegment>, PipelineError> {
    fc.features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let source = format!("flowline feature {}", i);
            let id = feature_key(feature, &fields.segment_id).ok_or_else(|| {
                PipelineError::Parse(format!("{}: missing {}", source, fields.segment_id))
            })?;
            let point = match &feature.geometry {
                Some(geometry) => representative_point(geometry, &source)?,
                None => None,
            }
            .ok_or_else(|| {
                PipelineError::Parse(format!("{} ({}): no line or point geometry", source, id))
            })?;
            Ok(StreamSegment {
                stream_order: parse_stream_order(feature.property(&fields.stream_order)),
                id,
                representative_point: point,
            })
        })
        .collect()
}

/// Converts watershed features into watersheds. Non-polygon features are an
/// error; a watershed without a shape cannot contain anything.
pub fn watersheds_from_collection(
    fc: &FeatureCollection,
    fields: &FieldNames,
) -> Result<Vec<Watershed>, PipelineError> {
    fc.features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let source = format!("watershed feature {}", i);
            let id = feature_key(feature, &fields.watershed_id).ok_or_else(|| {
                PipelineError::Parse(format!("{}: missing {}", source, fields.watershed_id))
            })?;
            let shape = feature_region(feature, &source)?.ok_or_else(|| {
                PipelineError::Parse(format!("{} ({}): no polygon geometry", source, id))
            })?;
            Ok(Watershed { id, shape })
        })
        .collect()
}

/// Every polygon region in a range layer. Non-polygon features are skipped.
pub fn regions_from_collection(fc: &FeatureCollection, source: &str) -> Result<Vec<Region>, PipelineError> {
    let mut regions = Vec::new();
    for feature in &fc.features {
        if let Some(region) = feature_region(feature, source)? {
            regions.push(region);
        }
    }
    Ok(regions)
}

pub fn load_segments(path: &str, fields: &FieldNames) -> Result<(FeatureCollection, Vec<StreamSegment>), PipelineError> {
    let fc = read_feature_collection(path)?;
    let segments = segments_from_collection(&fc, fields)?;
    Ok((fc, segments))
}

pub fn load_watersheds(path: &str, fields: &FieldNames) -> Result<Vec<Watershed>, PipelineError> {
    let fc = read_feature_collection(path)?;
    watersheds_from_collection(&fc, fields)
}

// ============================================================================
// Tests
// ============================================================================
