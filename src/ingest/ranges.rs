/// Species range sources
///
/// Two ways to describe where a species occurs:
///
/// - a TOML membership table listing HUC12 ids per species, with an
///   optional separate `current` presence set;
/// - a directory of per-species GeoJSON polygon layers (file stem = species
///   id). A layer's watershed set is every watershed whose centroid lies in
///   one of its polygons, and the polygons themselves are used when joining
///   segments to the range.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::features::{read_feature_collection, regions_from_collection};
use crate::logging::{self, Stage};
use crate::model::{PipelineError, SpeciesRange, Watershed};
use crate::spatial::geometry::Region;
use crate::spatial::index::{Located, SpatialQuery, Zone};

// ============================================================================
// Membership table
// ============================================================================

#[derive(Debug, Deserialize)]
struct RangeTableFile {
    #[serde(default)]
    species: Vec<RangeEntry>,
}

#[derive(Debug, Deserialize)]
struct RangeEntry {
    name: String,
    historical: Vec<String>,
    current: Option<Vec<String>>,
}

/// Parses a membership table:
///
/// ```toml
/// [[species]]
/// name = "hardhead"
/// historical = ["180201250701", "180201250702"]
/// current = ["180201250702"]
/// ```
pub fn parse_range_table(text: &str) -> Result<Vec<SpeciesRange>, PipelineError> {
    let file: RangeTableFile =
        toml::from_str(text).map_err(|e| PipelineError::Parse(format!("range table: {}", e)))?;

    let mut seen = HashSet::new();
    let mut ranges = Vec::with_capacity(file.species.len());
    for entry in file.species {
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            return Err(PipelineError::Parse("range table: species with empty name".to_string()));
        }
        if !seen.insert(name.clone()) {
            return Err(PipelineError::DuplicateId {
                collection: "range table".to_string(),
                id: name,
            });
        }
        ranges.push(SpeciesRange {
            species: name,
            historical: entry.historical.into_iter().collect(),
            current: entry.current.map(|c| c.into_iter().collect()),
            polygons: None,
        });
    }
    Ok(ranges)
}

pub fn load_range_table(path: &str) -> Result<Vec<SpeciesRange>, PipelineError> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    parse_range_table(&text)
}

// ============================================================================
// Polygon layers
// ============================================================================

/// Lists `*.geojson` files in `dir` as `(species, path)`, sorted by species,
/// skipping stems in `exclude`.
pub fn discover_range_layers(dir: &str, exclude: &[String]) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut layers = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        let is_geojson = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("geojson"));
        if !is_geojson {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        if exclude.iter().any(|x| x == &stem) {
            continue;
        }
        layers.push((stem, path));
    }
    layers.sort();
    Ok(layers)
}

/// Watersheds whose centroid lies inside any of `ranges`.
pub fn watersheds_with_center_in(
    watersheds: &[Watershed],
    ranges: &[Region],
    spatial: &dyn SpatialQuery,
) -> BTreeSet<String> {
    let centroids: Vec<Located<'_>> = watersheds
        .iter()
        .filter_map(|ws| {
            ws.shape.centroid().map(|point| Located {
                id: ws.id.as_str(),
                point,
            })
        })
        .collect();
    let labels: Vec<String> = (0..ranges.len()).map(|i| format!("range_{}", i)).collect();
    let zones: Vec<Zone<'_>> = ranges
        .iter()
        .zip(&labels)
        .map(|(shape, id)| Zone { id: id.as_str(), shape })
        .collect();

    spatial
        .points_in_polygon(&centroids, &zones)
        .into_iter()
        .filter_map(|(huc, owner)| owner.map(|_| huc))
        .collect()
}

/// Loads every polygon layer in `dir` as a species range. Layers without
/// polygons are skipped with a warning.
pub fn load_polygon_ranges(
    dir: &str,
    exclude: &[String],
    watersheds: &[Watershed],
    spatial: &dyn SpatialQuery,
) -> Result<Vec<SpeciesRange>, PipelineError> {
    let mut ranges = Vec::new();
    for (species, path) in discover_range_layers(dir, exclude)? {
        let path_str = path_to_string(&path);
        let fc = read_feature_collection(&path_str)?;
        let regions = regions_from_collection(&fc, &path_str)?;
        if regions.is_empty() {
            logging::warn(
                Stage::Ingest,
                Some(&species),
                &format!("{} has no polygon features, skipping", path_str),
            );
            continue;
        }
        let historical = watersheds_with_center_in(watersheds, &regions, spatial);
        logging::debug(
            Stage::Ingest,
            Some(&species),
            &format!("{} range polygons cover {} watersheds", regions.len(), historical.len()),
        );
        ranges.push(SpeciesRange {
            species,
            historical,
            current: None,
            polygons: Some(regions),
        });
    }
    Ok(ranges)
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Presence;
    use crate::spatial::geometry::Polygon;
    use crate::spatial::index::IndexedSpatialQuery;

    #[test]
    fn test_range_table_parses_both_presence_sets() {
        let text = r#"
            [[species]]
            name = "hardhead"
            historical = ["180201250701", "180201250702", "180201250701"]
            current = ["180201250702"]

            [[species]]
            name = "rainbow_trout"
            historical = ["180201251002"]
        "#;
        let ranges = parse_range_table(text).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].historical.len(), 2, "duplicates collapse");
        assert_eq!(ranges[0].presence(Presence::Current).unwrap().len(), 1);
        assert!(ranges[1].current.is_none());
    }

    #[test]
    fn test_duplicate_species_is_rejected() {
        let text = r#"
            [[species]]
            name = "hardhead"
            historical = ["A"]
            [[species]]
            name = "hardhead"
            historical = ["B"]
        "#;
        assert!(matches!(parse_range_table(text), Err(PipelineError::DuplicateId { .. })));
    }

    #[test]
    fn test_missing_historical_list_is_a_parse_error() {
        let text = "[[species]]\nname = \"hardhead\"\n";
        assert!(matches!(parse_range_table(text), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_watershed_selected_by_center_not_overlap() {
        let watersheds = vec![
            Watershed {
                id: "inside".to_string(),
                shape: Region::new(vec![Polygon::rectangle(0.0, 0.0, 4.0, 4.0)]),
            },
            Watershed {
                id: "straddling".to_string(),
                // Overlaps the range but its centroid (7, 2) is outside.
                shape: Region::new(vec![Polygon::rectangle(4.0, 0.0, 10.0, 4.0)]),
            },
        ];
        let range = vec![Region::new(vec![Polygon::rectangle(-1.0, -1.0, 5.0, 5.0)])];

        let selected = watersheds_with_center_in(&watersheds, &range, &IndexedSpatialQuery);
        assert!(selected.contains("inside"));
        assert!(!selected.contains("straddling"));
    }

    #[test]
    fn test_discover_skips_excluded_and_non_geojson() {
        let dir = std::env::temp_dir().join(format!("streamprob_ranges_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["hardhead.geojson", "HUC12FullState.geojson", "notes.txt", "chinook.GeoJSON"] {
            fs::write(dir.join(name), "{}").unwrap();
        }

        let layers = discover_range_layers(
            dir.to_str().unwrap(),
            &["HUC12FullState".to_string()],
        )
        .unwrap();
        let names: Vec<&str> = layers.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["chinook", "hardhead"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_geometry_collection_layer_is_loaded() {
        let dir = std::env::temp_dir().join(format!("streamprob_gc_ranges_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("hardhead.geojson"),
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "GeometryCollection", "geometries": [
                    {"type": "Point", "coordinates": [50, 50]},
                    {"type": "Polygon", "coordinates": [[[-1, -1], [5, -1], [5, 5], [-1, 5], [-1, -1]]]}
                 ]}}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("ghost.geojson"),
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [2, 2]}}]}"#,
        )
        .unwrap();
        let watersheds = vec![Watershed {
            id: "inside".to_string(),
            shape: Region::new(vec![Polygon::rectangle(0.0, 0.0, 4.0, 4.0)]),
        }];

        let ranges =
            load_polygon_ranges(dir.to_str().unwrap(), &[], &watersheds, &IndexedSpatialQuery).unwrap();
        assert_eq!(ranges.len(), 1, "point-only layer is skipped");
        assert_eq!(ranges[0].species, "hardhead");
        assert!(ranges[0].historical.contains("inside"));
        assert_eq!(ranges[0].polygons.as_ref().map(Vec::len), Some(1));

        fs::remove_dir_all(&dir).ok();
    }
}
