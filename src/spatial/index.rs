//! Spatial query capability consumed by the aggregator and the assigner.
//!
//! The pipeline only needs two questions answered: "which polygon contains
//! this point" and "how many of these range polygons contain this point".
//! `SpatialQuery` is the seam; `IndexedSpatialQuery` answers both with an
//! R-tree over polygon bounding boxes followed by an exact ray-cast test.

use std::collections::HashMap;

use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, Envelope, RTree, RTreeObject, SelectionFunction};

use crate::spatial::geometry::{Point, Region};

// ---------------------------------------------------------------------------
// Query inputs and outputs
// ---------------------------------------------------------------------------

/// A keyed point (segment id + representative point).
#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub id: &'a str,
    pub point: Point,
}

/// A keyed polygonal shape (watershed or range polygon).
#[derive(Debug, Clone, Copy)]
pub struct Zone<'a> {
    pub id: &'a str,
    pub shape: &'a Region,
}

/// Result of joining one target point against a set of range zones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMatch {
    /// First matching zone in input order, if any.
    pub matched: Option<String>,
    /// Number of zones containing the point.
    pub join_count: u32,
}

impl JoinMatch {
    pub fn unmatched() -> Self {
        JoinMatch {
            matched: None,
            join_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

pub trait SpatialQuery: Sync {
    /// Maps every point id to the id of the polygon containing it, or `None`.
    /// When polygons overlap, the earliest polygon in `polygons` wins.
    fn points_in_polygon(
        &self,
        points: &[Located<'_>],
        polygons: &[Zone<'_>],
    ) -> HashMap<String, Option<String>>;

    /// One-to-one containment join: every target gets an entry, with the
    /// first matching range zone and the total match count.
    fn overlay_join(
        &self,
        targets: &[Located<'_>],
        ranges: &[Zone<'_>],
    ) -> HashMap<String, JoinMatch>;
}

// ---------------------------------------------------------------------------
// R-tree implementation
// ---------------------------------------------------------------------------

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Selects boxes whose envelope contains a point.
struct BoxesAt([f64; 2]);

impl SelectionFunction<IndexedBox> for BoxesAt {
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 2]>) -> bool {
        envelope.contains_point(&self.0)
    }

    fn should_unpack_leaf(&self, leaf: &IndexedBox) -> bool {
        leaf.envelope().contains_point(&self.0)
    }
}

/// Bounding-box R-tree over a borrowed zone list.
pub struct PolygonIndex<'z> {
    zones: &'z [Zone<'z>],
    tree: RTree<IndexedBox>,
}

impl<'z> PolygonIndex<'z> {
    pub fn new(zones: &'z [Zone<'z>]) -> Self {
        let boxes: Vec<IndexedBox> = zones
            .iter()
            .enumerate()
            .filter_map(|(idx, zone)| {
                zone.shape.bbox().map(|b| {
                    GeomWithData::new(
                        Rectangle::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y]),
                        idx,
                    )
                })
            })
            .collect();
        PolygonIndex {
            zones,
            tree: RTree::bulk_load(boxes),
        }
    }

    /// Indices (into the zone list) of every zone containing `point`,
    /// ascending.
    pub fn containing(&self, point: &Point) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_with_selection_function(BoxesAt([point.x, point.y]))
            .map(|candidate| candidate.data)
            .filter(|idx| self.zones[*idx].shape.contains(point))
            .collect();
        hits.sort_unstable();
        hits
    }

    pub fn zone_id(&self, idx: usize) -> &'z str {
        self.zones[idx].id
    }
}

/// Default spatial layer: builds a `PolygonIndex` per query and evaluates
/// points in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedSpatialQuery;

impl SpatialQuery for IndexedSpatialQuery {
    fn points_in_polygon(
        &self,
        points: &[Located<'_>],
        polygons: &[Zone<'_>],
    ) -> HashMap<String, Option<String>> {
        let index = PolygonIndex::new(polygons);
        points
            .par_iter()
            .map(|p| {
                let owner = index
                    .containing(&p.point)
                    .first()
                    .map(|idx| index.zone_id(*idx).to_string());
                (p.id.to_string(), owner)
            })
            .collect()
    }

    fn overlay_join(
        &self,
        targets: &[Located<'_>],
        ranges: &[Zone<'_>],
    ) -> HashMap<String, JoinMatch> {
        if ranges.is_empty() {
            return targets
                .iter()
                .map(|t| (t.id.to_string(), JoinMatch::unmatched()))
                .collect();
        }

        let index = PolygonIndex::new(ranges);
        targets
            .par_iter()
            .map(|t| {
                let hits = index.containing(&t.point);
                let join = JoinMatch {
                    matched: hits.first().map(|idx| index.zone_id(*idx).to_string()),
                    join_count: hits.len() as u32,
                };
                (t.id.to_string(), join)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
