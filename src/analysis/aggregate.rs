//! Per-watershed maximum stream order.
//!
//! Every segment with a real stream order (> 0) is attributed to the
//! watershed containing its representative point; each watershed keeps the
//! largest order attributed to it. Watersheds that receive nothing stay out
//! of the result map entirely.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::{PipelineError, StreamSegment, Watershed, WatershedOrders};
use crate::spatial::index::{Located, SpatialQuery, Zone};

/// Counts collected while aggregating, for logs and the run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub segments_total: usize,
    /// Missing, zero or negative (coastline) orders.
    pub segments_invalid_order: usize,
    /// Valid segments whose point fell outside every watershed.
    pub segments_outside: usize,
    pub watersheds_total: usize,
    pub watersheds_without_streams: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub orders: WatershedOrders,
    pub stats: AggregateStats,
}

/// Computes the maximum valid stream order inside every watershed.
///
/// Fails only on duplicate watershed ids, since the result is keyed by id.
pub fn aggregate(
    segments: &[StreamSegment],
    watersheds: &[Watershed],
    spatial: &dyn SpatialQuery,
) -> Result<Aggregation, PipelineError> {
    let mut seen = HashSet::with_capacity(watersheds.len());
    for ws in watersheds {
        if !seen.insert(ws.id.as_str()) {
            return Err(PipelineError::DuplicateId {
                collection: "watersheds".to_string(),
                id: ws.id.clone(),
            });
        }
    }

    let valid: Vec<(&StreamSegment, i32)> = segments
        .iter()
        .filter_map(|s| s.valid_order().map(|order| (s, order)))
        .collect();

    let points: Vec<Located<'_>> = valid
        .iter()
        .map(|(s, _)| Located {
            id: s.id.as_str(),
            point: s.representative_point,
        })
        .collect();
    let zones: Vec<Zone<'_>> = watersheds
        .iter()
        .map(|ws| Zone {
            id: ws.id.as_str(),
            shape: &ws.shape,
        })
        .collect();

    let owners = spatial.points_in_polygon(&points, &zones);

    let mut orders = WatershedOrders::new();
    let mut outside = 0;
    for (segment, order) in &valid {
        match owners.get(&segment.id).and_then(|o| o.as_ref()) {
            Some(huc) => {
                let entry = orders.entry(huc.clone()).or_insert(*order);
                if *order > *entry {
                    *entry = *order;
                }
            }
            None => outside += 1,
        }
    }

    let stats = AggregateStats {
        segments_total: segments.len(),
        segments_invalid_order: segments.len() - valid.len(),
        segments_outside: outside,
        watersheds_total: watersheds.len(),
        watersheds_without_streams: watersheds.len() - orders.len(),
    };

    Ok(Aggregation { orders, stats })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
