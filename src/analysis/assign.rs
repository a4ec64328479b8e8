//! Per-segment probability assignment for one species.
//!
//! Each segment is evaluated on its own from two inputs: how many of the
//! species' range polygons contain it (the join count) and its stream order.
//! The evaluation rule is a `ProbabilityPolicy` value; a species' curve is
//! the standard policy.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::analysis::curve::ProbabilityCurve;
use crate::model::{CellValue, PipelineError, SegmentId, StreamSegment};
use crate::spatial::index::JoinMatch;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Turns (join count, stream order) into a table cell for one segment.
pub trait ProbabilityPolicy: Sync {
    fn evaluate(
        &self,
        segment: &str,
        stream_order: Option<i32>,
        join_count: u32,
    ) -> Result<CellValue, PipelineError>;
}

impl ProbabilityPolicy for ProbabilityCurve {
    fn evaluate(
        &self,
        segment: &str,
        stream_order: Option<i32>,
        join_count: u32,
    ) -> Result<CellValue, PipelineError> {
        if join_count == 0 {
            return Ok(CellValue::Absent);
        }
        let order = match stream_order {
            Some(order) if order > 0 => order,
            _ => return Ok(CellValue::Indeterminate),
        };
        match self.get(order) {
            Some(p) => Ok(CellValue::Probability(p)),
            None => {
                let domain = self.domain();
                Err(PipelineError::DomainViolation {
                    segment: segment.to_string(),
                    stream_order: order,
                    min_order: domain.min,
                    max_order: domain.max,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Cell counts for one species column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentCounts {
    pub in_range: usize,
    pub absent: usize,
    pub indeterminate: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub values: BTreeMap<SegmentId, CellValue>,
    pub counts: AssignmentCounts,
}

/// Evaluates `policy` for every segment.
///
/// `joins` is the overlay join of the segments against the species' range;
/// a segment missing from it is treated as unmatched. The first domain
/// violation aborts the whole assignment.
pub fn assign(
    segments: &[StreamSegment],
    joins: &HashMap<String, JoinMatch>,
    policy: &dyn ProbabilityPolicy,
) -> Result<Assignment, PipelineError> {
    let mut values = BTreeMap::new();
    let mut counts = AssignmentCounts::default();

    for segment in segments {
        let join_count = joins.get(&segment.id).map(|j| j.join_count).unwrap_or(0);
        let cell = policy.evaluate(&segment.id, segment.stream_order, join_count)?;
        match cell {
            CellValue::Probability(_) => counts.in_range += 1,
            CellValue::Absent => counts.absent += 1,
            CellValue::Indeterminate => counts.indeterminate += 1,
        }
        values.insert(segment.id.clone(), cell);
    }

    Ok(Assignment { values, counts })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
