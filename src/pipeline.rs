//! Species fan-out / fan-in.
//!
//! The aggregation runs once and is shared read-only. Each species then runs
//! threshold → curve → join → assign on a rayon worker and hands its column
//! to the `Accumulator`. A failure inside one species is recorded in its
//! outcome and logged; sibling species and already-merged columns are not
//! affected. Failures before the fan-out (bad config, duplicate ids,
//! aggregation) abort the run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::aggregate::{Aggregation, aggregate};
use crate::analysis::assign::{AssignmentCounts, assign};
use crate::analysis::curve::build_curve;
use crate::analysis::threshold::{Threshold, threshold};
use crate::config::RunConfig;
use crate::logging::{self, Stage};
use crate::model::{ErrorClass, PipelineError, Presence, SpeciesId, SpeciesRange, StreamSegment, Watershed};
use crate::spatial::index::{Located, SpatialQuery, Zone};
use crate::table::{Accumulator, ProbabilityTable};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeciesStatus {
    /// Column written to the table.
    Merged,
    /// Species pipeline failed; no column written.
    Failed,
    /// Not attempted because an earlier species failed under `fail_fast`.
    Skipped,
}

/// What happened to one species, for logs and the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesOutcome {
    pub species: SpeciesId,
    pub status: SpeciesStatus,
    pub threshold: Option<Threshold>,
    pub curve: Option<BTreeMap<i32, f64>>,
    pub counts: Option<AssignmentCounts>,
    /// Stage the failure happened in.
    pub failed_stage: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub error: Option<String>,
}

impl SpeciesOutcome {
    fn empty(species: &str, status: SpeciesStatus) -> Self {
        SpeciesOutcome {
            species: species.to_string(),
            status,
            threshold: None,
            curve: None,
            counts: None,
            failed_stage: None,
            error_class: None,
            error: None,
        }
    }
}

/// Result of a complete run.
#[derive(Debug)]
pub struct PipelineRun {
    pub table: ProbabilityTable,
    pub aggregation: Aggregation,
    /// One entry per species, sorted by species id.
    pub outcomes: Vec<SpeciesOutcome>,
}

impl PipelineRun {
    pub fn failed(&self) -> impl Iterator<Item = &SpeciesOutcome> {
        self.outcomes.iter().filter(|o| o.status == SpeciesStatus::Failed)
    }

    pub fn merged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == SpeciesStatus::Merged)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Shared read-only context
// ---------------------------------------------------------------------------

struct SharedContext<'a> {
    config: &'a RunConfig,
    segments: &'a [StreamSegment],
    targets: Vec<Located<'a>>,
    watersheds_by_id: HashMap<&'a str, &'a Watershed>,
    aggregation: &'a Aggregation,
    spatial: &'a dyn SpatialQuery,
    accumulator: &'a Accumulator,
    stop: AtomicBool,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs the full pipeline over already-loaded features.
pub fn run_pipeline(
    config: &RunConfig,
    segments: &[StreamSegment],
    watersheds: &[Watershed],
    ranges: &[SpeciesRange],
    spatial: &dyn SpatialQuery,
) -> Result<PipelineRun, PipelineError> {
    config.validate()?;

    let mut seen = HashSet::new();
    for range in ranges {
        if !seen.insert(range.species.as_str()) {
            return Err(PipelineError::DuplicateId {
                collection: "species ranges".to_string(),
                id: range.species.clone(),
            });
        }
    }

    let table = ProbabilityTable::for_segments(segments)?;

    logging::info(
        Stage::Aggregate,
        None,
        &format!(
            "Aggregating {} segments into {} watersheds",
            segments.len(),
            watersheds.len()
        ),
    );
    let aggregation = aggregate(segments, watersheds, spatial)?;
    let stats = &aggregation.stats;
    logging::info(
        Stage::Aggregate,
        None,
        &format!(
            "{} watersheds with streams, {} without; {} segments with invalid order, {} outside all watersheds",
            aggregation.orders.len(),
            stats.watersheds_without_streams,
            stats.segments_invalid_order,
            stats.segments_outside
        ),
    );

    let accumulator = Accumulator::new(table);

    let mut ordered: Vec<&SpeciesRange> = ranges.iter().collect();
    ordered.sort_by(|a, b| a.species.cmp(&b.species));

    let ctx = SharedContext {
        config,
        segments,
        targets: segments
            .iter()
            .map(|s| Located {
                id: s.id.as_str(),
                point: s.representative_point,
            })
            .collect(),
        watersheds_by_id: watersheds.iter().map(|ws| (ws.id.as_str(), ws)).collect(),
        aggregation: &aggregation,
        spatial,
        accumulator: &accumulator,
        stop: AtomicBool::new(false),
    };

    let outcomes = fan_out(&ctx, &ordered)?;
    drop(ctx);

    let failed = outcomes
        .iter()
        .filter(|o| o.status == SpeciesStatus::Failed)
        .count();
    let merged = outcomes
        .iter()
        .filter(|o| o.status == SpeciesStatus::Merged)
        .count();
    logging::log_run_summary(outcomes.len(), merged, failed);

    Ok(PipelineRun {
        table: accumulator.into_table(),
        aggregation,
        outcomes,
    })
}

fn fan_out(ctx: &SharedContext<'_>, ranges: &[&SpeciesRange]) -> Result<Vec<SpeciesOutcome>, PipelineError> {
    let run_all = || -> Vec<SpeciesOutcome> {
        ranges
            .par_iter()
            .map(|range| process_species(ctx, range))
            .collect()
    };

    if ctx.config.pipeline.workers == 0 {
        return Ok(run_all());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.config.pipeline.workers)
        .build()
        .map_err(|e| PipelineError::Config(format!("cannot start worker pool: {}", e)))?;
    Ok(pool.install(run_all))
}

/// Runs one species and converts any failure into its outcome.
fn process_species(ctx: &SharedContext<'_>, range: &SpeciesRange) -> SpeciesOutcome {
    let species = range.species.as_str();
    if ctx.stop.load(Ordering::SeqCst) {
        logging::debug(Stage::System, Some(species), "skipped after earlier failure (fail_fast)");
        return SpeciesOutcome::empty(species, SpeciesStatus::Skipped);
    }

    let mut outcome = SpeciesOutcome::empty(species, SpeciesStatus::Failed);
    match run_species(ctx, range, &mut outcome) {
        Ok(()) => {
            outcome.status = SpeciesStatus::Merged;
        }
        Err((stage, err)) => {
            logging::log_species_failure(species, stage, &err);
            outcome.failed_stage = Some(stage.to_string());
            outcome.error_class = Some(err.class());
            outcome.error = Some(err.to_string());
            if ctx.config.pipeline.fail_fast {
                ctx.stop.store(true, Ordering::SeqCst);
            }
        }
    }
    outcome
}

/// Reduce → curve → join → assign → merge for one species. Join results and
/// the assignment are owned by this call and dropped when it returns, on
/// both paths.
fn run_species(
    ctx: &SharedContext<'_>,
    range: &SpeciesRange,
    outcome: &mut SpeciesOutcome,
) -> Result<(), (Stage, PipelineError)> {
    let species = range.species.as_str();
    let ranges_cfg = &ctx.config.ranges;

    let historical = range
        .presence(ranges_cfg.threshold_presence)
        .map_err(|e| (Stage::Reduce, e))?;
    let t = threshold(species, historical, &ctx.aggregation.orders, ctx.config.curve.domain())
        .map_err(|e| (Stage::Reduce, e))?;
    logging::info(
        Stage::Reduce,
        Some(species),
        &format!(
            "threshold {} from {}/{} range watersheds",
            t.order, t.matched_watersheds, t.range_size
        ),
    );

    let curve = build_curve(t.order, &ctx.config.curve).map_err(|e| (Stage::Curve, e))?;
    logging::debug(
        Stage::Curve,
        Some(species),
        &format!("threshold {}: {:?}", curve.threshold(), curve.to_map()),
    );
    outcome.threshold = Some(t);
    outcome.curve = Some(curve.to_map());

    let zones = assignment_zones(ctx, range).map_err(|e| (Stage::Assign, e))?;
    let joins = ctx.spatial.overlay_join(&ctx.targets, &zones);
    let assignment = assign(ctx.segments, &joins, &curve).map_err(|e| (Stage::Assign, e))?;
    drop(joins);

    let counts = assignment.counts;
    logging::info(
        Stage::Assign,
        Some(species),
        &format!(
            "{} segments in range, {} absent, {} indeterminate",
            counts.in_range, counts.absent, counts.indeterminate
        ),
    );

    ctx.accumulator
        .merge(species, &assignment.values)
        .map_err(|e| (Stage::Merge, e))?;
    outcome.counts = Some(counts);
    Ok(())
}

/// Zones segments are joined against for assignment: the species' own range
/// polygons when it came from a polygon layer and the historical set is
/// selected, otherwise the watershed polygons of the selected presence set.
fn assignment_zones<'a>(
    ctx: &SharedContext<'a>,
    range: &'a SpeciesRange,
) -> Result<Vec<Zone<'a>>, PipelineError> {
    let presence = ctx.config.ranges.assignment_presence;

    if let (Some(polygons), Presence::Historical) = (&range.polygons, presence) {
        return Ok(polygons
            .iter()
            .map(|shape| Zone {
                id: range.species.as_str(),
                shape,
            })
            .collect());
    }

    let ids = range.presence(presence)?;
    let mut zones = Vec::with_capacity(ids.len());
    let mut unknown = 0;
    for id in ids {
        match ctx.watersheds_by_id.get(id.as_str()) {
            Some(&ws) => zones.push(Zone {
                id: ws.id.as_str(),
                shape: &ws.shape,
            }),
            None => unknown += 1,
        }
    }
    if unknown > 0 {
        logging::warn(
            Stage::Assign,
            Some(&range.species),
            &format!("{} {} range ids not found in the watershed layer", unknown, presence),
        );
    }
    Ok(zones)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
