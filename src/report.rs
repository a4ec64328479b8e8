//! Run Report
//!
//! Summarises a pipeline run: which species were merged, which failed and
//! why, the threshold and curve each species got, and the aggregation
//! counts. Written as JSON for machines and markdown for people, and printed
//! to the console at the end of a run.

use chrono::Utc;
use serde::Serialize;
use std::fmt::Write as _;

use crate::analysis::aggregate::AggregateStats;
use crate::config::{CurveConfig, RunConfig};
use crate::export::write_file;
use crate::model::{PipelineError, Presence};
use crate::pipeline::{PipelineRun, SpeciesOutcome, SpeciesStatus};

// ============================================================================
// Report types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub curve: CurveConfig,
    pub threshold_presence: Presence,
    pub assignment_presence: Presence,
    pub segments: usize,
    pub aggregation: AggregateStats,
    pub species: Vec<SpeciesOutcome>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub species_total: usize,
    pub species_merged: usize,
    pub species_failed: usize,
    pub species_skipped: usize,
}

impl RunSummary {
    fn tally(outcomes: &[SpeciesOutcome]) -> Self {
        let mut summary = RunSummary {
            species_total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.status {
                SpeciesStatus::Merged => summary.species_merged += 1,
                SpeciesStatus::Failed => summary.species_failed += 1,
                SpeciesStatus::Skipped => summary.species_skipped += 1,
            }
        }
        summary
    }
}

pub fn build_report(run: &PipelineRun, config: &RunConfig) -> RunReport {
    RunReport {
        timestamp: Utc::now().to_rfc3339(),
        curve: config.curve,
        threshold_presence: config.ranges.threshold_presence,
        assignment_presence: config.ranges.assignment_presence,
        segments: run.table.row_count(),
        aggregation: run.aggregation.stats.clone(),
        species: run.outcomes.clone(),
        summary: RunSummary::tally(&run.outcomes),
    }
}

// ============================================================================
// Output
// ============================================================================

pub fn write_json(report: &RunReport, path: &str) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| PipelineError::Export(format!("report serialization: {}", e)))?;
    write_file(path, json)
}

pub fn write_markdown(report: &RunReport, path: &str) -> Result<(), PipelineError> {
    write_file(path, to_markdown(report))
}

fn status_label(status: SpeciesStatus) -> &'static str {
    match status {
        SpeciesStatus::Merged => "merged",
        SpeciesStatus::Failed => "FAILED",
        SpeciesStatus::Skipped => "skipped",
    }
}

pub fn to_markdown(report: &RunReport) -> String {
    // Writing into a String cannot fail.
    let mut md = String::new();
    let _ = writeln!(md, "# Stream Order Probability Run\n");
    let _ = writeln!(md, "Generated: {}\n", report.timestamp);

    let _ = writeln!(md, "## Parameters\n");
    let c = &report.curve;
    let _ = writeln!(
        md,
        "- Curve: rate {}, ceiling {}, above {}, orders {}..={}",
        c.rate, c.ceiling, c.above, c.min_order, c.max_order
    );
    let _ = writeln!(md, "- Threshold presence: {}", report.threshold_presence);
    let _ = writeln!(md, "- Assignment presence: {}\n", report.assignment_presence);

    let a = &report.aggregation;
    let _ = writeln!(md, "## Aggregation\n");
    let _ = writeln!(md, "| Segments | Invalid order | Outside watersheds | Watersheds | Without streams |");
    let _ = writeln!(md, "|---|---|---|---|---|");
    let _ = writeln!(
        md,
        "| {} | {} | {} | {} | {} |\n",
        a.segments_total,
        a.segments_invalid_order,
        a.segments_outside,
        a.watersheds_total,
        a.watersheds_without_streams
    );

    let _ = writeln!(md, "## Species\n");
    let _ = writeln!(md, "| Species | Status | Threshold | In range | Absent | N/A | Error |");
    let _ = writeln!(md, "|---|---|---|---|---|---|---|");
    for sp in &report.species {
        let threshold = sp
            .threshold
            .as_ref()
            .map(|t| t.order.to_string())
            .unwrap_or_else(|| "-".to_string());
        let (in_range, absent, na) = match sp.counts {
            Some(c) => (c.in_range.to_string(), c.absent.to_string(), c.indeterminate.to_string()),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let error = match (&sp.failed_stage, &sp.error) {
            (Some(stage), Some(msg)) => format!("[{}] {}", stage, msg.replace('|', "/")),
            _ => String::new(),
        };
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} |",
            sp.species,
            status_label(sp.status),
            threshold,
            in_range,
            absent,
            na,
            error
        );
    }

    let s = &report.summary;
    let _ = writeln!(
        md,
        "\n**{}/{} species merged** ({} failed, {} skipped), {} segments.",
        s.species_merged, s.species_total, s.species_failed, s.species_skipped, report.segments
    );
    md
}

pub fn print_summary(report: &RunReport) {
    let rule = "=".repeat(63);
    println!("\n{}", rule);
    println!("STREAM ORDER PROBABILITY SUMMARY");
    println!("{}", rule);
    println!();
    println!(
        "Segments:     {}  ({} invalid order, {} outside watersheds)",
        report.segments, report.aggregation.segments_invalid_order, report.aggregation.segments_outside
    );
    println!(
        "Watersheds:   {}  ({} without streams)",
        report.aggregation.watersheds_total, report.aggregation.watersheds_without_streams
    );
    println!(
        "Species:      {}/{} merged  ({} failed, {} skipped)",
        report.summary.species_merged,
        report.summary.species_total,
        report.summary.species_failed,
        report.summary.species_skipped
    );

    let failed: Vec<&SpeciesOutcome> = report
        .species
        .iter()
        .filter(|o| o.status == SpeciesStatus::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("Failed species:");
        for sp in failed {
            println!(
                "  {} [{}] {}",
                sp.species,
                sp.failed_stage.as_deref().unwrap_or("?"),
                sp.error.as_deref().unwrap_or("Unknown")
            );
        }
    }
    println!("{}", rule);
}

// ============================================================================
// Tests
// ============================================================================
