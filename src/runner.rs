//! Config-driven run: load inputs, run the pipeline, write every configured
//! output.

use geojson::FeatureCollection;

use crate::config::RunConfig;
use crate::export;
use crate::ingest::{features, ranges};
use crate::logging::{self, Stage};
use crate::model::{PipelineError, SpeciesRange, StreamSegment, Watershed};
use crate::pipeline::{PipelineRun, run_pipeline};
use crate::report::{self, RunReport};
use crate::spatial::index::{IndexedSpatialQuery, SpatialQuery};

pub struct LoadedInputs {
    /// Kept for the GeoJSON export.
    pub flowlines: FeatureCollection,
    pub segments: Vec<StreamSegment>,
    pub watersheds: Vec<Watershed>,
    pub ranges: Vec<SpeciesRange>,
}

pub fn load_inputs(config: &RunConfig, spatial: &dyn SpatialQuery) -> Result<LoadedInputs, PipelineError> {
    config.require_inputs()?;
    let inputs = &config.inputs;
    let missing = |name: &str| PipelineError::Config(format!("inputs.{} is required", name));

    let flowline_path = inputs.flowlines.as_deref().ok_or_else(|| missing("flowlines"))?;
    let (flowlines, segments) = features::load_segments(flowline_path, &config.fields)?;
    logging::info(
        Stage::Ingest,
        None,
        &format!("Loaded {} segments from {}", segments.len(), flowline_path),
    );

    let watershed_path = inputs.watersheds.as_deref().ok_or_else(|| missing("watersheds"))?;
    let watersheds = features::load_watersheds(watershed_path, &config.fields)?;
    logging::info(
        Stage::Ingest,
        None,
        &format!("Loaded {} watersheds from {}", watersheds.len(), watershed_path),
    );

    let mut species_ranges = match (&inputs.range_table, &inputs.range_dir) {
        (Some(table), _) => ranges::load_range_table(table)?,
        (None, Some(dir)) => ranges::load_polygon_ranges(dir, &config.ranges.exclude, &watersheds, spatial)?,
        (None, None) => return Err(missing("range_table or inputs.range_dir")),
    };
    species_ranges.retain(|r| !config.ranges.exclude.contains(&r.species));
    logging::info(
        Stage::Ingest,
        None,
        &format!("Loaded ranges for {} species", species_ranges.len()),
    );

    Ok(LoadedInputs {
        flowlines,
        segments,
        watersheds,
        ranges: species_ranges,
    })
}

/// Writes every output named in `[output]`. Export failures are returned;
/// the table itself is already complete at this point.
pub fn write_outputs(
    config: &RunConfig,
    inputs: &LoadedInputs,
    run: &PipelineRun,
    report: &RunReport,
) -> Result<(), PipelineError> {
    let out = &config.output;

    if let Some(path) = &out.geojson {
        let n = export::geojson::write_geojson(path, &inputs.flowlines, &run.table, &config.fields)?;
        logging::info(Stage::Export, None, &format!("Wrote {} features to {}", n, path));
    }
    if let Some(path) = &out.report_json {
        report::write_json(report, path)?;
        logging::info(Stage::Export, None, &format!("Wrote JSON report to {}", path));
    }
    if let Some(path) = &out.report_markdown {
        report::write_markdown(report, path)?;
        logging::info(Stage::Export, None, &format!("Wrote markdown report to {}", path));
    }
    if let Some(table_name) = &out.postgres_table {
        let mut client = export::postgres::connect()?;
        let rows = export::postgres::write_table(&mut client, table_name, &run.table)?;
        export::postgres::record_run(&mut client, table_name, report)?;
        logging::info(
            Stage::Export,
            None,
            &format!("Upserted {} rows into {}", rows, table_name),
        );
    }
    Ok(())
}

/// Full run from a loaded configuration. Species failures are in the
/// report; an `Err` means the run as a whole could not complete.
pub fn run(config: &RunConfig) -> Result<(PipelineRun, RunReport), PipelineError> {
    let spatial = IndexedSpatialQuery;
    let inputs = load_inputs(config, &spatial)?;
    let run = run_pipeline(config, &inputs.segments, &inputs.watersheds, &inputs.ranges, &spatial)?;
    let report = report::build_report(&run, config);
    write_outputs(config, &inputs, &run, &report)?;
    Ok((run, report))
}
