/// End-to-end tests for the stream order probability pipeline
///
/// Tests verify:
/// 1. A full config-driven run from GeoJSON and TOML files on disk
/// 2. Per-species thresholds and probabilities in the output table
/// 3. A species with a broken range fails alone
/// 4. GeoJSON and report outputs are written
/// 5. Polygon-directory ranges
/// 6. Output directories that do not exist yet are created
///
/// Inputs are written to a per-test temporary directory.
///
/// Run with: cargo test --test pipeline_integration

use std::fs;
use std::path::PathBuf;

use streamprob::config::{RunConfig, parse_config};
use streamprob::model::{CellValue, ErrorClass};
use streamprob::pipeline::SpeciesStatus;
use streamprob::runner;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("streamprob_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn square(min_x: f64, max_x: f64) -> String {
    format!(
        "[[[{min_x}, 0], [{max_x}, 0], [{max_x}, 10], [{min_x}, 10], [{min_x}, 0]]]"
    )
}

/// Three side-by-side HUC12s, 10 units wide.
fn watersheds_geojson() -> String {
    let feature = |huc: &str, min_x: f64| {
        format!(
            r#"{{"type": "Feature", "properties": {{"HUC_12": "{}"}},
                "geometry": {{"type": "Polygon", "coordinates": {}}}}}"#,
            huc,
            square(min_x, min_x + 10.0)
        )
    };
    format!(
        r#"{{"type": "FeatureCollection", "features": [{}, {}, {}]}}"#,
        feature("180201250701", 0.0),
        feature("180201250702", 10.0),
        feature("180201250703", 20.0)
    )
}

/// Horizontal flowlines at y = 5; the representative point is the midpoint.
fn flowlines_geojson() -> String {
    let segments: [(i64, &str, f64); 6] = [
        (948010001, "1", 2.0),
        (948010002, "3", 4.0),
        (948010003, "5", 12.0),
        (948010004, "4", 14.0),
        (948010005, "-9", 16.0),
        (948010006, "2", 22.0),
    ];
    let features: Vec<String> = segments
        .iter()
        .map(|(comid, order, x)| {
            format!(
                r#"{{"type": "Feature", "properties": {{"COMID": {}, "StreamOrde": {}}},
                    "geometry": {{"type": "LineString", "coordinates": [[{}, 5], [{}, 5]]}}}}"#,
                comid,
                order,
                x - 1.0,
                x + 1.0
            )
        })
        .collect();
    format!(
        r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
        features.join(", ")
    )
}

const RANGE_TABLE: &str = r#"
[[species]]
name = "hardhead"
historical = ["180201250701", "180201250702"]

[[species]]
name = "ghost"
historical = ["999999999999"]

[[species]]
name = "rainbow_trout"
historical = ["180201250703"]
"#;

fn write_inputs(dir: &PathBuf) -> (String, String) {
    let flowlines = dir.join("flowlines.geojson");
    let watersheds = dir.join("huc12.geojson");
    fs::write(&flowlines, flowlines_geojson()).unwrap();
    fs::write(&watersheds, watersheds_geojson()).unwrap();
    (
        flowlines.to_string_lossy().into_owned(),
        watersheds.to_string_lossy().into_owned(),
    )
}

fn path_str(p: PathBuf) -> String {
    p.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Range table runs
// ---------------------------------------------------------------------------

fn table_config(dir: &PathBuf) -> RunConfig {
    let (flowlines, watersheds) = write_inputs(dir);
    let range_table = dir.join("ranges.toml");
    fs::write(&range_table, RANGE_TABLE).unwrap();

    let mut config = RunConfig::default();
    config.inputs.flowlines = Some(flowlines);
    config.inputs.watersheds = Some(watersheds);
    config.inputs.range_table = Some(path_str(range_table));
    config.output.geojson = Some(path_str(dir.join("out.geojson")));
    config.output.report_json = Some(path_str(dir.join("report.json")));
    config.output.report_markdown = Some(path_str(dir.join("report.md")));
    config
}

#[test]
fn test_full_run_from_range_table() {
    let dir = scratch_dir("table");
    let config = table_config(&dir);

    let (run, report) = runner::run(&config).expect("run completes");

    let hardhead = run.outcomes.iter().find(|o| o.species == "hardhead").unwrap();
    assert_eq!(hardhead.status, SpeciesStatus::Merged);
    assert_eq!(hardhead.threshold.as_ref().unwrap().order, 3);

    let t = &run.table;
    assert_eq!(t.row_count(), 6);
    assert_eq!(t.get("948010004", "hardhead"), Some(CellValue::Probability(1.0)));
    assert_eq!(t.get("948010002", "hardhead"), Some(CellValue::Probability(0.9)));
    assert_eq!(t.get("948010005", "hardhead"), Some(CellValue::Indeterminate));
    assert_eq!(t.get("948010006", "hardhead"), Some(CellValue::Absent));
    assert_eq!(t.get("948010006", "rainbow_trout"), Some(CellValue::Probability(0.9)));

    println!("Species merged: {}/{}", report.summary.species_merged, report.summary.species_total);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_broken_range_fails_alone() {
    let dir = scratch_dir("isolation");
    let config = table_config(&dir);

    let (run, report) = runner::run(&config).expect("run completes");

    let ghost = run.outcomes.iter().find(|o| o.species == "ghost").unwrap();
    assert_eq!(ghost.status, SpeciesStatus::Failed);
    assert_eq!(ghost.error_class, Some(ErrorClass::DataIntegrity));
    assert!(run.table.column("ghost").is_none());

    assert_eq!(report.summary.species_merged, 2);
    assert_eq!(report.summary.species_failed, 1);
    assert_eq!(run.table.species().len(), 2);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_outputs_are_written() {
    let dir = scratch_dir("outputs");
    let config = table_config(&dir);
    runner::run(&config).expect("run completes");

    let geojson: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("out.geojson")).unwrap()).unwrap();
    let features = geojson["features"].as_array().unwrap();
    assert_eq!(features.len(), 6);
    let indeterminate = features
        .iter()
        .find(|f| f["properties"]["COMID"] == 948010005)
        .unwrap();
    assert_eq!(indeterminate["properties"]["hardhead"], "N/A");
    assert!(indeterminate["properties"].get("ghost").is_none());

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["summary"]["species_total"], 3);

    let md = fs::read_to_string(dir.join("report.md")).unwrap();
    assert!(md.contains("| ghost | FAILED |"));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_outputs_create_missing_directories() {
    let dir = scratch_dir("outdir");
    let mut config = table_config(&dir);
    let out = dir.join("out").join("run_1");
    assert!(!out.exists());
    config.output.geojson = Some(path_str(out.join("flowlines_probability.geojson")));
    config.output.report_json = Some(path_str(out.join("report.json")));
    config.output.report_markdown = Some(path_str(dir.join("md").join("report.md")));

    runner::run(&config).expect("outputs land in freshly created directories");

    assert!(out.join("flowlines_probability.geojson").is_file());
    assert!(out.join("report.json").is_file());
    assert!(dir.join("md").join("report.md").is_file());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_excluded_species_are_not_run() {
    let dir = scratch_dir("exclude");
    let mut config = table_config(&dir);
    config.ranges.exclude = vec!["ghost".to_string()];

    let (run, _) = runner::run(&config).expect("run completes");
    assert_eq!(run.outcomes.len(), 2);
    assert!(run.failed().next().is_none());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_inputs_abort_before_running() {
    let config = RunConfig::default();
    assert!(runner::run(&config).is_err());
}

// ---------------------------------------------------------------------------
// Polygon range directory
// ---------------------------------------------------------------------------

#[test]
fn test_full_run_from_range_polygons() {
    let dir = scratch_dir("polygons");
    let (flowlines, watersheds) = write_inputs(&dir);
    let range_dir = dir.join("ranges");
    fs::create_dir_all(&range_dir).unwrap();

    // Covers the first two watersheds.
    fs::write(
        range_dir.join("hardhead.geojson"),
        format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{}},
                  "geometry": {{"type": "Polygon", "coordinates": {}}}}}]}}"#,
            square(-1.0, 19.5)
        ),
    )
    .unwrap();
    // State outline sitting in the same directory.
    fs::write(range_dir.join("HUC12FullState.geojson"), watersheds_geojson()).unwrap();

    let text = format!(
        r#"
        [inputs]
        flowlines = "{}"
        watersheds = "{}"
        range_dir = "{}"

        [ranges]
        exclude = ["HUC12FullState"]

        [pipeline]
        workers = 2
        "#,
        flowlines,
        watersheds,
        path_str(range_dir)
    );
    let config = parse_config(&text).expect("valid config");

    let (run, _) = runner::run(&config).expect("run completes");
    assert_eq!(run.outcomes.len(), 1);
    assert_eq!(run.outcomes[0].threshold.as_ref().unwrap().order, 3);
    assert_eq!(run.table.get("948010003", "hardhead"), Some(CellValue::Probability(1.0)));
    assert_eq!(run.table.get("948010006", "hardhead"), Some(CellValue::Absent));
    fs::remove_dir_all(&dir).ok();
}
