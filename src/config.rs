/// Run configuration for the probability pipeline.
///
/// Loaded from a TOML file (see `streamprob.toml`). Every section has
/// defaults, so a file only needs the input paths. The configuration is an
/// explicit value passed into each pipeline stage; nothing reads it from
/// global state.

use serde::{Deserialize, Serialize};
use std::fs;

use crate::logging::LogLevel;
use crate::model::{PipelineError, Presence};

/// Widest stream-order domain a curve may span.
pub const MAX_DOMAIN_WIDTH: i64 = 100;

// ---------------------------------------------------------------------------
// Curve parameters
// ---------------------------------------------------------------------------

/// Probability curve parameters and the stream-order domain it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    /// Exponential decay base below the threshold, in (0, 1).
    pub rate: f64,
    /// Probability at the threshold order, in (0, 1].
    pub ceiling: f64,
    /// Probability above the threshold order, in [0, 1].
    pub above: f64,
    /// Lowest stream order in the curve domain (inclusive).
    pub min_order: i32,
    /// Highest stream order in the curve domain (inclusive).
    pub max_order: i32,
}

impl Default for CurveConfig {
    fn default() -> Self {
        CurveConfig {
            rate: 0.5,
            ceiling: 0.9,
            above: 1.0,
            min_order: 1,
            max_order: 10,
        }
    }
}

impl CurveConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.rate > 0.0 && self.rate < 1.0) {
            return Err(PipelineError::Config(format!(
                "curve.rate must be in the open interval (0, 1), got {}",
                self.rate
            )));
        }
        if !(self.ceiling > 0.0 && self.ceiling <= 1.0) {
            return Err(PipelineError::Config(format!(
                "curve.ceiling must be in (0, 1], got {}",
                self.ceiling
            )));
        }
        if !(0.0..=1.0).contains(&self.above) {
            return Err(PipelineError::Config(format!(
                "curve.above must be in [0, 1], got {}",
                self.above
            )));
        }
        if self.min_order < 1 {
            return Err(PipelineError::Config(format!(
                "curve.min_order must be at least 1, got {}",
                self.min_order
            )));
        }
        if self.min_order > self.max_order {
            return Err(PipelineError::Config(format!(
                "curve.min_order ({}) exceeds curve.max_order ({})",
                self.min_order, self.max_order
            )));
        }
        let width = self.domain().width();
        if width > MAX_DOMAIN_WIDTH {
            return Err(PipelineError::Config(format!(
                "curve domain {}..={} spans {} orders, at most {} allowed",
                self.min_order, self.max_order, width, MAX_DOMAIN_WIDTH
            )));
        }
        Ok(())
    }

    pub fn domain(&self) -> StreamOrderDomain {
        StreamOrderDomain {
            min: self.min_order,
            max: self.max_order,
        }
    }
}

/// Inclusive range of stream orders a curve is defined over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamOrderDomain {
    pub min: i32,
    pub max: i32,
}

impl StreamOrderDomain {
    pub fn contains(&self, order: i32) -> bool {
        order >= self.min && order <= self.max
    }

    /// Number of orders covered, zero when inverted.
    pub(crate) fn width(&self) -> i64 {
        (i64::from(self.max) - i64::from(self.min) + 1).max(0)
    }
}

// ---------------------------------------------------------------------------
// Inputs and field names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// GeoJSON flowline network.
    pub flowlines: Option<String>,
    /// GeoJSON watershed (HUC12) polygons.
    pub watersheds: Option<String>,
    /// TOML species membership table.
    pub range_table: Option<String>,
    /// Directory of per-species range polygon GeoJSON files.
    pub range_dir: Option<String>,
}

/// Attribute names in the source layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub segment_id: String,
    pub stream_order: String,
    pub watershed_id: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        FieldNames {
            segment_id: "COMID".to_string(),
            stream_order: "StreamOrde".to_string(),
            watershed_id: "HUC_12".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Range selection
// ---------------------------------------------------------------------------

/// Which presence set drives which stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Presence set the threshold is derived from.
    pub threshold_presence: Presence,
    /// Presence set that decides which segments are in range.
    pub assignment_presence: Presence,
    /// File stems in `range_dir` that are not species layers.
    pub exclude: Vec<String>,
}

impl Default for RangeConfig {
    fn default() -> Self {
        RangeConfig {
            threshold_presence: Presence::Historical,
            assignment_presence: Presence::Historical,
            exclude: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline and output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for the species fan-out; 0 uses the rayon default.
    pub workers: usize,
    /// Stop starting new species after the first failure.
    pub fail_fast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// GeoJSON of flowlines with one property per species.
    pub geojson: Option<String>,
    /// JSON run report.
    pub report_json: Option<String>,
    /// Markdown run summary.
    pub report_markdown: Option<String>,
    /// PostgreSQL table for the wide probability table. Requires DATABASE_URL.
    pub postgres_table: Option<String>,
    pub log_file: Option<String>,
    pub log_level: String,
    pub console_timestamps: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            geojson: None,
            report_json: None,
            report_markdown: None,
            postgres_table: None,
            log_file: None,
            log_level: "info".to_string(),
            console_timestamps: false,
        }
    }
}

impl OutputConfig {
    pub fn log_level(&self) -> Result<LogLevel, PipelineError> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(PipelineError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Full run configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub inputs: InputConfig,
    pub fields: FieldNames,
    pub curve: CurveConfig,
    pub ranges: RangeConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

impl RunConfig {
    /// Checks every value the pipeline relies on. Input paths are checked
    /// separately by `require_inputs` since library callers may supply
    /// features directly.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.curve.validate()?;
        self.output.log_level()?;
        for (name, value) in [
            ("fields.segment_id", &self.fields.segment_id),
            ("fields.stream_order", &self.fields.stream_order),
            ("fields.watershed_id", &self.fields.watershed_id),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }

    /// Ensures the file inputs needed by a full run are configured.
    pub fn require_inputs(&self) -> Result<(), PipelineError> {
        if self.inputs.flowlines.is_none() {
            return Err(PipelineError::Config("inputs.flowlines is required".to_string()));
        }
        if self.inputs.watersheds.is_none() {
            return Err(PipelineError::Config("inputs.watersheds is required".to_string()));
        }
        match (&self.inputs.range_table, &self.inputs.range_dir) {
            (Some(_), Some(_)) => Err(PipelineError::Config(
                "set only one of inputs.range_table and inputs.range_dir".to_string(),
            )),
            (None, None) => Err(PipelineError::Config(
                "one of inputs.range_table or inputs.range_dir is required".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Parses and validates a configuration from TOML text.
pub fn parse_config(text: &str) -> Result<RunConfig, PipelineError> {
    let config: RunConfig =
        toml::from_str(text).map_err(|e| PipelineError::Parse(format!("config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates a configuration file.
pub fn load_config(path: &str) -> Result<RunConfig, PipelineError> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    parse_config(&text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").expect("empty config is valid");
        assert_eq!(config.curve, CurveConfig::default());
        assert_eq!(config.curve.rate, 0.5);
        assert_eq!(config.curve.ceiling, 0.9);
        assert_eq!(config.curve.above, 1.0);
        assert_eq!(config.curve.domain(), StreamOrderDomain { min: 1, max: 10 });
        assert_eq!(config.fields.segment_id, "COMID");
        assert_eq!(config.ranges.threshold_presence, Presence::Historical);
    }

    #[test]
    fn test_overrides_are_read() {
        let text = r#"
            [inputs]
            flowlines = "data/NHDFlowline_Network.geojson"
            watersheds = "data/HUC12FullState.geojson"
            range_dir = "data/species_ranges"

            [curve]
            rate = 0.25
            ceiling = 0.8
            max_order = 12

            [ranges]
            threshold_presence = "historical"
            assignment_presence = "current"
            exclude = ["HUC12FullState"]

            [pipeline]
            workers = 4
        "#;
        let config = parse_config(text).expect("valid config");
        assert_eq!(config.curve.rate, 0.25);
        assert_eq!(config.curve.ceiling, 0.8);
        assert_eq!(config.curve.above, 1.0, "unset values keep defaults");
        assert_eq!(config.curve.max_order, 12);
        assert_eq!(config.ranges.assignment_presence, Presence::Current);
        assert_eq!(config.pipeline.workers, 4);
        assert!(config.require_inputs().is_ok());
    }

    #[test]
    fn test_rate_must_be_strictly_between_zero_and_one() {
        for rate in [0.0, 1.0, -0.5, 1.5] {
            let curve = CurveConfig { rate, ..CurveConfig::default() };
            assert!(curve.validate().is_err(), "rate {} should be rejected", rate);
        }
    }

    #[test]
    fn test_probabilities_must_be_in_unit_interval() {
        let bad_ceiling = CurveConfig { ceiling: 0.0, ..CurveConfig::default() };
        assert!(bad_ceiling.validate().is_err(), "zero ceiling would flatten the curve");
        let bad_above = CurveConfig { above: 1.2, ..CurveConfig::default() };
        assert!(bad_above.validate().is_err());
        let zero_above = CurveConfig { above: 0.0, ..CurveConfig::default() };
        assert!(zero_above.validate().is_ok());
    }

    #[test]
    fn test_inverted_domain_is_rejected() {
        let curve = CurveConfig { min_order: 5, max_order: 3, ..CurveConfig::default() };
        assert!(curve.validate().is_err());
        let curve = CurveConfig { min_order: 0, ..CurveConfig::default() };
        assert!(curve.validate().is_err());
    }

    #[test]
    fn test_oversized_domain_is_rejected() {
        let result = parse_config("[curve]\nmax_order = 2000000000\n");
        assert!(matches!(result, Err(PipelineError::Config(_))));

        let widest = CurveConfig { min_order: 1, max_order: 100, ..CurveConfig::default() };
        assert!(widest.validate().is_ok());
        assert_eq!(widest.domain().width(), MAX_DOMAIN_WIDTH);
        let too_wide = CurveConfig { max_order: 101, ..widest };
        assert!(too_wide.validate().is_err());
        let extreme = CurveConfig { min_order: 1, max_order: i32::MAX, ..CurveConfig::default() };
        assert!(extreme.validate().is_err());
    }

    #[test]
    fn test_unknown_presence_value_fails_to_parse() {
        let result = parse_config("[ranges]\nthreshold_presence = \"future\"\n");
        assert!(matches!(result, Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_require_inputs_needs_exactly_one_range_source() {
        let mut config = RunConfig::default();
        config.inputs.flowlines = Some("f.geojson".to_string());
        config.inputs.watersheds = Some("w.geojson".to_string());
        assert!(config.require_inputs().is_err());
        config.inputs.range_table = Some("ranges.toml".to_string());
        assert!(config.require_inputs().is_ok());
        config.inputs.range_dir = Some("ranges/".to_string());
        assert!(config.require_inputs().is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = parse_config(include_str!("../streamprob.toml")).expect("sample config is valid");
        assert!(config.require_inputs().is_ok());
        assert_eq!(config.ranges.exclude, vec!["HUC12FullState".to_string()]);
    }

    #[test]
    fn test_log_level_parsing() {
        let mut output = OutputConfig::default();
        assert_eq!(output.log_level().unwrap(), LogLevel::Info);
        output.log_level = "WARN".to_string();
        assert_eq!(output.log_level().unwrap(), LogLevel::Warning);
        output.log_level = "loud".to_string();
        assert!(output.log_level().is_err());
    }
}
