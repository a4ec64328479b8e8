/// Core data types for the species stream-order probability pipeline.
///
/// This module defines the shared domain model imported by all other modules:
/// stream segments, watersheds, species ranges, table cell values and the
/// pipeline error type. It contains no I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::spatial::geometry::{Point, Region};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable stream-segment key (NHDPlus COMID rendered as a string).
pub type SegmentId = String;

/// Watershed key (HUC12 code).
pub type WatershedId = String;

/// Species key, also used as the species' column name in the output table.
pub type SpeciesId = String;

// ---------------------------------------------------------------------------
// Source features
// ---------------------------------------------------------------------------

/// A single river segment from the flowline network.
///
/// `stream_order` is `None` when the source value is missing or not an
/// integer. Negative values (coastline `-9`) are kept as-is so the assigner
/// can tell them apart from real streams.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSegment {
    pub id: SegmentId,
    pub stream_order: Option<i32>,
    /// Point used for containment tests (midpoint along the line).
    pub representative_point: Point,
}

impl StreamSegment {
    /// Returns the stream order only if it is a real stream (order > 0).
    pub fn valid_order(&self) -> Option<i32> {
        self.stream_order.filter(|order| *order > 0)
    }
}

/// A watershed polygon (HUC12).
#[derive(Debug, Clone, PartialEq)]
pub struct Watershed {
    pub id: WatershedId,
    pub shape: Region,
}

/// Maximum valid stream order per watershed, as produced by the aggregator.
///
/// Watersheds without any qualifying segment have no entry at all, which
/// keeps "no streams" distinct from "lowest order".
pub type WatershedOrders = BTreeMap<WatershedId, i32>;

// ---------------------------------------------------------------------------
// Species ranges
// ---------------------------------------------------------------------------

/// Which presence set of a species range is being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Historical,
    Current,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Historical => write!(f, "historical"),
            Presence::Current => write!(f, "current"),
        }
    }
}

/// A species' occurrence range expressed as watershed membership.
///
/// Sets collapse duplicates and ignore order. `current` is optional: simpler
/// deployments only know one presence set.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesRange {
    pub species: SpeciesId,
    pub historical: BTreeSet<WatershedId>,
    pub current: Option<BTreeSet<WatershedId>>,
    /// Range polygons when the range was read from a polygon layer. When
    /// present they are joined against directly instead of the watershed
    /// polygons of the membership set.
    pub polygons: Option<Vec<Region>>,
}

impl SpeciesRange {
    pub fn from_watersheds<I, S>(species: &str, historical: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<WatershedId>,
    {
        SpeciesRange {
            species: species.to_string(),
            historical: historical.into_iter().map(Into::into).collect(),
            current: None,
            polygons: None,
        }
    }

    /// Returns the requested presence set, or a `MissingRange` error when
    /// the species has no such set.
    pub fn presence(&self, which: Presence) -> Result<&BTreeSet<WatershedId>, PipelineError> {
        match which {
            Presence::Historical => Ok(&self.historical),
            Presence::Current => self.current.as_ref().ok_or_else(|| PipelineError::MissingRange {
                species: self.species.clone(),
                presence: which,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Output cells
// ---------------------------------------------------------------------------

/// Sentinel text written for segments outside the species' range.
pub const ABSENT_TEXT: &str = "0";

/// Sentinel text written for segments whose order cannot be evaluated.
pub const INDETERMINATE_TEXT: &str = "N/A";

/// One cell of the probability table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    /// Probability of presence from the species' curve.
    Probability(f64),
    /// No spatial overlap with the species' range; species considered absent.
    Absent,
    /// Stream order missing or invalid; presence cannot be evaluated.
    Indeterminate,
}

impl CellValue {
    /// Numeric view of the cell. `Absent` normalizes to zero; `Indeterminate`
    /// has no numeric value.
    pub fn as_probability(&self) -> Option<f64> {
        match self {
            CellValue::Probability(p) => Some(*p),
            CellValue::Absent => Some(0.0),
            CellValue::Indeterminate => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Probability(p) => write!(f, "{}", p),
            CellValue::Absent => write!(f, "{}", ABSENT_TEXT),
            CellValue::Indeterminate => write!(f, "{}", INDETERMINATE_TEXT),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Broad classification of a `PipelineError`, used to pick a log level and
/// to group failures in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorClass {
    /// Input data contradicts an invariant (undefined threshold, ...).
    DataIntegrity,
    /// A stream order escaped the curve domain. Indicates a defect upstream.
    DomainViolation,
    /// The run configuration is invalid or incomplete.
    Configuration,
    /// Reading or writing files / databases failed.
    Io,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::DataIntegrity => write!(f, "DATA_INTEGRITY"),
            ErrorClass::DomainViolation => write!(f, "DOMAIN_VIOLATION"),
            ErrorClass::Configuration => write!(f, "CONFIGURATION"),
            ErrorClass::Io => write!(f, "IO"),
        }
    }
}

/// Errors that can arise while loading inputs, running the pipeline, or
/// exporting results.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid configuration value.
    Config(String),
    /// A file could not be read or written.
    Io { path: String, message: String },
    /// Input could not be parsed (bad GeoJSON, TOML, missing fields).
    Parse(String),
    /// The same identity appears twice in a collection that must be keyed.
    DuplicateId { collection: String, id: String },
    /// None of the species' range watersheds has a known max stream order.
    UndefinedThreshold {
        species: SpeciesId,
        range_size: usize,
    },
    /// The computed threshold cannot index the curve domain.
    ThresholdOutOfDomain {
        species: SpeciesId,
        threshold: i32,
        min_order: i32,
        max_order: i32,
    },
    /// A segment's stream order is outside the curve's domain.
    DomainViolation {
        segment: SegmentId,
        stream_order: i32,
        min_order: i32,
        max_order: i32,
    },
    /// A merge referenced a segment that is not in the table's row index.
    UnknownSegment { species: SpeciesId, segment: SegmentId },
    /// The configured presence set does not exist for the species.
    MissingRange { species: SpeciesId, presence: Presence },
    /// Writing to an output sink failed.
    Export(String),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::UndefinedThreshold { .. }
            | PipelineError::ThresholdOutOfDomain { .. }
            | PipelineError::DuplicateId { .. }
            | PipelineError::UnknownSegment { .. } => ErrorClass::DataIntegrity,
            PipelineError::DomainViolation { .. } => ErrorClass::DomainViolation,
            PipelineError::Config(_) | PipelineError::MissingRange { .. } => {
                ErrorClass::Configuration
            }
            PipelineError::Io { .. } | PipelineError::Parse(_) | PipelineError::Export(_) => {
                ErrorClass::Io
            }
        }
    }

    pub(crate) fn io(path: &str, err: impl fmt::Display) -> Self {
        PipelineError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
            PipelineError::Parse(msg) => write!(f, "Parse error: {}", msg),
            PipelineError::DuplicateId { collection, id } => {
                write!(f, "Duplicate id {} in {}", id, collection)
            }
            PipelineError::UndefinedThreshold { species, range_size } => write!(
                f,
                "Undefined threshold for {}: none of its {} range watersheds has a valid max stream order",
                species, range_size
            ),
            PipelineError::ThresholdOutOfDomain {
                species,
                threshold,
                min_order,
                max_order,
            } => write!(
                f,
                "Threshold {} for {} is outside stream order domain {}..={}",
                threshold, species, min_order, max_order
            ),
            PipelineError::DomainViolation {
                segment,
                stream_order,
                min_order,
                max_order,
            } => write!(
                f,
                "Segment {} has stream order {} outside curve domain {}..={}",
                segment, stream_order, min_order, max_order
            ),
            PipelineError::UnknownSegment { species, segment } => write!(
                f,
                "Merge for {} references unknown segment {}",
                species, segment
            ),
            PipelineError::MissingRange { species, presence } => {
                write!(f, "Species {} has no {} presence range", species, presence)
            }
            PipelineError::Export(msg) => write!(f, "Export error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
