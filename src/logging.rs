/// Structured logging for the probability pipeline
///
/// Provides context-rich logging with pipeline stage and species
/// identifiers, timestamps, and severity levels. Supports both console
/// output and file-based logging for long batch runs.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use crate::export::create_parent_dir;
use crate::model::{ErrorClass, PipelineError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Aggregate,
    Reduce,
    Curve,
    Assign,
    Merge,
    Export,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ingest => write!(f, "INGEST"),
            Stage::Aggregate => write!(f, "AGG"),
            Stage::Reduce => write!(f, "REDUCE"),
            Stage::Curve => write!(f, "CURVE"),
            Stage::Assign => write!(f, "ASSIGN"),
            Stage::Merge => write!(f, "MERGE"),
            Stage::Export => write!(f, "EXPORT"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

/// A panic while holding the lock only ever interrupts a console write, so
/// a poisoned logger is still usable.
fn logger_guard() -> MutexGuard<'static, Option<Logger>> {
    LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        *logger_guard() = Some(Self::new(min_level, log_file, console_timestamps));
    }

    /// Builds a logger, creating the log file's directory if it is missing.
    fn new(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) -> Self {
        if let Some(path) = &log_file {
            if let Err(e) = create_parent_dir(path) {
                eprintln!("Failed to create log directory for {}: {}", path, e);
            }
        }
        Logger {
            min_level,
            log_file,
            console_timestamps,
        }
    }

    /// Format a single entry. Kept separate from `log` so the layout is testable.
    fn format_entry(level: LogLevel, stage: &Stage, species: Option<&str>, message: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let species_part = species.map(|s| format!(" [{}]", s)).unwrap_or_default();
        format!("{} {} {}{}: {}", timestamp, level, stage, species_part, message)
    }

    fn log(&self, level: LogLevel, stage: &Stage, species: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = Self::format_entry(level, stage, species, message);
        let species_part = species.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", log_entry),
                LogLevel::Warning => eprintln!("   {}", log_entry),
                LogLevel::Info => println!("   {}", log_entry),
                LogLevel::Debug => println!("   [DEBUG] {}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, species_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, species_part, message),
                LogLevel::Info => println!("   {}{}: {}", stage, species_part, message),
                LogLevel::Debug => println!("   [DEBUG] {}{}: {}", stage, species_part, message),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, stage: Stage, species: Option<&str>, message: &str) {
    if let Some(logger) = logger_guard().as_ref() {
        logger.log(level, &stage, species, message);
    }
}

/// Log a general informational message
pub fn info(stage: Stage, species: Option<&str>, message: &str) {
    emit(LogLevel::Info, stage, species, message);
}

/// Log a warning message
pub fn warn(stage: Stage, species: Option<&str>, message: &str) {
    emit(LogLevel::Warning, stage, species, message);
}

/// Log an error message
pub fn error(stage: Stage, species: Option<&str>, message: &str) {
    emit(LogLevel::Error, stage, species, message);
}

/// Log a debug message
pub fn debug(stage: Stage, species: Option<&str>, message: &str) {
    emit(LogLevel::Debug, stage, species, message);
}

// ---------------------------------------------------------------------------
// Failure Logging
// ---------------------------------------------------------------------------

/// Log level a species failure is reported at.
///
/// Domain violations mean the input filtering is broken and are always
/// errors; a missing range is usually an incomplete range table.
pub fn failure_level(err: &PipelineError) -> LogLevel {
    match err.class() {
        ErrorClass::DomainViolation | ErrorClass::DataIntegrity | ErrorClass::Io => LogLevel::Error,
        ErrorClass::Configuration => LogLevel::Warning,
    }
}

/// Log a species pipeline failure with its classification
pub fn log_species_failure(species: &str, stage: Stage, err: &PipelineError) {
    let message = format!("species skipped [{}]: {}", err.class(), err);
    emit(failure_level(err), stage, Some(species), &message);
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of the species loop
pub fn log_run_summary(total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Run complete: {}/{} species merged, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        info(Stage::System, None, &message);
    } else if successful == 0 {
        error(Stage::System, None, &message);
    } else {
        warn(Stage::System, None, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_entry_carries_stage_and_species() {
        let entry = Logger::format_entry(LogLevel::Warning, &Stage::Reduce, Some("hardhead"), "no range");
        assert!(entry.ends_with("WARN REDUCE [hardhead]: no range"), "got {}", entry);
        assert!(entry.contains("UTC"));
    }

    #[test]
    fn test_log_file_directory_is_created() {
        let root = std::env::temp_dir().join(format!("streamprob_log_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let path = root.join("out").join("streamprob.log");
        let logger = Logger::new(LogLevel::Info, Some(path.to_string_lossy().into_owned()), false);

        logger.log(LogLevel::Info, &Stage::System, None, "run started");
        logger.log(LogLevel::Debug, &Stage::System, None, "filtered out");

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("INFO SYS: run started"));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_failure_classification_levels() {
        let threshold = PipelineError::UndefinedThreshold {
            species: "hardhead".to_string(),
            range_size: 3,
        };
        assert_eq!(failure_level(&threshold), LogLevel::Error);

        let missing = PipelineError::MissingRange {
            species: "hardhead".to_string(),
            presence: crate::model::Presence::Current,
        };
        assert_eq!(failure_level(&missing), LogLevel::Warning);
    }
}
