/// Output sinks for the consolidated probability table.
///
/// - `geojson`: the flowline layer with one property per species.
/// - `postgres`: a wide table keyed by segment id, plus a run record.
///
/// Both write what the table holds and nothing else: cell text is the
/// table's `Display` form (`"0"` absent, `"N/A"` indeterminate).
///
/// File outputs go through `write_file`, which creates missing parent
/// directories first.

use std::fs;
use std::io;
use std::path::Path;

use crate::model::PipelineError;

pub mod geojson;
pub mod postgres;

/// Creates the directory `path` will be written into, if it has one.
pub(crate) fn create_parent_dir(path: &str) -> io::Result<()> {
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

/// Writes `contents` to `path`, creating parent directories as needed.
pub fn write_file(path: &str, contents: impl AsRef<[u8]>) -> Result<(), PipelineError> {
    create_parent_dir(path).map_err(|e| PipelineError::io(path, e))?;
    fs::write(path, contents).map_err(|e| PipelineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_file_creates_missing_directories() {
        let root = std::env::temp_dir().join(format!("streamprob_write_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let target = root.join("out").join("nested").join("report.md");
        let path = target.to_str().unwrap();

        write_file(path, "# run\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "# run\n");

        // Existing directory and bare file names are fine too.
        write_file(path, "# again\n").unwrap();
        assert!(create_parent_dir("report.json").is_ok());
        fs::remove_dir_all(&root).ok();
    }
}
