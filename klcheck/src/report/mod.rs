//! Machine-readable outputs of a check run: the cumulative JSON error log,
//! JUnit XML and metrics lines.

pub mod json_log;
pub mod junit;

pub use json_log::{ErrorLog, LogItem};
pub use junit::JunitReport;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::core::{CheckSummary, KlcError};

/// Default metrics file, relative to the working directory.
pub const METRICS_FILE: &str = "metrics.txt";

/// Append metrics lines to `path`, creating it when missing.
pub fn append_metrics(path: &Path, summary: &CheckSummary) -> Result<usize, KlcError> {
    let lines = summary.metrics();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in &lines {
        writeln!(file, "{}", line)?;
    }
    tracing::debug!("Appended {} metrics lines to {}", lines.len(), path.display());
    Ok(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LibraryReport;

    #[test]
    fn test_append_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METRICS_FILE);
        let mut summary = CheckSummary::default();
        summary.push(LibraryReport::failed(Path::new("Missing.kicad_sym"), "File does not exist"));

        assert_eq!(append_metrics(&path, &summary).unwrap(), 2);
        append_metrics(&path, &summary).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("Missing.total_errors 1\nMissing.total_warnings 0\n"));
    }
}
