use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::{CheckSummary, KlcError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogItem {
    pub library: String,
    pub item: String,
}

/// Cumulative record of rules violated per library item.
///
/// Errors go under `errors`, rules that only warned under `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, Vec<LogItem>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub warnings: BTreeMap<String, Vec<LogItem>>,
}

/// `.json` is appended when missing.
pub fn log_path(path: &Path) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}

impl ErrorLog {
    /// Load an existing log. Missing or malformed files yield an empty log.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("Found bad JSON data in {}, clearing: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn record(&mut self, summary: &CheckSummary) {
        for symbol in summary.symbols() {
            for rule in &symbol.rules {
                let bucket = if rule.errors > 0 {
                    &mut self.errors
                } else if rule.warnings > 0 {
                    &mut self.warnings
                } else {
                    continue;
                };
                bucket.entry(rule.rule_id.clone()).or_default().push(LogItem {
                    library: symbol.library.clone(),
                    item: symbol.name.clone(),
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn to_json(&self) -> Result<String, KlcError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        String::from_utf8(out).map_err(|e| KlcError::Report(e.to_string()))
    }

    /// Merge a run into the log at `path` and write it back.
    pub fn merge_into(path: &Path, summary: &CheckSummary) -> Result<PathBuf, KlcError> {
        let path = log_path(path);
        let mut log = Self::load(&path);
        log.record(summary);
        std::fs::write(&path, log.to_json()?)?;
        tracing::debug!("Updated error log {}", path.display());
        Ok(path)
    }
}
