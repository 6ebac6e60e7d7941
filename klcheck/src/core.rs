//! Check orchestration shared by the CLI and library users.
//! No printing here: callers render the returned reports.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::analyzer::{ExceptionMap, LogEntry, RuleInstance, RuleRegistry, Severity};
use crate::symbol::{FormatError, Library};

static UNITTEST_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)__(.+)__(.+)").expect("valid unit test pattern"));

#[derive(Debug, thiserror::Error)]
pub enum KlcError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid pattern: {0}")]
    Pattern(String),
    #[error("Unknown rule: {0}")]
    UnknownRule(String),
    #[error("Report error: {0}")]
    Report(String),
}

impl From<regex::Error> for KlcError {
    fn from(e: regex::Error) -> Self {
        KlcError::Pattern(e.to_string())
    }
}

impl From<glob::PatternError> for KlcError {
    fn from(e: glob::PatternError) -> Self {
        KlcError::Pattern(e.to_string())
    }
}

impl From<quick_xml::Error> for KlcError {
    fn from(e: quick_xml::Error) -> Self {
        KlcError::Report(e.to_string())
    }
}

impl From<serde_json::Error> for KlcError {
    fn from(e: serde_json::Error) -> Self {
        KlcError::Report(e.to_string())
    }
}

/// Options for a check run.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Rules to run. Empty means all.
    pub rules: Vec<String>,
    pub exclude: Vec<String>,
    /// Exact symbol name, compared case-insensitively.
    pub component: Option<String>,
    /// Case-insensitive regex searched in symbol names.
    pub pattern: Option<String>,
    pub fix: bool,
    /// Drop output and counts of rules that report no errors.
    pub no_warnings: bool,
    pub disable_exceptions: bool,
    /// Check `<Pass|Warn|Fail>__<rule>__<desc>` symbols against their expectation.
    pub unittest: bool,
    /// Worker threads. Zero picks the available parallelism.
    pub jobs: usize,
    /// Stop waiting for workers after this long.
    pub timeout: Option<Duration>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            rules: vec![],
            exclude: vec![],
            component: None,
            pattern: None,
            fix: false,
            no_warnings: false,
            disable_exceptions: false,
            unittest: false,
            jobs: 1,
            timeout: None,
        }
    }
}

/// Output of one rule for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule_id: String,
    pub description: String,
    pub url: String,
    pub errors: usize,
    pub warnings: usize,
    /// Set when a symbol-level exception zeroed the counts.
    pub exception: Option<String>,
    pub entries: Vec<LogEntry>,
}

impl RuleReport {
    fn from_instance(inst: &RuleInstance, exceptions: &ExceptionMap) -> Self {
        let exception = if inst.exceptions().is_empty() {
            None
        } else {
            Some(exceptions.notes(inst.id()))
        };
        Self {
            rule_id: inst.id().to_string(),
            description: inst.description().to_string(),
            url: inst.url(),
            errors: inst.error_count(),
            warnings: inst.warning_count(),
            exception,
            entries: inst.log().entries().to_vec(),
        }
    }

    /// Headline printed above the rule's entries.
    pub fn headline(&self, library: &str, symbol: &str) -> String {
        match &self.exception {
            Some(note) => format!(
                "Exception {}:{}, Rule: {} - {}, Note: {}",
                library, symbol, self.rule_id, self.url, note
            ),
            None => format!("Violating {} - {}", self.rule_id, self.url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Expectation {
    Pass,
    Warn,
    Fail,
}

/// Verdict for a unit-test symbol.
#[derive(Debug, Clone, Serialize)]
pub struct UnitTestOutcome {
    pub expected: Option<Expectation>,
    pub rule_id: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub library: String,
    pub name: String,
    pub rules: Vec<RuleReport>,
    pub errors: usize,
    pub warnings: usize,
    pub fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unittest: Option<UnitTestOutcome>,
}

impl SymbolReport {
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.library, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryReport {
    pub path: PathBuf,
    pub library: String,
    pub symbols: Vec<SymbolReport>,
    pub errors: usize,
    pub warnings: usize,
    /// Fixed library was written back.
    pub written: bool,
    /// Why the file could not be checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl LibraryReport {
    pub fn new(path: &Path, library: String) -> Self {
        Self {
            path: path.to_path_buf(),
            library,
            symbols: Vec::new(),
            errors: 0,
            warnings: 0,
            written: false,
            failure: None,
        }
    }

    /// A file that could not be checked counts as one error.
    pub fn failed(path: &Path, reason: impl Into<String>) -> Self {
        let mut report = Self::new(path, library_name(path));
        report.errors = 1;
        report.failure = Some(reason.into());
        report
    }

    /// Metrics lines: per-symbol counts then library totals.
    pub fn metrics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for sym in self.symbols.iter().filter(|s| s.unittest.is_none()) {
            lines.push(format!("{}.{}.warnings {}", sym.library, sym.name, sym.warnings));
            lines.push(format!("{}.{}.errors {}", sym.library, sym.name, sym.errors));
        }
        lines.push(format!("{}.total_errors {}", self.library, self.errors));
        lines.push(format!("{}.total_warnings {}", self.library, self.warnings));
        lines
    }
}

/// Aggregated result of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckSummary {
    pub libraries: Vec<LibraryReport>,
    pub errors: usize,
    pub warnings: usize,
}

impl CheckSummary {
    pub fn push(&mut self, report: LibraryReport) {
        self.errors += report.errors;
        self.warnings += report.warnings;
        self.libraries.push(report);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolReport> {
        self.libraries.iter().flat_map(|l| l.symbols.iter())
    }

    /// 3 with errors, 2 with warnings only, 0 when clean.
    pub fn exit_code(&self) -> i32 {
        if self.errors > 0 {
            3
        } else if self.warnings > 0 {
            2
        } else {
            0
        }
    }

    pub fn metrics(&self) -> Vec<String> {
        self.libraries.iter().flat_map(|l| l.metrics()).collect()
    }
}

fn library_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

fn is_library_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("kicad_sym") | Some("kicad_symdir")
    )
}

/// Expand glob patterns into library paths. Directories that are not
/// `.kicad_symdir` libraries are searched recursively.
pub fn discover_symbol_files(patterns: &[String]) -> Result<Vec<PathBuf>, KlcError> {
    let mut files = Vec::new();
    for pattern in patterns {
        for entry in glob::glob(pattern)? {
            let path = entry.map_err(|e| KlcError::Io(e.into()))?;
            if path.is_dir() && !is_library_path(&path) {
                walk_dir(&path, &mut files, 0)?;
            } else if !files.contains(&path) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>, depth: usize) -> Result<(), KlcError> {
    if depth > 20 {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();
    for path in entries {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with('.') || name == "target" {
            continue;
        }
        if is_library_path(&path) {
            if !files.contains(&path) {
                files.push(path);
            }
        } else if path.is_dir() {
            walk_dir(&path, files, depth + 1)?;
        }
    }
    Ok(())
}

/// Rule selection, filters and registry for a run. Shared by all workers.
#[derive(Debug)]
pub struct KlcCore {
    options: CheckOptions,
    registry: RuleRegistry,
    rule_ids: Vec<&'static str>,
    pattern: Option<Regex>,
}

impl KlcCore {
    pub fn new(options: CheckOptions) -> Result<Self, KlcError> {
        Self::with_registry(options, RuleRegistry::with_default_rules())
    }

    /// Use a custom registry, e.g. with extra rules registered.
    pub fn with_registry(options: CheckOptions, registry: RuleRegistry) -> Result<Self, KlcError> {
        let rule_ids = registry.select(&options.rules, &options.exclude)?;
        let pattern = options
            .pattern
            .as_deref()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .transpose()?;
        Ok(Self {
            options,
            registry,
            rule_ids,
            pattern,
        })
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    pub fn rule_ids(&self) -> &[&'static str] {
        &self.rule_ids
    }

    fn selects(&self, name: &str) -> bool {
        if let Some(component) = &self.options.component {
            if !component.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        self.pattern.as_ref().map_or(true, |re| re.is_match(name))
    }

    /// Check every library file, in parallel when `jobs` allows.
    pub fn check_files(self: Arc<Self>, files: &[PathBuf]) -> CheckSummary {
        crate::checker::run(self, files)
    }

    /// Load and check one library file. Never fails: problems with the file
    /// itself become a one-error report.
    pub fn check_library(&self, path: &Path) -> LibraryReport {
        self.check_library_until(path, &AtomicBool::new(false))
    }

    /// Like [`check_library`](Self::check_library), but fixes are not
    /// written back once `cancelled` is set.
    pub(crate) fn check_library_until(&self, path: &Path, cancelled: &AtomicBool) -> LibraryReport {
        tracing::debug!("Checking library {}", path.display());
        if !path.exists() {
            return LibraryReport::failed(path, format!("File does not exist: {}", path.display()));
        }
        if !is_library_path(path) {
            return LibraryReport::failed(path, format!("File is not a .kicad_sym : {}", path.display()));
        }

        let mut library = match Library::from_path(path) {
            Ok(library) => library,
            Err(e) => {
                tracing::warn!("Could not parse library {}: {}", path.display(), e);
                return LibraryReport::failed(
                    path,
                    format!("Could not parse library: {}. ({})", path.display(), e),
                );
            }
        };

        let mut report = LibraryReport::new(path, library.libname());
        self.check_and_save(&mut library, &mut report, cancelled);
        report
    }

    /// Check an already loaded library. Fixes are applied in place and the
    /// library is written back when any fix changed it.
    pub fn check_loaded(&self, library: &mut Library, report: &mut LibraryReport) {
        self.check_and_save(library, report, &AtomicBool::new(false));
    }

    fn check_and_save(&self, library: &mut Library, report: &mut LibraryReport, cancelled: &AtomicBool) {
        let mut any_fixed = false;
        for idx in 0..library.symbols.len() {
            if !self.selects(&library.symbols[idx].name) {
                continue;
            }
            let sym_report = if self.options.unittest {
                self.unittest_symbol(library, idx)
            } else {
                self.check_symbol(library, idx)
            };
            any_fixed |= sym_report.fixed;
            report.errors += sym_report.errors;
            report.warnings += sym_report.warnings;
            report.symbols.push(sym_report);
        }

        if any_fixed && cancelled.load(Ordering::SeqCst) {
            tracing::warn!("Run cancelled, not writing {}", library.filename.display());
        } else if any_fixed {
            match library.write() {
                Ok(()) => {
                    tracing::info!("Wrote fixed library {}", library.filename.display());
                    report.written = true;
                }
                Err(e) => {
                    tracing::warn!("Could not write {}: {}", library.filename.display(), e);
                    report.errors += 1;
                    report.failure = Some(format!("Could not write library: {}", e));
                }
            }
        }
    }

    fn exceptions_for(&self, library: &Library, idx: usize) -> ExceptionMap {
        if self.options.disable_exceptions {
            ExceptionMap::default()
        } else {
            ExceptionMap::from_symbol(&library.symbols[idx])
        }
    }

    fn run_rules(
        &self,
        ids: &[&str],
        library: &Library,
        idx: usize,
        exceptions: &ExceptionMap,
    ) -> Vec<RuleInstance> {
        let symbol = &library.symbols[idx];
        let mut instances = self.registry.instantiate(ids);
        for inst in instances.iter_mut() {
            tracing::debug!("Checking rule {} on {}", inst.id(), symbol.name);
            inst.check(symbol, Some(library), exceptions.for_rule(inst.id()));
        }
        instances
    }

    /// Run the selected rules on one symbol, fixing and rechecking when enabled.
    pub fn check_symbol(&self, library: &mut Library, idx: usize) -> SymbolReport {
        let exceptions = self.exceptions_for(library, idx);
        let mut instances = self.run_rules(&self.rule_ids, library, idx, &exceptions);

        let mut fixed = false;
        if self.options.fix {
            let mut changed = vec![false; instances.len()];
            for (i, inst) in instances.iter_mut().enumerate() {
                if inst.error_count() + inst.warning_count() == 0 {
                    continue;
                }
                changed[i] = inst.fix(&mut library.symbols[idx]);
            }
            fixed = changed.iter().any(|c| *c);
            if fixed {
                // The writer always emits LF.
                library.crlf = false;
                for (inst, _) in instances.iter_mut().zip(&changed).filter(|(_, c)| **c) {
                    inst.recheck(&library.symbols[idx], Some(&*library));
                }
            }
        }

        let symbol = &library.symbols[idx];
        let mut report = SymbolReport {
            library: symbol.libname.clone(),
            name: symbol.name.clone(),
            rules: Vec::new(),
            errors: 0,
            warnings: 0,
            fixed,
            unittest: None,
        };
        for inst in &instances {
            if self.options.no_warnings && !inst.has_errors() {
                continue;
            }
            report.errors += inst.error_count();
            report.warnings += inst.warning_count();
            if inst.has_output() {
                report.rules.push(RuleReport::from_instance(inst, &exceptions));
            }
        }
        report
    }

    /// Compare one test symbol against the expectation encoded in its name.
    pub fn unittest_symbol(&self, library: &Library, idx: usize) -> SymbolReport {
        let symbol = &library.symbols[idx];
        let mut report = SymbolReport {
            library: symbol.libname.clone(),
            name: symbol.name.clone(),
            rules: Vec::new(),
            errors: 0,
            warnings: 0,
            fixed: false,
            unittest: None,
        };

        let Some(caps) = UNITTEST_NAME.captures(&symbol.name) else {
            report.errors = 1;
            report.unittest = Some(UnitTestOutcome {
                expected: None,
                rule_id: String::new(),
                passed: false,
            });
            return report;
        };
        let expected = match &caps[1] {
            "Pass" => Some(Expectation::Pass),
            "Warn" => Some(Expectation::Warn),
            "Fail" => Some(Expectation::Fail),
            _ => None,
        };
        let rule_id = caps[2].to_string();

        let Some(id) = self.rule_ids.iter().copied().find(|id| *id == rule_id) else {
            return report;
        };
        let exceptions = self.exceptions_for(library, idx);
        let instances = self.run_rules(&[id], library, idx, &exceptions);
        let passed = instances.first().map_or(false, |inst| match expected {
            Some(Expectation::Fail) => inst.error_count() > 0,
            Some(Expectation::Warn) => inst.warning_count() > 0,
            Some(Expectation::Pass) => inst.error_count() == 0 && inst.warning_count() == 0,
            None => true,
        });
        if !passed {
            report.errors = 1;
        }
        if let Some(inst) = instances.first().filter(|i| i.has_output()) {
            report.rules.push(RuleReport::from_instance(inst, &exceptions));
        }
        report.unittest = Some(UnitTestOutcome {
            expected,
            rule_id,
            passed,
        });
        report
    }
}

/// Severity buckets used by report writers.
pub fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "Errors",
        Severity::Warning => "Warnings",
        Severity::Info | Severity::Success => "Info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ElectricalType, Pin, Rotation, Symbol};

    fn library_with(symbols: Vec<Symbol>) -> Library {
        let mut lib = Library::new("test.kicad_sym");
        for sym in symbols {
            lib.add_symbol(sym).unwrap();
        }
        lib
    }

    fn bad_name() -> Symbol {
        Symbol::new("R 1", "test", "R", "", "", "", "", &[])
    }

    #[test]
    fn test_exit_codes() {
        let mut summary = CheckSummary::default();
        assert_eq!(summary.exit_code(), 0);
        summary.warnings = 2;
        assert_eq!(summary.exit_code(), 2);
        summary.errors = 1;
        assert_eq!(summary.exit_code(), 3);
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let options = CheckOptions {
            rules: vec!["Z9.9".to_string()],
            ..Default::default()
        };
        assert!(matches!(KlcCore::new(options), Err(KlcError::UnknownRule(_))));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let options = CheckOptions {
            pattern: Some("(".to_string()),
            ..Default::default()
        };
        assert!(matches!(KlcCore::new(options), Err(KlcError::Pattern(_))));
    }

    #[test]
    fn test_component_filter_ignores_case() {
        let core = KlcCore::new(CheckOptions {
            rules: vec!["G1.1".to_string()],
            component: Some("r 1".to_string()),
            ..Default::default()
        })
        .unwrap();
        let mut lib = library_with(vec![bad_name(), Symbol::new("C", "test", "C", "", "", "", "", &[])]);
        let mut report = LibraryReport::new(Path::new("test.kicad_sym"), "test".to_string());
        core.check_loaded(&mut lib, &mut report);
        assert_eq!(report.symbols.len(), 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.symbols[0].rules[0].headline("test", "R 1"), "Violating G1.1 - https://klc.kicad.org/general/g1/g1.1/");
    }

    #[test]
    fn test_no_warnings_drops_warning_only_rules() {
        let mut sym = Symbol::new("U1", "test", "U", "", "", "", "", &[]);
        sym.push_pin(Pin::new("A", "1", ElectricalType::Input).at(0.0, 0.0, Rotation::R0));
        let core = KlcCore::new(CheckOptions {
            rules: vec!["S5.2".to_string()],
            no_warnings: true,
            ..Default::default()
        })
        .unwrap();
        let mut lib = library_with(vec![sym]);
        let report = core.check_symbol(&mut lib, 0);
        assert_eq!(report.warnings, 0);
        assert!(report.rules.is_empty());
    }

    #[test]
    fn test_unittest_mode() {
        let core = KlcCore::new(CheckOptions {
            unittest: true,
            ..Default::default()
        })
        .unwrap();
        let lib = library_with(vec![
            Symbol::new("Fail__G1.1__bad~name", "test", "U", "", "", "", "", &[]),
            Symbol::new("Pass__G1.1__good", "test", "U", "", "", "", "", &[]),
            Symbol::new("Fail__G1.1__good", "test", "U", "", "", "", "", &[]),
            Symbol::new("unparsable", "test", "U", "", "", "", "", &[]),
        ]);
        let errors: Vec<usize> = (0..4).map(|i| core.unittest_symbol(&lib, i).errors).collect();
        assert_eq!(errors, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_metrics_lines() {
        let mut report = LibraryReport::new(Path::new("Device.kicad_sym"), "Device".to_string());
        report.symbols.push(SymbolReport {
            library: "Device".to_string(),
            name: "R".to_string(),
            rules: vec![],
            errors: 1,
            warnings: 2,
            fixed: false,
            unittest: None,
        });
        report.errors = 1;
        report.warnings = 2;
        assert_eq!(
            report.metrics(),
            vec![
                "Device.R.warnings 2",
                "Device.R.errors 1",
                "Device.total_errors 1",
                "Device.total_warnings 2",
            ]
        );
    }
}
