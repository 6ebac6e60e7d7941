//! Rule contract, per-rule log and the check/fix/recheck lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::exceptions::RuleException;
use crate::core::KlcError;
use crate::symbol::{Library, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, never fails a check.
    Info,
    /// Style deviation. Can be suppressed globally.
    Warning,
    /// Makes the run exit non-zero.
    Error,
    /// Positive confirmation, e.g. after a successful fix.
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
}

/// Messages and counters produced by one rule for one symbol.
#[derive(Debug, Clone, Default)]
pub struct RuleLog {
    entries: Vec<LogEntry>,
    error_count: usize,
    warning_count: usize,
}

impl RuleLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.entries.push(LogEntry {
            severity,
            message: message.into(),
            extras: Vec::new(),
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.push(Severity::Error, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warning_count += 1;
        self.push(Severity::Warning, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Severity::Success, message);
    }

    /// Attach a detail line to the most recent entry.
    pub fn extra(&mut self, detail: impl Into<String>) {
        if let Some(last) = self.entries.last_mut() {
            last.extras.push(detail.into());
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    pub fn reset_counts(&mut self) {
        self.error_count = 0;
        self.warning_count = 0;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset_counts();
    }
}

/// What a rule sees besides the symbol itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext<'a> {
    /// The library the symbol belongs to, for inheritance lookups.
    pub library: Option<&'a Library>,
    /// Exceptions declared on the symbol for this rule.
    pub exceptions: &'a [RuleException],
}

impl<'a> RuleContext<'a> {
    pub fn new(library: Option<&'a Library>, exceptions: &'a [RuleException]) -> Self {
        Self {
            library,
            exceptions,
        }
    }

    /// The symbol at the end of the `extends` chain.
    pub fn root_of<'s>(&self, symbol: &'s Symbol) -> &'s Symbol
    where
        'a: 's,
    {
        self.library
            .and_then(|lib| lib.get_root_symbol(&symbol.name))
            .unwrap_or(symbol)
    }
}

/// A single KLC rule.
///
/// `check` must be idempotent and leave the symbol untouched. `fix` may
/// mutate the symbol; the caller then runs a recheck.
pub trait Rule: Send + Sync {
    /// Stable identifier such as `S4.1`.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Rules returning true interpret exception payloads themselves and are
    /// exempt from blanket suppression.
    fn fine_grained_exceptions(&self) -> bool {
        false
    }

    fn check(&self, symbol: &Symbol, ctx: &RuleContext<'_>, log: &mut RuleLog);

    /// Returns whether the symbol was modified.
    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("Fix not supported");
        false
    }

    fn url(&self) -> String {
        rule_url(self.id())
    }
}

/// Documentation link for a rule id.
pub fn rule_url(id: &str) -> String {
    if id.starts_with("EC") {
        return "(extended check)".to_string();
    }
    let category = match id.chars().next() {
        Some('F') => "footprint",
        Some('G') => "general",
        Some('M') => "model",
        Some('S') => "symbol",
        _ => return String::new(),
    };
    let name = id.to_lowercase();
    let group = name.split('.').next().unwrap_or(&name);
    format!("https://klc.kicad.org/{}/{}/{}/", category, group, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Idle,
    Checked,
    Fixed,
    Rechecked,
}

/// A rule bound to one symbol run, carrying its log and lifecycle state.
pub struct RuleInstance {
    rule: Box<dyn Rule>,
    log: RuleLog,
    state: RuleState,
    exceptions: Vec<RuleException>,
    suppressed: bool,
}

impl fmt::Debug for RuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleInstance")
            .field("id", &self.rule.id())
            .field("state", &self.state)
            .field("errors", &self.log.error_count())
            .field("warnings", &self.log.warning_count())
            .finish()
    }
}

impl RuleInstance {
    pub fn new(rule: Box<dyn Rule>) -> Self {
        Self {
            rule,
            log: RuleLog::new(),
            state: RuleState::Idle,
            exceptions: Vec::new(),
            suppressed: false,
        }
    }

    pub fn id(&self) -> &'static str {
        self.rule.id()
    }

    pub fn description(&self) -> &'static str {
        self.rule.description()
    }

    pub fn url(&self) -> String {
        self.rule.url()
    }

    pub fn state(&self) -> RuleState {
        self.state
    }

    /// Run the rule from a clean log.
    pub fn check(&mut self, symbol: &Symbol, library: Option<&Library>, exceptions: &[RuleException]) {
        self.log.clear();
        self.exceptions = exceptions.to_vec();
        self.suppressed = false;
        self.run_check(symbol, library);
        self.state = RuleState::Checked;
    }

    fn run_check(&mut self, symbol: &Symbol, library: Option<&Library>) {
        let ctx = RuleContext::new(library, &self.exceptions);
        self.rule.check(symbol, &ctx, &mut self.log);
        if !self.exceptions.is_empty() && !self.rule.fine_grained_exceptions() {
            self.log.reset_counts();
            self.suppressed = true;
        }
    }

    /// Apply the rule's fix. Returns whether anything changed.
    pub fn fix(&mut self, symbol: &mut Symbol) -> bool {
        let applied = self.rule.fix(symbol, &mut self.log);
        if applied {
            self.state = RuleState::Fixed;
        }
        applied
    }

    /// Re-run the check after a fix and record the outcome.
    pub fn recheck(&mut self, symbol: &Symbol, library: Option<&Library>) {
        self.log.reset_counts();
        self.run_check(symbol, library);
        if self.log.has_errors() {
            self.log.error("Could not fix all errors");
        } else {
            self.log.success("Everything fixed");
        }
        self.state = RuleState::Rechecked;
    }

    pub fn log(&self) -> &RuleLog {
        &self.log
    }

    pub fn error_count(&self) -> usize {
        self.log.error_count()
    }

    pub fn warning_count(&self) -> usize {
        self.log.warning_count()
    }

    pub fn has_errors(&self) -> bool {
        self.log.has_errors()
    }

    pub fn has_output(&self) -> bool {
        !self.log.entries().is_empty()
    }

    /// Results were zeroed by a symbol-level exception.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn exceptions(&self) -> &[RuleException] {
        &self.exceptions
    }
}

pub type RuleFactory = fn() -> Box<dyn Rule>;

/// Rule id to factory mapping, in registration order.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<(&'static str, RuleFactory)>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full KLC catalog.
    pub fn with_default_rules() -> Self {
        let mut registry = Self::new();
        super::catalog::register_all(&mut registry);
        registry
    }

    /// Add a rule, replacing any rule registered under the same id.
    pub fn register(&mut self, id: &'static str, factory: RuleFactory) {
        match self.rules.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = factory,
            None => self.rules.push((id, factory)),
        }
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|(id, _)| *id).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.iter().any(|(existing, _)| *existing == id)
    }

    pub fn create(&self, id: &str) -> Option<Box<dyn Rule>> {
        self.rules
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, factory)| factory())
    }

    /// Rule ids selected by an allow list (empty means all) minus a deny list.
    pub fn select(&self, allow: &[String], deny: &[String]) -> Result<Vec<&'static str>, KlcError> {
        if let Some(unknown) = allow.iter().find(|id| !self.contains(id)) {
            return Err(KlcError::UnknownRule(unknown.clone()));
        }
        for id in deny.iter().filter(|id| !self.contains(id)) {
            tracing::warn!("Excluded rule {} is not known", id);
        }
        Ok(self
            .rules
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| allow.is_empty() || allow.iter().any(|a| a == id))
            .filter(|id| !deny.iter().any(|d| d == id))
            .collect())
    }

    /// Fresh instances for the given ids.
    pub fn instantiate(&self, ids: &[&str]) -> Vec<RuleInstance> {
        ids.iter()
            .filter_map(|id| self.create(id))
            .map(RuleInstance::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    impl Rule for AlwaysFails {
        fn id(&self) -> &'static str {
            "T1.1"
        }

        fn description(&self) -> &'static str {
            "always reports one error"
        }

        fn check(&self, _symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
            log.error("broken");
            log.extra("detail");
        }
    }

    #[test]
    fn test_rule_url() {
        assert_eq!(rule_url("S4.1"), "https://klc.kicad.org/symbol/s4/s4.1/");
        assert_eq!(rule_url("G1.7"), "https://klc.kicad.org/general/g1/g1.7/");
        assert_eq!(rule_url("EC01"), "(extended check)");
    }

    #[test]
    fn test_log_counts() {
        let mut log = RuleLog::new();
        log.warning("w");
        log.error("e");
        log.extra("more");
        log.info("i");
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.entries()[1].extras, vec!["more".to_string()]);
        log.reset_counts();
        assert!(!log.has_errors());
        assert_eq!(log.entries().len(), 3);
    }

    #[test]
    fn test_check_is_repeatable() {
        let sym = Symbol::empty("X", "lib");
        let mut inst = RuleInstance::new(Box::new(AlwaysFails));
        assert_eq!(inst.state(), RuleState::Idle);
        inst.check(&sym, None, &[]);
        inst.check(&sym, None, &[]);
        assert_eq!(inst.error_count(), 1);
        assert_eq!(inst.log().entries().len(), 1);
        assert_eq!(inst.state(), RuleState::Checked);
    }

    #[test]
    fn test_unfixable_recheck_leaves_residual_error() {
        let mut sym = Symbol::empty("X", "lib");
        let mut inst = RuleInstance::new(Box::new(AlwaysFails));
        inst.check(&sym, None, &[]);
        assert!(!inst.fix(&mut sym));
        inst.recheck(&sym, None);
        assert_eq!(inst.error_count(), 2);
        assert!(inst
            .log()
            .entries()
            .iter()
            .any(|e| e.message == "Could not fix all errors"));
        assert_eq!(inst.state(), RuleState::Rechecked);
    }

    #[test]
    fn test_exception_suppresses_counts() {
        let sym = Symbol::empty("X", "lib");
        let exc = RuleException {
            rule_id: "T1.1".to_string(),
            tag: None,
            payload: "known".to_string(),
        };
        let mut inst = RuleInstance::new(Box::new(AlwaysFails));
        inst.check(&sym, None, std::slice::from_ref(&exc));
        assert_eq!(inst.error_count(), 0);
        assert!(inst.is_suppressed());
        assert!(inst.has_output());
    }

    #[test]
    fn test_registry_selection() {
        let mut registry = RuleRegistry::new();
        registry.register("T1.1", || Box::new(AlwaysFails));
        registry.register("T1.2", || Box::new(AlwaysFails));
        assert_eq!(registry.select(&[], &[]).unwrap(), vec!["T1.1", "T1.2"]);
        assert_eq!(
            registry.select(&[], &["T1.1".to_string()]).unwrap(),
            vec!["T1.2"]
        );
        assert!(matches!(
            registry.select(&["X9.9".to_string()], &[]),
            Err(KlcError::UnknownRule(id)) if id == "X9.9"
        ));
        assert_eq!(registry.instantiate(&["T1.2"]).len(), 1);
    }
}
