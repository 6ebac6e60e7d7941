//! KLC rule engine.
//!
//! [`rules`] holds the rule contract and lifecycle, [`exceptions`] the
//! per-symbol exception parsing and [`catalog`] the concrete rules.

pub mod catalog;
pub mod exceptions;
pub mod rules;

pub use exceptions::{ExceptionMap, RuleException};
pub use rules::{
    rule_url, LogEntry, Rule, RuleContext, RuleFactory, RuleInstance, RuleLog, RuleRegistry,
    RuleState, Severity,
};
