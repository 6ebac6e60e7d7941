//! klcheck - KiCad symbol library parser and KLC checker
//!
//! This library reads and writes `.kicad_sym` symbol libraries without
//! losing information, and checks symbols against the KiCad Library
//! Conventions (KLC), optionally fixing what can be fixed automatically.
//!
//! # Quick Start
//!
//! ```no_run
//! use klcheck::{CheckOptions, KlcCore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let core = Arc::new(KlcCore::new(CheckOptions::default()).unwrap());
//! let summary = core.check_files(&[Path::new("Device.kicad_sym").to_path_buf()]);
//!
//! for symbol in summary.symbols() {
//!     for rule in &symbol.rules {
//!         println!("{} {}: {} errors", symbol.full_name(), rule.rule_id, rule.errors);
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - **Lossless format**: re-saving an unmodified library is byte-identical
//! - **Symbol model**: inheritance, units, pin stacks and geometry queries
//! - **KLC rules**: general, graphics, pins, metadata and special symbols
//! - **Reports**: JSON error log, JUnit XML and metrics lines

pub mod analyzer;
pub mod checker;
pub mod core;
pub mod geometry;
pub mod parser;
pub mod report;
pub mod symbol;

// Re-export main types
pub use crate::core::{
    discover_symbol_files, CheckOptions, CheckSummary, KlcCore, KlcError, LibraryReport,
    RuleReport, SymbolReport,
};
pub use analyzer::{Rule, RuleContext, RuleInstance, RuleLog, RuleRegistry, Severity};
pub use parser::{ParseError, SExp};
pub use symbol::{FormatError, Library, Pin, Symbol};

/// Load a symbol library from a `.kicad_sym` file or `.kicad_symdir` directory.
pub fn load_library(path: &std::path::Path) -> Result<Library, KlcError> {
    Ok(Library::from_path(path)?)
}

/// Check a single library with the given options (convenience wrapper).
pub fn check_library(
    path: &std::path::Path,
    options: CheckOptions,
) -> Result<LibraryReport, KlcError> {
    Ok(KlcCore::new(options)?.check_library(path))
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CheckOptions, CheckSummary, KlcCore, KlcError, Library, Rule, RuleContext, RuleLog,
        Severity, Symbol,
    };
}
