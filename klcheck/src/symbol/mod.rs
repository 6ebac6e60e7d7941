//! Structured model of a `.kicad_sym` library.
//!
//! [`Library::parse`] turns the token tree into symbols, properties, pins and
//! graphic primitives, resolves `extends` chains, and [`Library::write`]
//! serializes everything back in a canonical order so an unmodified library
//! re-saves byte for byte.

mod graphics;
mod kicad_symbol;
mod library;
mod reader;
mod types;
mod writer;

pub use graphics::{Arc, Bezier, Circle, Fill, FillType, Polyline, Rectangle, Stroke, Text};
pub use kicad_symbol::{Symbol, UnitNode};
pub use library::{Library, LibrarySource};
pub use types::{
    AltFunction, Color, ElectricalType, EmbeddedFile, Justify, Pin, PinShape, Property,
    Rotation, TextEffect,
};
pub use writer::ToSExp;

use crate::parser::ParseError;
use thiserror::Error;

/// The only file-format version the model reads and writes.
pub const SUPPORTED_VERSION: &str = "20251024";

/// Generator name written to libraries created or re-saved by this crate.
pub const GENERATOR: &str = "klcheck";

/// Default pin-name offset (20 mil) assumed when `pin_names` omits it.
pub const DEFAULT_PIN_NAMES_OFFSET: f64 = 0.508;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Problem while parsing the s-expr file: {0}")]
    SExp(#[from] ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Version of symbol file is \"{found}\", not \"{expected}\"")]
    VersionMismatch { found: String, expected: String },
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: String, context: String },
    #[error("Duplicate symbols: {0}")]
    DuplicateSymbol(String),
    #[error("Symbol {0} extends itself")]
    SelfExtension(String),
    #[error("Symbol {0} has a circular inheritance")]
    CircularInheritance(String),
    #[error("Parent {parent} of symbol {symbol} not found")]
    MissingParent { symbol: String, parent: String },
    #[error("Failed to parse subsymbol due to invalid name: {0}")]
    InvalidSubSymbolName(String),
    #[error("Invalid 'rotation' attribute value for pin: {0} (must be one of 0, 90, 180, 270)")]
    InvalidRotation(f64),
    #[error("Unknown {kind} '{value}'")]
    UnknownKeyword { kind: &'static str, value: String },
}

impl FormatError {
    pub(crate) fn missing(field: &str, context: impl Into<String>) -> Self {
        FormatError::MissingField {
            field: field.to_string(),
            context: context.into(),
        }
    }
}

/// Convert mil to millimeters, rounded to 6 decimals.
pub fn mil_to_mm(mil: f64) -> f64 {
    (mil * 0.0254 * 1e6).round() / 1e6
}

/// Convert millimeters to whole mil.
pub fn mm_to_mil(mm: f64) -> i64 {
    (mm / 0.0254).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(mil_to_mm(100.0), 2.54);
        assert_eq!(mil_to_mm(50.0), 1.27);
        assert_eq!(mm_to_mil(2.54), 100);
        assert_eq!(mm_to_mil(0.508), 20);
        assert_eq!(mm_to_mil(-1.27), -50);
    }
}
