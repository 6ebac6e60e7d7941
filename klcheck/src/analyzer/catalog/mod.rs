//! Concrete KLC rules.

mod extended;
mod general;
mod graphics;
mod metadata;
mod pins;
mod special;

pub use extended::{BasicGeometry, FieldPlacement};
pub use general::{DefaultFont, LineEndings, NoEmbeddedFiles, SymbolNameCharacters};
pub use graphics::{OriginCentered, PinNameOffset, TextSize};
pub use metadata::{FootprintFilters, MandatoryFields, ReferencePrefix};
pub use pins::{HiddenPins, MissingPins, PinPlacement, PinRequirements, PinStacking, PinTypes};
pub use special::{GraphicalSymbols, PowerFlagSymbols};

use regex::Regex;

use super::rules::RuleRegistry;
use crate::symbol::{mm_to_mil, Pin};

/// Register every rule of the catalog, in report order.
pub fn register_all(registry: &mut RuleRegistry) {
    registry.register("G1.1", || Box::new(SymbolNameCharacters));
    registry.register("G1.7", || Box::new(LineEndings));
    registry.register("G1.10", || Box::new(NoEmbeddedFiles));
    registry.register("G1.11", || Box::new(DefaultFont));
    registry.register("S3.1", || Box::new(OriginCentered));
    registry.register("S3.2", || Box::new(TextSize));
    registry.register("S3.6", || Box::new(PinNameOffset));
    registry.register("S4.1", || Box::new(PinRequirements));
    registry.register("S4.2", || Box::new(PinPlacement));
    registry.register("S4.3", || Box::new(PinStacking));
    registry.register("S4.4", || Box::new(PinTypes));
    registry.register("S4.5", || Box::new(MissingPins));
    registry.register("S4.6", || Box::new(HiddenPins));
    registry.register("S5.2", || Box::new(FootprintFilters));
    registry.register("S6.1", || Box::new(ReferencePrefix));
    registry.register("S6.2", || Box::new(MandatoryFields));
    registry.register("S7.1", || Box::new(PowerFlagSymbols));
    registry.register("S7.2", || Box::new(GraphicalSymbols));
    registry.register("EC01", || Box::new(BasicGeometry));
    registry.register("EC02", || Box::new(FieldPlacement));
}

/// `Pin NAME (NUM) @ (x,y)` with coordinates in mil.
pub(crate) fn pin_string(pin: &Pin) -> String {
    format!(
        "Pin {} ({}) @ ({},{})",
        pin.name,
        pin.number,
        mm_to_mil(pin.pos.x),
        mm_to_mil(pin.pos.y)
    )
}

/// Like [`pin_string`] but with the unit appended.
pub(crate) fn pin_string_in_unit(pin: &Pin) -> String {
    format!("{} in unit {}", pin_string(pin), pin.unit)
}

/// Letters, digits and `_-.+,`; power and graphic symbols may start with `~`.
pub(crate) fn is_valid_name(name: &str, allow_tilde: bool) -> bool {
    let name = name.strip_prefix('~').filter(|_| allow_tilde).unwrap_or(name);
    name.chars()
        .all(|c| c.is_alphanumeric() || "_-.+,".contains(c))
}

/// Compile a fixed, case-insensitive pattern list.
pub(crate) fn pattern_set(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
        .collect()
}

pub(crate) fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}
