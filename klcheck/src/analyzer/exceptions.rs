//! Rule exceptions declared inside the symbol itself.
//!
//! A private property named `KLC_<rule>` or `KLC_<rule>_<tag>` excuses the
//! symbol from that rule. Public properties with such names are ignored. The property value is the payload; rules that opt into
//! fine-grained handling read it themselves.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::symbol::Symbol;

static EXCEPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^KLC_([^_]+)(?:_(.*))?$").expect("valid exception pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleException {
    pub rule_id: String,
    pub tag: Option<String>,
    pub payload: String,
}

impl RuleException {
    /// Parse a property name/value pair, if the name is an exception key.
    pub fn parse(name: &str, value: &str) -> Option<Self> {
        let caps = EXCEPTION_RE.captures(name)?;
        Some(Self {
            rule_id: caps[1].to_string(),
            tag: caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .filter(|t| !t.is_empty()),
            payload: value.trim().to_string(),
        })
    }

    /// First whitespace-separated word of the payload.
    pub fn subject(&self) -> Option<&str> {
        self.payload.split_whitespace().next()
    }

    /// `tag: payload; ` as shown in reports.
    pub fn note(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}: {}; ", tag, self.payload),
            None => format!("{}; ", self.payload),
        }
    }
}

/// Exceptions of one symbol, keyed by rule id.
#[derive(Debug, Clone, Default)]
pub struct ExceptionMap {
    by_rule: BTreeMap<String, Vec<RuleException>>,
}

impl ExceptionMap {
    pub fn from_symbol(symbol: &Symbol) -> Self {
        let mut by_rule: BTreeMap<String, Vec<RuleException>> = BTreeMap::new();
        for exception in symbol
            .properties
            .iter()
            .filter(|p| p.private)
            .filter_map(|p| RuleException::parse(&p.name, &p.value))
        {
            by_rule
                .entry(exception.rule_id.clone())
                .or_default()
                .push(exception);
        }
        if !by_rule.is_empty() {
            tracing::debug!(
                "Symbol {} declares exceptions for {:?}",
                symbol.name,
                by_rule.keys().collect::<Vec<_>>()
            );
        }
        Self { by_rule }
    }

    pub fn for_rule(&self, rule_id: &str) -> &[RuleException] {
        self.by_rule.get(rule_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Concatenated notes for a rule.
    pub fn notes(&self, rule_id: &str) -> String {
        self.for_rule(rule_id).iter().map(RuleException::note).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rule.is_empty()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.by_rule.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Property;

    #[test]
    fn test_parse_plain_and_tagged() {
        let plain = RuleException::parse("KLC_S4.2", "VCC on left").unwrap();
        assert_eq!(plain.rule_id, "S4.2");
        assert_eq!(plain.tag, None);
        assert_eq!(plain.subject(), Some("VCC"));

        let tagged = RuleException::parse("KLC_S3.1_offset", "body drawn off-center").unwrap();
        assert_eq!(tagged.rule_id, "S3.1");
        assert_eq!(tagged.tag.as_deref(), Some("offset"));
        assert_eq!(tagged.note(), "offset: body drawn off-center; ");

        assert!(RuleException::parse("Footprint", "x").is_none());
        assert!(RuleException::parse("KLC_", "x").is_none());
    }

    #[test]
    fn test_map_from_symbol() {
        let mut sym = crate::symbol::Symbol::empty("U", "lib");
        sym.properties.push(Property::new("KLC_S4.2", "GND").hidden().private());
        sym.properties.push(Property::new("KLC_S4.2_b", "VDD").hidden().private());
        sym.properties.push(Property::new("KLC_G1.1", "legacy").hidden().private());

        let map = ExceptionMap::from_symbol(&sym);
        assert_eq!(map.for_rule("S4.2").len(), 2);
        assert_eq!(map.for_rule("S4.1").len(), 0);
        assert_eq!(map.notes("S4.2"), "GND; b: VDD; ");
        assert_eq!(map.rule_ids().collect::<Vec<_>>(), vec!["G1.1", "S4.2"]);
    }

    #[test]
    fn test_public_properties_are_not_exceptions() {
        let mut sym = crate::symbol::Symbol::empty("U", "lib");
        sym.properties.push(Property::new("KLC_G1.1", "visible note"));
        sym.properties.push(Property::new("KLC_S4.2", "GND").hidden());
        assert!(ExceptionMap::from_symbol(&sym).is_empty());

        sym.properties[1].private = true;
        let map = ExceptionMap::from_symbol(&sym);
        assert_eq!(map.rule_ids().collect::<Vec<_>>(), vec!["S4.2"]);
    }
}
