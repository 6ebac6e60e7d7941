//! Footprint filter (S5.2), reference prefix (S6.1) and symbol field (S6.2) rules.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::is_valid_name;
use crate::analyzer::rules::{Rule, RuleContext, RuleLog};
use crate::symbol::Symbol;

static PACKAGE_PIN_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(SOIC|SOIJ|SIP|DIP|SO|SOT-\d+|SOT\d+|QFN|DFN|QFP|SOP|TO-\d+|VSO|PGA|BGA|LLC|LGA)-\d+[W-_\*\?$]+",
    )
    .expect("valid package pattern")
});

static KEYWORD_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\W|\.$|[,:;?!<>]").expect("valid punctuation pattern"));

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid word pattern"));

static TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+|-").expect("valid split pattern"));

static WORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid split pattern"));

const FILLER_WORDS: &[&str] = &[
    "and", "or", "the", "a", "an", "of", "in", "on", "at", "to", "with", "by", "for", "from", "as",
    "into", "onto", "upon", "over", "under", "through", "between", "among", "within", "without",
    "about", "after", "before", "during", "since", "until", "while", "till", "throughout",
    "along", "across", "against", "behind", "beside", "beyond", "inside", "outside",
];

/// S5.2
pub struct FootprintFilters;

impl FootprintFilters {
    fn filter_errors(filter: &str) -> Vec<&'static str> {
        let mut errors = Vec::new();
        if !filter.contains('*') {
            errors.push("Does not contain wildcard ('*') character");
        } else if !filter.ends_with('*') {
            errors.push("Does not end with ('*') character");
        }
        if filter.matches(':').count() > 1 {
            errors.push("Filter should not contain more than one (':') character");
        }
        errors
    }
}

impl Rule for FootprintFilters {
    fn id(&self) -> &'static str {
        "S5.2"
    }

    fn description(&self) -> &'static str {
        "Footprint filters should match all appropriate footprints"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        let filters = symbol.get_fp_filters();

        if filters.is_empty() && !symbol.is_graphic_symbol() && !symbol.is_power_symbol() {
            log.warning("No footprint filters defined");
        }

        for filter in filters {
            let errors = Self::filter_errors(filter);
            if !errors.is_empty() {
                log.error(format!(
                    "Footprint filter '{}' not correctly formatted",
                    filter
                ));
                for error in errors {
                    log.extra(error);
                }
            }

            if PACKAGE_PIN_COUNT.is_match(filter) {
                log.warning(format!(
                    "Footprint filter '{}' seems to contain pin-number, but should not!",
                    filter
                ));
            }
            if filter.contains('-') || filter.contains('_') {
                log.warning(format!(
                    "Minuses and underscores in footprint filter '{}' should be escaped with '?' or '*'.",
                    filter
                ));
            }
        }
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("FIX: not supported");
        false
    }
}

/// Reference designator prefixes required by specific libraries.
const LIBRARY_PREFIXES: &[(&str, &[&str])] = &[("Y", &["Oscillator"]), ("U", &["CI_Test_S6.x"])];

/// S6.1
pub struct ReferencePrefix;

impl Rule for ReferencePrefix {
    fn id(&self) -> &'static str {
        "S6.1"
    }

    fn description(&self) -> &'static str {
        "Reference designator prefix matches the library"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        let Some(reference) = symbol.get_property("Reference") else {
            log.error("Component is missing Reference field");
            return;
        };
        for (prefix, libraries) in LIBRARY_PREFIXES {
            if libraries.contains(&symbol.libname.as_str()) && !reference.value.starts_with(prefix) {
                log.error(format!(
                    "Library {} should have {} as RD prefix",
                    symbol.libname, prefix
                ));
            }
        }
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("not supported");
        false
    }
}

/// S6.2
pub struct MandatoryFields;

fn tokenize(text: &str, split_sub_tokens: bool) -> Vec<String> {
    let splitter: &Regex = if split_sub_tokens { &TOKEN_SPLIT } else { &WORD_SPLIT };
    splitter
        .split(text)
        .map(|t| t.trim().to_lowercase())
        .collect()
}

/// Description words without punctuation, deduplicated.
fn tokenize_description(text: &str, split_sub_tokens: bool) -> Vec<String> {
    let cleaned = NON_WORD.replace_all(text, "");
    let unique: BTreeSet<String> = tokenize(&cleaned, split_sub_tokens).into_iter().collect();
    unique.into_iter().collect()
}

fn joined(set: &BTreeSet<&str>) -> String {
    set.iter().copied().collect::<Vec<_>>().join(", ")
}

impl MandatoryFields {
    fn is_regular(symbol: &Symbol) -> bool {
        !symbol.is_graphic_symbol() && !symbol.is_power_symbol()
    }

    fn check_reference(symbol: &Symbol, log: &mut RuleLog) {
        let Some(reference) = symbol.get_property("Reference") else {
            log.error("Component is missing Reference field");
            return;
        };
        if Self::is_regular(symbol) {
            if reference.is_hidden {
                log.error("Reference field must be VISIBLE");
            }
        } else if !reference.is_hidden {
            log.error("Reference field must be INVISIBLE in graphic symbols or power-symbols");
        }
    }

    fn check_value(symbol: &Symbol, log: &mut RuleLog) {
        let Some(prop) = symbol.get_property("Value") else {
            log.error("Component is missing Value field");
            return;
        };
        let value = prop
            .value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(&prop.value);

        if Self::is_regular(symbol) {
            if value != symbol.name {
                log.error(format!("Value {} does not match component name.", value));
            }
            if prop.is_hidden {
                log.error("Value field must be VISIBLE");
            }
        } else if value != symbol.name && format!("~{}", value) != symbol.name {
            log.error(format!("Value {} does not match component name.", value));
        }

        let allow_tilde = symbol.is_graphic_symbol() || symbol.is_power_symbol();
        if !is_valid_name(&symbol.name, allow_tilde) {
            log.error(format!(
                "Symbol name '{}' contains invalid characters as per KLC 1.7",
                symbol.name
            ));
        }
    }

    fn check_footprint(symbol: &Symbol, log: &mut RuleLog) {
        match symbol.get_property("Footprint") {
            None => log.error("Component is missing Footprint field"),
            Some(prop) if !prop.is_hidden => log.error("Footprint field must be INVISIBLE"),
            Some(_) => {}
        }
    }

    fn check_datasheet(symbol: &Symbol, log: &mut RuleLog) {
        let Some(datasheet) = symbol.get_property("Datasheet") else {
            log.error("Component is missing Datasheet field");
            return;
        };
        if !datasheet.is_hidden {
            log.error("Datasheet field must be INVISIBLE");
        }
        if !Self::is_regular(symbol) {
            return;
        }

        let value = datasheet.value.as_str();
        if value.is_empty() {
            log.error("Datasheet field must not be EMPTY");
        }
        if value.len() > 2 {
            let looks_like_link = ["http", "www", "ftp"].iter().any(|p| value.starts_with(p))
                || value.ends_with(".pdf")
                || value.contains(".htm");
            if !looks_like_link {
                log.warning(format!(
                    "Datasheet entry '{}' does not look like a URL",
                    value
                ));
            }
        }
    }

    fn check_description(symbol: &Symbol, log: &mut RuleLog) {
        let Some(description) = symbol.get_property("Description") else {
            if !symbol.is_power_symbol() {
                log.error("Missing Description field on 'Properties' tab");
            }
            return;
        };
        if description
            .value
            .to_lowercase()
            .contains(&symbol.name.to_lowercase())
        {
            log.warning("Symbol name should not be included in description");
        }
    }

    fn check_keywords(symbol: &Symbol, log: &mut RuleLog) {
        let Some(keywords) = symbol.get_property("ki_keywords") else {
            if !symbol.is_power_symbol() {
                log.warning("Missing or empty Keywords field on 'Properties' tab. If you have nothing to add here, add the manufacturer e.g. 'texas'");
            }
            return;
        };
        let keywords = keywords.value.as_str();

        let punctuation: Vec<&str> = KEYWORD_PUNCTUATION
            .find_iter(keywords)
            .map(|m| m.as_str())
            .collect();
        if !punctuation.is_empty() {
            log.error(format!(
                "Symbol keywords contain forbidden characters: {:?}",
                punctuation
            ));
        }

        let sub_tokens = tokenize(keywords, true);
        let fillers: BTreeSet<&str> = sub_tokens
            .iter()
            .map(String::as_str)
            .filter(|t| FILLER_WORDS.contains(t))
            .collect();
        if !fillers.is_empty() {
            log.error(format!(
                "S6.2.7b: Symbol keywords contain forbidden filler words: {}",
                joined(&fillers)
            ));
        }

        let description = symbol.property_value("Description");
        Self::check_keyword_aliases(keywords, description, log);
    }

    /// Common abbreviations must appear together with their spelled-out form.
    fn check_keyword_aliases(keywords: &str, description: &str, log: &mut RuleLog) {
        let description_tokens = tokenize_description(description, false);
        let mut all_tokens = tokenize(keywords, false);
        all_tokens.extend(description_tokens.iter().cloned());
        let mut all_sub_tokens = tokenize(keywords, true);
        all_sub_tokens.extend(tokenize_description(description, true));

        let has = |tokens: &[String], word: &str| tokens.iter().any(|t| t == word);

        if has(&all_sub_tokens, "operational")
            && has(&description_tokens, "amplifier")
            && !has(&all_sub_tokens, "opamp")
        {
            log.warning("Metadata contains 'operational amplifier', please add 'opamp' to the keywords");
        }
        if has(&all_sub_tokens, "opamp")
            && !(has(&all_sub_tokens, "operational") && has(&all_sub_tokens, "amplifier"))
        {
            log.warning("Metadata contains 'opamp', please add 'operational-amplifier' to the keywords");
        }

        if has(&all_tokens, "low-dropout")
            && has(&all_sub_tokens, "regulator")
            && !has(&all_tokens, "ldo")
        {
            log.warning("Metadata contains 'low-dropout .. regulator', please add 'ldo' to the keywords");
        }
        if has(&all_tokens, "ldo")
            && !(has(&all_tokens, "low-dropout") && has(&all_sub_tokens, "regulator"))
        {
            log.warning("Metadata contains 'LDO', please add 'low-dropout-regulator' to the keywords");
        }
    }
}

impl Rule for MandatoryFields {
    fn id(&self) -> &'static str {
        "S6.2"
    }

    fn description(&self) -> &'static str {
        "Symbol fields and metadata filled out as required"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        Self::check_reference(symbol, log);
        Self::check_value(symbol, log);
        Self::check_footprint(symbol, log);
        Self::check_datasheet(symbol, log);
        Self::check_description(symbol, log);
        Self::check_keywords(symbol, log);
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("not supported");
        false
    }
}
