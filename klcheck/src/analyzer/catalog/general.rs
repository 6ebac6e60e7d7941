//! General rules (G1.x) applying to every library item.

use crate::analyzer::rules::{Rule, RuleContext, RuleLog};
use crate::symbol::Symbol;

/// G1.1
pub struct SymbolNameCharacters;

impl Rule for SymbolNameCharacters {
    fn id(&self) -> &'static str {
        "G1.1"
    }

    fn description(&self) -> &'static str {
        "Only standard characters are used for naming libraries and components"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        let illegal: String = symbol
            .name
            .chars()
            .enumerate()
            .filter(|&(i, c)| {
                let allowed = c.is_ascii_alphanumeric() || "_-.+,".contains(c);
                let special_start = i == 0 && (c == '~' || c == '#');
                !allowed && !special_start
            })
            .map(|(_, c)| c)
            .collect();

        if !illegal.is_empty() {
            log.error("Symbol name must contain only legal characters");
            log.extra(format!(
                "Name '{}' contains illegal characters '{}'",
                symbol.name, illegal
            ));
        }
    }
}

/// G1.7, evaluated once per library on its first symbol.
pub struct LineEndings;

impl Rule for LineEndings {
    fn id(&self) -> &'static str {
        "G1.7"
    }

    fn description(&self) -> &'static str {
        "Library files must use Unix-style line endings (LF)"
    }

    fn check(&self, symbol: &Symbol, ctx: &RuleContext<'_>, log: &mut RuleLog) {
        let Some(library) = ctx.library else {
            return;
        };
        let is_first = library
            .symbols
            .first()
            .map_or(false, |first| first.name == symbol.name);
        if library.crlf && is_first {
            log.error("Incorrect line endings (.kicad_sym)");
            log.extra("Library files must use Unix-style line endings (LF)");
        }
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        // Writing always emits LF.
        log.success("Line endings will be corrected on save");
        true
    }
}

/// G1.10
pub struct NoEmbeddedFiles;

impl Rule for NoEmbeddedFiles {
    fn id(&self) -> &'static str {
        "G1.10"
    }

    fn description(&self) -> &'static str {
        "Symbols don't contain embedded files"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.embedded_fonts {
            log.error("The checkbox 'embed fonts' must be unchecked.");
            return;
        }
        if !symbol.files.is_empty() {
            log.error("No files should be embedded in symbols");
            for file in &symbol.files {
                log.extra(format!(
                    "Found file \"{}\" of type \"{}\"",
                    file.name, file.file_type
                ));
            }
        }
    }
}

/// G1.11
pub struct DefaultFont;

impl Rule for DefaultFont {
    fn id(&self) -> &'static str {
        "G1.11"
    }

    fn description(&self) -> &'static str {
        "All text should use the default KiCad stroke font"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        for prop in &symbol.properties {
            if let Some(face) = &prop.effects.face {
                log.error(format!("Property uses font {}", face));
                log.extra(format!(
                    "Text item \"{}\" with value \"{}\" at ({}, {})",
                    prop.name, prop.value, prop.pos.x, prop.pos.y
                ));
            }
        }
        for text in &symbol.texts {
            if let Some(face) = &text.effects.face {
                log.error(format!("Text uses font {}", face));
                log.extra(format!(
                    "Text item \"{}\" at ({}, {})",
                    text.text, text.pos.x, text.pos.y
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::symbol::{EmbeddedFile, Library, Text};

    fn run(rule: &dyn Rule, symbol: &Symbol, library: Option<&Library>) -> RuleLog {
        let mut log = RuleLog::new();
        rule.check(symbol, &RuleContext::new(library, &[]), &mut log);
        log
    }

    #[test]
    fn test_name_characters() {
        assert_eq!(run(&SymbolNameCharacters, &Symbol::empty("~RESET+1,2", "l"), None).error_count(), 0);
        assert_eq!(run(&SymbolNameCharacters, &Symbol::empty("#PWR01", "l"), None).error_count(), 0);
        let log = run(&SymbolNameCharacters, &Symbol::empty("LM 358/A", "l"), None);
        assert_eq!(log.error_count(), 1);
        assert_eq!(
            log.entries()[0].extras[0],
            "Name 'LM 358/A' contains illegal characters ' /'"
        );
    }

    #[test]
    fn test_line_endings_reported_on_first_symbol() {
        let mut lib = Library::new("crlf.kicad_sym");
        lib.crlf = true;
        lib.add_symbol(Symbol::empty("A", "crlf")).unwrap();
        lib.add_symbol(Symbol::empty("B", "crlf")).unwrap();
        assert_eq!(run(&LineEndings, &lib.symbols[0], Some(&lib)).error_count(), 1);
        assert_eq!(run(&LineEndings, &lib.symbols[1], Some(&lib)).error_count(), 0);
    }

    #[test]
    fn test_embedded_files() {
        let mut sym = Symbol::empty("U", "l");
        sym.files.push(EmbeddedFile {
            name: "logo.png".to_string(),
            file_type: "other".to_string(),
            data: Vec::new(),
            checksum: None,
        });
        let log = run(&NoEmbeddedFiles, &sym, None);
        assert_eq!(log.error_count(), 1);
        assert!(log.entries()[0].extras[0].contains("logo.png"));

        let mut fix_log = RuleLog::new();
        assert!(!NoEmbeddedFiles.fix(&mut sym, &mut fix_log));
    }

    #[test]
    fn test_custom_font() {
        let mut sym = Symbol::empty("U", "l");
        let mut text = Text::new("hello", Point::origin());
        text.effects.face = Some("Arial".to_string());
        sym.push_text(text);
        assert_eq!(run(&DefaultFont, &sym, None).error_count(), 1);
    }
}
