//! Example: registering an extra rule next to the KLC catalog.
//! Run with: cargo run --example custom_rules [path/to/library.kicad_sym]

use klcheck::analyzer::RuleRegistry;
use klcheck::prelude::*;
use std::path::Path;

/// Flags symbols without a datasheet link.
struct DatasheetRequired;

impl Rule for DatasheetRequired {
    fn id(&self) -> &'static str {
        "X1.1"
    }

    fn description(&self) -> &'static str {
        "Symbols link a datasheet"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_power_symbol() || symbol.is_graphic_symbol() {
            return;
        }
        let datasheet = symbol.property_value("Datasheet");
        if datasheet.is_empty() || datasheet == "~" {
            log.warning(format!("Symbol '{}' has no datasheet", symbol.name));
        }
    }

    fn url(&self) -> String {
        "https://example.com/library-rules#x1.1".to_string()
    }
}

fn main() -> Result<(), KlcError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/Device.kicad_sym".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example custom_rules [path/to/library.kicad_sym]");
        std::process::exit(1);
    }

    let mut registry = RuleRegistry::with_default_rules();
    registry.register("X1.1", || Box::new(DatasheetRequired));

    let options = CheckOptions {
        rules: vec!["X1.1".to_string(), "S6.2".to_string()],
        ..Default::default()
    };
    let core = KlcCore::with_registry(options, registry)?;
    let report = core.check_library(path);

    println!("Checked {} symbols in {}", report.symbols.len(), path.display());
    for symbol in &report.symbols {
        for rule in &symbol.rules {
            println!("  {}", rule.headline(&symbol.library, &symbol.name));
            for entry in &rule.entries {
                println!("    [{}] {}", entry.severity, entry.message);
            }
        }
    }

    if report.errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}
