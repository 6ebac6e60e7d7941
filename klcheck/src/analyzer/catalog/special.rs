//! Power-flag (S7.1) and graphical (S7.2) symbols.

use crate::analyzer::rules::{Rule, RuleContext, RuleLog};
use crate::symbol::{ElectricalType, Symbol};

fn has_footprint(symbol: &Symbol) -> bool {
    !symbol.property_value("Footprint").is_empty()
}

fn clear_footprint(symbol: &mut Symbol) {
    for name in ["Footprint", "ki_fp_filters"] {
        if let Some(prop) = symbol.get_property_mut(name) {
            prop.value.clear();
        }
    }
}

/// The pin name a power symbol's single pin must carry.
fn power_net_name(symbol: &Symbol) -> &str {
    symbol.name.strip_prefix('~').unwrap_or(&symbol.name)
}

/// S7.1
pub struct PowerFlagSymbols;

impl Rule for PowerFlagSymbols {
    fn id(&self) -> &'static str {
        "S7.1"
    }

    fn description(&self) -> &'static str {
        "Power flag symbols"
    }

    fn check(&self, symbol: &Symbol, ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if !symbol.is_power_symbol() {
            return;
        }

        let pins = &ctx.root_of(symbol).pins;
        if pins.len() != 1 {
            log.error("Power-flag symbols have exactly one pin");
        } else {
            let pin = &pins[0];
            if pin.etype != ElectricalType::PowerIn {
                log.error("The pin in power-flag symbols has to be of a POWER-INPUT");
            }
            if !pin.is_hidden {
                log.error("The pin in power-flag symbols has to be INVISIBLE");
            }
            if pin.name != symbol.name && format!("~{}", pin.name) != symbol.name {
                log.error(format!(
                    "The pin name ({}) in power-flag symbols has to be the same as the component name ({})",
                    pin.name, symbol.name
                ));
            }
        }

        if has_footprint(symbol) {
            log.error(format!(
                "Power symbols have no footprint association (footprint is set to '{}')",
                symbol.property_value("Footprint")
            ));
        }
        if symbol.property_value("Reference") != "#PWR" {
            log.error("Power symbols have Reference set to '#PWR' ");
        }
        if !symbol.get_fp_filters().is_empty() {
            log.error("Graphical symbols have no footprint filters");
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        if !symbol.is_power_symbol() {
            return false;
        }
        let mut changed = false;

        if symbol.pins.len() > 1 || (symbol.pins.is_empty() && !symbol.is_derived()) {
            log.info("FIX for too many pins in power-symbol not supported");
        }
        let net_name = power_net_name(symbol).to_string();
        let symbol_name = symbol.name.clone();
        if let [pin] = symbol.pins.as_mut_slice() {
            if pin.etype != ElectricalType::PowerIn {
                log.info("FIX: switching pin-type to power-input");
                pin.etype = ElectricalType::PowerIn;
                changed = true;
            }
            if !pin.is_hidden {
                log.info("FIX: making pin invisible");
                pin.is_hidden = true;
                changed = true;
            }
            if pin.name != symbol_name && format!("~{}", pin.name) != symbol_name {
                log.info(format!("FIX: change pin name to '{}'", net_name));
                pin.name = net_name;
                changed = true;
            }
        }

        if has_footprint(symbol) || !symbol.get_fp_filters().is_empty() {
            log.info("FIX empty footprint association and FPFilters");
            clear_footprint(symbol);
            changed = true;
        }
        changed
    }
}

/// S7.2
pub struct GraphicalSymbols;

impl Rule for GraphicalSymbols {
    fn id(&self) -> &'static str {
        "S7.2"
    }

    fn description(&self) -> &'static str {
        "Graphical symbols follow some special rules/KLC-exceptions"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() || !symbol.is_graphic_symbol() {
            return;
        }

        if !symbol.pins.is_empty() {
            log.error("Graphical symbols have no pins");
        }
        if has_footprint(symbol) {
            log.error(format!(
                "Graphical symbols have no footprint association (footprint was set to '{}')",
                symbol.property_value("Footprint")
            ));
        }
        if !symbol.get_fp_filters().is_empty() {
            log.error("Graphical symbols have no footprint filters");
        }

        match symbol.get_property("Reference") {
            None => log.error("Graphical symbols have a Reference property"),
            Some(reference) => {
                if reference.value != "#SYM" {
                    log.error("Graphical symbols have Reference set to '#SYM' ");
                }
                if !reference.is_hidden {
                    log.error("Graphical symbols have a hidden Reference");
                }
            }
        }
        match symbol.get_property("Value") {
            None => log.error("Graphical symbols have a Value property"),
            Some(value) if !value.is_hidden => log.error("Graphical symbols have a hidden Value"),
            Some(_) => {}
        }

        if symbol.in_bom {
            log.error("Graphical symbols must be 'Excluded from schematic bill of materials'");
        }
        if symbol.on_board {
            log.error("Graphical symbols must be 'Excluded from board'");
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        if symbol.is_derived() || !symbol.is_graphic_symbol() {
            return false;
        }
        let mut changed = false;
        if !symbol.pins.is_empty() {
            log.info("FIX for too many pins in graphical symbol");
            symbol.pins.clear();
            changed = true;
        }
        if has_footprint(symbol) || !symbol.get_fp_filters().is_empty() {
            log.info("FIX empty footprint association and FPFilters");
            clear_footprint(symbol);
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Pin, Rotation};

    fn run(rule: &dyn Rule, symbol: &Symbol) -> RuleLog {
        let mut log = RuleLog::new();
        rule.check(symbol, &RuleContext::default(), &mut log);
        log
    }

    fn power(name: &str) -> Symbol {
        let mut sym = Symbol::new(name, "power", "#PWR", "", "", "global power", "Power symbol", &[]);
        sym.is_power = true;
        let mut pin = Pin::new(name, "1", ElectricalType::PowerIn).at(0.0, 0.0, Rotation::R90);
        pin.is_hidden = true;
        sym.push_pin(pin);
        sym
    }

    #[test]
    fn test_valid_power_symbol() {
        assert_eq!(run(&PowerFlagSymbols, &power("GND")).error_count(), 0);
    }

    #[test]
    fn test_power_symbol_fix() {
        let mut sym = power("+5V");
        sym.pins[0].etype = ElectricalType::Passive;
        sym.pins[0].is_hidden = false;
        sym.pins[0].name = "VCC".to_string();
        sym.set_property_value("Footprint", "Connector:Pin");
        assert_eq!(run(&PowerFlagSymbols, &sym).error_count(), 4);

        let mut log = RuleLog::new();
        assert!(PowerFlagSymbols.fix(&mut sym, &mut log));
        assert_eq!(run(&PowerFlagSymbols, &sym).error_count(), 0);
        assert_eq!(sym.pins[0].name, "+5V");
    }

    #[test]
    fn test_graphical_symbol() {
        let mut sym = Symbol::new("Logo", "graphic", "#SYM", "", "", "", "", &[]);
        sym.get_property_mut("Reference").unwrap().is_hidden = true;
        sym.get_property_mut("Value").unwrap().is_hidden = true;
        sym.in_bom = false;
        sym.on_board = false;
        assert_eq!(run(&GraphicalSymbols, &sym).error_count(), 0);

        sym.push_pin(Pin::new("1", "1", ElectricalType::Passive));
        sym.set_property_value("ki_fp_filters", "Logo*");
        assert_eq!(run(&GraphicalSymbols, &sym).error_count(), 2);
        let mut log = RuleLog::new();
        assert!(GraphicalSymbols.fix(&mut sym, &mut log));
        assert!(sym.pins.is_empty());
        assert_eq!(run(&GraphicalSymbols, &sym).error_count(), 0);
    }
}
