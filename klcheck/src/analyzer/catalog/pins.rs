//! Pin rules (S4.x).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::{matches_any, pattern_set, pin_string, pin_string_in_unit};
use crate::analyzer::rules::{Rule, RuleContext, RuleLog};
use crate::symbol::{mil_to_mm, mm_to_mil, ElectricalType, Pin, PinShape, Symbol};

static GROUND_PINS: Lazy<Vec<Regex>> =
    Lazy::new(|| pattern_set(&[r"^[ad]*g(rou)*nd(a)*$", r"^[ad]*v(ss)$"]));

static POSITIVE_POWER_PINS: Lazy<Vec<Regex>> =
    Lazy::new(|| pattern_set(&[r"^[ad]*v(aa|cc|dd|bat|in)$", r"^in\+?$"]));

static POWER_INPUT_NAMES: Lazy<Vec<Regex>> =
    Lazy::new(|| pattern_set(&[r"^[ad]*g(rou)*nd(a)*$", r"^[ad]*v(aa|cc|dd|ss|bat|in)$"]));

static NC_PINS: Lazy<Vec<Regex>> = Lazy::new(|| pattern_set(&[r"^nc$", r"^dnc$", r"^n\.c\.$"]));

static OVERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~\{.+\}").expect("valid overline pattern"));

/// Name patterns suggesting an electrical type, checked in order.
static SUGGESTED_TYPES: Lazy<Vec<(ElectricalType, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (ElectricalType::PowerOut, pattern_set(&[r"^vout$"])),
        (
            ElectricalType::Input,
            pattern_set(&[r"^sdi$", r"^cl(oc)*k(in)*$", r"^~*cs~*$", r"^[av]ref$"]),
        ),
        (ElectricalType::Output, pattern_set(&[r"^sdo$", r"^cl(oc)*kout$"])),
        (ElectricalType::Bidirectional, pattern_set(&[r"^sda$", r"^s*dio$"])),
    ]
});

fn pin_index(symbol: &Symbol, pin: &Pin) -> Option<usize> {
    symbol.pins.iter().position(|p| std::ptr::eq(p, pin))
}

/// Grid and length thresholds (mil) for a symbol.
struct PinLimits {
    grid: i64,
    error_length: i64,
    warning_length: i64,
    min_length: f64,
}

impl PinLimits {
    fn for_symbol(symbol: &Symbol) -> Self {
        if symbol.is_small_component_heuristic() {
            Self {
                grid: 50,
                error_length: 24,
                warning_length: 49,
                min_length: 50.0,
            }
        } else {
            Self {
                grid: 100,
                error_length: 49,
                warning_length: 99,
                min_length: 100.0,
            }
        }
    }
}

/// S4.1
pub struct PinRequirements;

impl PinRequirements {
    fn check_origin(symbol: &Symbol, grid: i64, log: &mut RuleLog) {
        let mut reported = false;
        for pin in &symbol.pins {
            // NC pins may sit on the outline of a 50 mil pin.
            let grid = if pin.etype == ElectricalType::NoConnect { 50 } else { grid };
            let x = mm_to_mil(pin.pos.x);
            let y = mm_to_mil(pin.pos.y);
            if x % grid == 0 && y % grid == 0 {
                continue;
            }
            if !reported {
                log.error(format!(
                    "Pins not located on {}mil (={}mm) grid:",
                    grid,
                    mil_to_mm(grid as f64)
                ));
                reported = true;
            }
            log.error(format!(" - {} ", pin_string(pin)));
        }
    }

    fn check_length(symbol: &Symbol, limits: &PinLimits, log: &mut RuleLog) {
        for pin in &symbol.pins {
            let length = mm_to_mil(pin.length);
            // Zero-length pins are hidden power pins.
            if length == 0 {
                continue;
            }

            if length <= limits.error_length {
                log.error(format!(
                    "{} length ({}mils) is below {}mils",
                    pin_string(pin),
                    length,
                    limits.error_length + 1
                ));
            } else if length <= limits.warning_length {
                log.warning(format!(
                    "{} length ({}mils) is below {}mils",
                    pin_string(pin),
                    length,
                    limits.warning_length + 1
                ));
            }

            if length % 50 != 0 {
                log.warning(format!(
                    "{} length ({}mils) is not a multiple of 50mils",
                    pin_string(pin),
                    length
                ));
            }

            if length > 300 {
                log.error(format!(
                    "{} length ({}mils) is longer than maximum (300mils)",
                    pin_string(pin),
                    length
                ));
            }
        }
    }

    fn check_duplicates(symbol: &Symbol, log: &mut RuleLog) {
        let mut seen = HashSet::new();
        for pin in &symbol.pins {
            if !seen.insert((pin.number.as_str(), pin.demorgan, pin.unit)) {
                log.error(format!("Pin {} is duplicated:", pin.number));
                log.extra(pin_string(pin));
            }
        }
    }
}

impl Rule for PinRequirements {
    fn id(&self) -> &'static str {
        "S4.1"
    }

    fn description(&self) -> &'static str {
        "General pin requirements"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() {
            return;
        }
        let limits = PinLimits::for_symbol(symbol);
        Self::check_origin(symbol, limits.grid, log);
        Self::check_length(symbol, &limits, log);
        Self::check_duplicates(symbol, log);
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        if symbol.is_derived() {
            return false;
        }
        let limits = PinLimits::for_symbol(symbol);
        let mut changed = false;
        for pin in symbol.pins.iter_mut() {
            let length = mm_to_mil(pin.length);
            if length == 0 || length > limits.error_length {
                continue;
            }
            pin.length = mil_to_mm(limits.min_length);
            log.info(format!(
                "Setting length of pin {} ({}) to {}mils",
                pin.name, pin.number, limits.min_length
            ));
            changed = true;
        }
        if !changed {
            log.info("Fix not supported");
        }
        changed
    }
}

/// S4.2
pub struct PinPlacement;

impl Rule for PinPlacement {
    fn id(&self) -> &'static str {
        "S4.2"
    }

    fn description(&self) -> &'static str {
        "Pins should be grouped by function"
    }

    fn fine_grained_exceptions(&self) -> bool {
        true
    }

    fn check(&self, symbol: &Symbol, ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() || symbol.is_power_symbol() {
            return;
        }

        // An exception naming a pin excuses that pin; one naming no pin
        // excuses the whole symbol.
        let mut excused: Vec<(&str, &str)> = Vec::new();
        for exception in ctx.exceptions {
            match exception.subject() {
                Some(subject) if !symbol.get_pins_by_name(subject).is_empty() => {
                    excused.push((subject, exception.payload.as_str()))
                }
                _ => {
                    log.info(format!("Exception for symbol: {}", exception.payload));
                    return;
                }
            }
        }

        let mut to_check = Vec::new();
        for pin in &symbol.pins {
            match excused.iter().find(|(name, _)| *name == pin.name) {
                Some((_, payload)) => {
                    log.info(format!("Exception for {}: {}", pin_string(pin), payload))
                }
                None => to_check.push(pin),
            }
        }

        let mut first = true;
        for pin in to_check.iter().filter(|p| matches_any(&GROUND_PINS, &p.name)) {
            if pin.direction() != 'U' {
                if first {
                    log.warning("Ground and negative power pins should be placed at bottom of symbol");
                    first = false;
                }
                log.extra(pin_string(pin));
            }
        }

        let power_out: Vec<&Pin> = to_check
            .iter()
            .copied()
            .filter(|p| p.etype == ElectricalType::PowerOut)
            .collect();

        let mut seen = HashSet::new();
        for pin in to_check.iter().filter(|p| {
            p.etype == ElectricalType::PowerIn && matches_any(&POSITIVE_POWER_PINS, &p.name)
        }) {
            if seen.contains(pin.name.as_str()) {
                continue;
            }
            if power_out.is_empty() {
                if pin.direction() == 'D' {
                    continue;
                }
                log.error("Positive power pins should be placed at top of symbol");
                log.extra("Power conversion devices (e.g. regulators) with both power inputs and outputs are an exception (for these, inputs on left, outputs on right)");
            } else {
                if pin.direction() == 'R' {
                    continue;
                }
                log.error("For a power converter symbol, positive power pins should be placed at left of symbol");
                log.extra("This symbol has power input and output pins, so it is assumed to be a power converter. If this symbol not a power converter, you can ignore this error.");
            }
            log.extra(pin_string(pin));
            seen.insert(pin.name.as_str());
        }

        let mut seen = HashSet::new();
        for pin in power_out {
            if seen.contains(pin.name.as_str()) || pin.direction() == 'L' {
                continue;
            }
            log.error("Power output pins should be placed at right of symbol");
            log.extra(pin_string(pin));
            seen.insert(pin.name.as_str());
        }
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("Fixing not supported");
        false
    }
}

/// S4.3
pub struct PinStacking;

/// Types allowed to differ inside a power stack.
const SPECIAL_POWER_TYPES: [ElectricalType; 3] = [
    ElectricalType::PowerIn,
    ElectricalType::PowerOut,
    ElectricalType::Output,
];

impl PinStacking {
    fn lowest_number(pins: &[&Pin]) -> Option<u64> {
        pins.iter().filter_map(|p| p.number_int()).min()
    }

    fn warn_not_lowest(pin: &Pin, lowest: Option<u64>, warned: &mut bool, log: &mut RuleLog) {
        let (Some(number), Some(lowest)) = (pin.number_int(), lowest) else {
            return;
        };
        if number != lowest && !*warned {
            log.warning("The pin with the lowest number in a pinstack should be visible");
            log.extra(format!(
                "Pin {} is visible, the lowest number in this stack is {}",
                pin_string(pin),
                lowest
            ));
            *warned = true;
        }
    }

    fn count(pins: &[&Pin], etype: ElectricalType) -> usize {
        pins.iter().filter(|p| p.etype == etype).count()
    }

    /// Stacks mixing power types: one driving pin plus hidden passives, or
    /// outputs only.
    fn check_power_stack(pins: &[&Pin], log: &mut RuleLog) {
        let lowest = Self::lowest_number(pins);
        let mut warned = false;
        let total = pins.len();
        let power_in = Self::count(pins, ElectricalType::PowerIn);
        let power_out = Self::count(pins, ElectricalType::PowerOut);
        let output = Self::count(pins, ElectricalType::Output);
        let passive = Self::count(pins, ElectricalType::Passive);
        let others = total - power_in - power_out - output - passive;

        if passive == total - 1 && (power_in == 1 || power_out == 1 || output == 1) {
            let visible_passive: Vec<&&Pin> = pins
                .iter()
                .filter(|p| p.etype == ElectricalType::Passive && !p.is_hidden)
                .collect();
            if !visible_passive.is_empty() {
                log.error("Passive pins in a pinstack are hidden");
                for pin in visible_passive {
                    log.extra(format!("{} is of type {} and visible", pin_string(pin), pin.etype));
                }
            }

            if let Some(driver) = pins.iter().find(|p| p.etype != ElectricalType::Passive) {
                if driver.is_hidden {
                    log.error("Non passive pins in a pinstack are visible");
                    log.extra(format!(
                        "{} is of type {} and invisible",
                        pin_string(driver),
                        driver.etype
                    ));
                }
                Self::warn_not_lowest(driver, lowest, &mut warned, log);
            }
        } else if output == total || power_out == total {
            let visible: Vec<&&Pin> = pins.iter().filter(|p| !p.is_hidden).collect();
            if let Some(first) = visible.first() {
                Self::warn_not_lowest(first, lowest, &mut warned, log);
            }
            if visible.len() > 1 {
                log.error("Only one pin in a pinstack is visible");
                for pin in visible {
                    log.extra(format!("Pin {} is visible", pin_string(pin)));
                }
            }
        } else {
            log.error(format!(
                "Illegal pin stack configuration next to {}",
                pin_string(pins[0])
            ));
            log.extra(format!("Power input pins: {}", power_in));
            log.extra(format!("Power output pins: {}", power_out));
            log.extra(format!("Output pins: {}", output));
            log.extra(format!("Passive pins: {}", passive));
            log.extra(format!("Other type pins: {}", others));
        }
    }
}

impl Rule for PinStacking {
    fn id(&self) -> &'static str {
        "S4.3"
    }

    fn description(&self) -> &'static str {
        "Rules for pin stacking"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() {
            return;
        }

        for pins in symbol.get_pinstacks().values() {
            if pins.len() < 2 {
                continue;
            }

            let common_name = &pins[0].name;
            let common_etype = pins[0].etype;
            let lowest = Self::lowest_number(pins);
            let mut visible_pin: Option<&Pin> = None;
            let (mut non_numeric, mut names, mut visibility, mut types, mut warned) =
                (false, false, false, false, false);
            let mut power_stack = false;

            for pin in pins {
                if pin.number_int().is_none() && !non_numeric {
                    log.warning(format!(
                        "Found non-numeric pin in a pinstack: {}",
                        pin_string(pin)
                    ));
                    non_numeric = true;
                }

                if pin.etype == ElectricalType::NoConnect {
                    log.error(format!("NC {} is stacked on other pins", pin_string(pin)));
                }

                if &pin.name != common_name && !names {
                    log.error("Pin names in the stack have different names");
                    for p in pins {
                        log.extra(pin_string(p));
                    }
                    names = true;
                }

                if !pin.is_hidden {
                    if visible_pin.is_some() {
                        if !visibility {
                            log.error("A pin stack must have exactly one (1) visible pin");
                            for p in pins {
                                log.extra(format!("{} is visible", pin_string(p)));
                            }
                            visibility = true;
                        }
                    } else {
                        visible_pin = Some(*pin);
                    }
                    Self::warn_not_lowest(pin, lowest, &mut warned, log);
                }

                if pin.etype != common_etype {
                    if SPECIAL_POWER_TYPES.contains(&pin.etype)
                        || SPECIAL_POWER_TYPES.contains(&common_etype)
                    {
                        power_stack = true;
                    } else if !types {
                        log.error("Pin names in the stack have different electrical types");
                        for p in pins {
                            log.extra(format!("{} is of type {}", pin_string(p), p.etype));
                        }
                        types = true;
                    }
                }
            }

            if power_stack {
                Self::check_power_stack(pins, log);
            }
        }
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("FIX not supported (yet)! Please fix manually.");
        false
    }
}

/// S4.4
pub struct PinTypes;

impl PinTypes {
    /// Indices of pins named like power inputs but typed otherwise. Only
    /// the visible pin of a stack is considered, or all pins when none is.
    fn power_type_errors(symbol: &Symbol) -> Vec<usize> {
        let mut found = Vec::new();
        for stack in symbol.get_pinstacks().values() {
            let visible: Vec<&Pin> = stack.iter().copied().filter(|p| !p.is_hidden).collect();
            let candidates: Vec<&Pin> = match visible.first() {
                Some(pin) => vec![*pin],
                None => stack.clone(),
            };
            for pin in candidates {
                if matches_any(&POWER_INPUT_NAMES, &pin.name) && pin.etype != ElectricalType::PowerIn {
                    if let Some(idx) = pin_index(symbol, pin) {
                        if !found.contains(&idx) {
                            found.push(idx);
                        }
                    }
                }
            }
        }
        found
    }

    fn double_inversions(symbol: &Symbol) -> Vec<usize> {
        symbol
            .pins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.shape == PinShape::Inverted && OVERLINE.is_match(&p.name))
            .map(|(i, _)| i)
            .collect()
    }
}

impl Rule for PinTypes {
    fn id(&self) -> &'static str {
        "S4.4"
    }

    fn description(&self) -> &'static str {
        "Pin electrical type should match pin function"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() {
            return;
        }

        let power_errors = Self::power_type_errors(symbol);
        if !power_errors.is_empty() {
            log.error("Power pins should be of type POWER INPUT or POWER OUTPUT");
            for &idx in &power_errors {
                let pin = &symbol.pins[idx];
                log.extra(format!("{} is of type {}", pin_string(pin), pin.etype));
            }
        }

        for stack in symbol.get_pinstacks().values() {
            let visible = stack.iter().find(|p| !p.is_hidden);
            let powered = stack.len() > 1
                && visible.map_or(false, |p| p.etype == ElectricalType::PowerIn);
            if powered
                && stack
                    .iter()
                    .any(|p| p.is_hidden && p.etype != ElectricalType::Passive)
            {
                log.error("Invisible powerpins in stacks should be of type PASSIVE");
            }
        }

        let inversions = Self::double_inversions(symbol);
        if !inversions.is_empty() {
            log.error("Pins should not be inverted twice (with inversion-symbol on pin and overline on label)");
            for &idx in &inversions {
                log.extra(format!(
                    "{} : double inversion (overline + pin type:Inverting)",
                    pin_string(&symbol.pins[idx])
                ));
            }
        }

        let mut first = true;
        for pin in &symbol.pins {
            let Some((suggested, _)) = SUGGESTED_TYPES
                .iter()
                .find(|(_, patterns)| matches_any(patterns, &pin.name))
            else {
                continue;
            };
            if pin.etype != *suggested {
                if first {
                    log.warning("Pin types should match pin function");
                    first = false;
                }
                log.extra(format!(
                    "{} is type {} : suggested {}",
                    pin_string(pin),
                    pin.etype,
                    suggested
                ));
            }
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        if symbol.is_derived() {
            return false;
        }
        log.info("Fixing...");
        let power_errors = Self::power_type_errors(symbol);
        let inversions = Self::double_inversions(symbol);

        for &idx in &power_errors {
            let pin = &mut symbol.pins[idx];
            pin.etype = ElectricalType::PowerIn;
            log.info(format!("Changing pin {} type to POWER_INPUT", pin.number));
        }
        for &idx in &inversions {
            let pin = &mut symbol.pins[idx];
            pin.shape = PinShape::Line;
            log.info(format!("Removing double inversion on pin {}", pin.number));
        }
        !power_errors.is_empty() || !inversions.is_empty()
    }
}

/// S4.6
pub struct HiddenPins;

impl HiddenPins {
    fn nc_pins(symbol: &Symbol) -> impl Iterator<Item = (usize, &Pin)> {
        symbol.pins.iter().enumerate().filter(|(_, p)| {
            p.etype == ElectricalType::NoConnect || matches_any(&NC_PINS, &p.name)
        })
    }
}

impl Rule for HiddenPins {
    fn id(&self) -> &'static str {
        "S4.6"
    }

    fn description(&self) -> &'static str {
        "Hidden pins"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() {
            return;
        }

        let wrong_type: Vec<&Pin> = Self::nc_pins(symbol)
            .map(|(_, p)| p)
            .filter(|p| p.etype != ElectricalType::NoConnect)
            .collect();
        let visible: Vec<&Pin> = Self::nc_pins(symbol)
            .map(|(_, p)| p)
            .filter(|p| !p.is_hidden)
            .collect();

        if !wrong_type.is_empty() {
            log.error("NC pins are not correct pin-type:");
            for pin in wrong_type {
                log.extra(format!(
                    "{} should be of type NOT CONNECTED, but is of type {}",
                    pin_string_in_unit(pin),
                    pin.etype
                ));
            }
        }
        if !visible.is_empty() {
            log.warning("NC pins are VISIBLE (should be INVISIBLE):");
            for pin in visible {
                log.extra(format!("{} should be INVISIBLE", pin_string_in_unit(pin)));
            }
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        if symbol.is_derived() {
            return false;
        }
        log.info("Fixing...");
        let indices: Vec<usize> = Self::nc_pins(symbol).map(|(i, _)| i).collect();
        let mut changed = false;
        for idx in indices {
            let pin = &mut symbol.pins[idx];
            if !pin.is_hidden {
                pin.is_hidden = true;
                log.info(format!("Setting pin {} to INVISIBLE", pin.number));
                changed = true;
            }
            if pin.etype != ElectricalType::NoConnect {
                pin.etype = ElectricalType::NoConnect;
                log.info(format!("Changing pin {} type to NO_CONNECT", pin.number));
                changed = true;
            }
        }
        changed
    }
}

/// S4.5
pub struct MissingPins;

impl MissingPins {
    /// Numbers between 1 and the highest integer pin number with no pin.
    fn missing_numbers(symbol: &Symbol) -> Vec<u64> {
        let numbers: HashSet<u64> = symbol.pins.iter().filter_map(Pin::number_int).collect();
        let Some(&highest) = numbers.iter().max() else {
            return Vec::new();
        };
        (1..=highest).filter(|n| !numbers.contains(n)).collect()
    }
}

impl Rule for MissingPins {
    fn id(&self) -> &'static str {
        "S4.5"
    }

    fn description(&self) -> &'static str {
        "Pins not connected on the footprint may be omitted from the symbol"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() {
            return;
        }
        let missing = Self::missing_numbers(symbol);
        if missing.is_empty() {
            return;
        }
        let list = missing
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if missing.len() == 1 {
            log.warning(format!("Pin {} is missing.", list));
        } else {
            log.warning(format!("Pins {} are missing.", list));
        }
    }

    fn fix(&self, _symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("Fix not supported");
        false
    }
}
