//! Symbol layout rules (S3.x).

use crate::analyzer::rules::{Rule, RuleContext, RuleLog};
use crate::symbol::{mil_to_mm, mm_to_mil, Symbol, TextEffect};

/// Bodies up to this size (mil) may sit 50 mil off-center.
const SMALL_SYMBOL_SIZE: i64 = 800;

/// S3.1
pub struct OriginCentered;

impl OriginCentered {
    /// Center and size in mil of a unit, from the body rectangle or else
    /// the pin extent.
    fn unit_extent(symbol: &Symbol, unit: u32) -> Option<((i64, i64), (i64, i64))> {
        if let Some(body) = symbol.get_center_rectangle(Some(&[0, unit])) {
            let bbox = body.bounding_box()?;
            let center = bbox.center();
            return Some((
                (mm_to_mil(center.x), mm_to_mil(center.y)),
                (mm_to_mil(bbox.width()), mm_to_mil(bbox.height())),
            ));
        }

        let pins: Vec<_> = symbol
            .pins
            .iter()
            .filter(|p| p.unit == unit || p.unit == 0)
            .collect();
        if pins.is_empty() {
            return None;
        }
        let (mut x_min, mut x_max) = (f64::MAX, f64::MIN);
        let (mut y_min, mut y_max) = (f64::MAX, f64::MIN);
        for pin in pins {
            x_min = x_min.min(pin.pos.x);
            x_max = x_max.max(pin.pos.x);
            y_min = y_min.min(pin.pos.y);
            y_max = y_max.max(pin.pos.y);
        }
        Some((
            (mm_to_mil((x_min + x_max) / 2.0), mm_to_mil((y_min + y_max) / 2.0)),
            (mm_to_mil(x_max - x_min), mm_to_mil(y_max - y_min)),
        ))
    }

    fn is_bad_offset(offset: i64, size: i64) -> bool {
        if size > SMALL_SYMBOL_SIZE {
            offset != 0
        } else {
            offset.abs() != 0 && offset.abs() != 50
        }
    }
}

impl Rule for OriginCentered {
    fn id(&self) -> &'static str {
        "S3.1"
    }

    fn description(&self) -> &'static str {
        "Origin is centered on the middle of the symbol"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() {
            return;
        }

        for unit in 1..=symbol.unit_count().max(1) {
            let Some(((x, y), (width, height))) = Self::unit_extent(symbol, unit) else {
                continue;
            };

            if x == 0 && y == 0 {
                continue;
            }
            if x.abs() == 50 || y.abs() == 50 {
                if Self::is_bad_offset(x, width) || Self::is_bad_offset(y, height) {
                    log.warning(format!("Symbol unit {} slightly off-center", unit));
                    log.extra(format!("  Center calculated @ ({}, {})", x, y));
                }
            } else {
                log.error(format!("Symbol unit {} not centered on origin", unit));
                log.extra(format!("Center calculated @ ({}, {})", x, y));
            }
        }
    }
}

/// S3.2
pub struct TextSize;

impl TextSize {
    fn set_size_mil(effect: &mut TextEffect, size: f64) {
        effect.size_x = mil_to_mm(size);
        effect.size_y = mil_to_mm(size);
    }

    fn pin_sizes_in_range(name: i64, number: i64) -> bool {
        (20..=50).contains(&name) && (20..=50).contains(&number)
    }
}

impl Rule for TextSize {
    fn id(&self) -> &'static str {
        "S3.2"
    }

    fn description(&self) -> &'static str {
        "Text fields should use a common text size of 50mils"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        for prop in &symbol.properties {
            let size = mm_to_mil(prop.effects.size_x);
            if size != 50 {
                log.error(format!(
                    " - Field {} at posx {} posy {} size {}",
                    prop.name,
                    mm_to_mil(prop.pos.x),
                    mm_to_mil(prop.pos.y),
                    size
                ));
            }
        }

        for pin in &symbol.pins {
            let name_size = mm_to_mil(pin.name_effect.size_x);
            let number_size = mm_to_mil(pin.number_effect.size_x);

            if !Self::pin_sizes_in_range(name_size, number_size) {
                log.error(format!(
                    " - Pin {} ({}), text size {}, number size {}",
                    pin.name, pin.number, name_size, number_size
                ));
                continue;
            }
            if name_size != 50 {
                log.warning(format!(
                    "Pin {} ({}) name text size should be 50mils (or 20...50mils if required by the symbol geometry)",
                    pin.name, pin.number
                ));
            }
            if number_size != 50 {
                log.warning(format!(
                    "Pin {} ({}) number text size should be 50mils (or 20...50mils if required by the symbol geometry)",
                    pin.name, pin.number
                ));
            }
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        let mut changed = false;

        let bad_props: Vec<usize> = symbol
            .properties
            .iter()
            .enumerate()
            .filter(|(_, p)| mm_to_mil(p.effects.size_x) != 50)
            .map(|(i, _)| i)
            .collect();
        if !bad_props.is_empty() {
            log.info("Fixing field text size");
            for i in bad_props {
                Self::set_size_mil(&mut symbol.properties[i].effects, 50.0);
            }
            changed = true;
        }

        let mut fixing_pins = false;
        for pin in symbol.pins.iter_mut() {
            let name_size = mm_to_mil(pin.name_effect.size_x);
            let number_size = mm_to_mil(pin.number_effect.size_x);
            if Self::pin_sizes_in_range(name_size, number_size) {
                continue;
            }
            if !fixing_pins {
                log.info("Fixing pin text size");
                fixing_pins = true;
            }
            Self::set_size_mil(&mut pin.name_effect, 50.0);
            Self::set_size_mil(&mut pin.number_effect, 50.0);
            changed = true;
        }

        changed
    }
}

/// S3.6
pub struct PinNameOffset;

impl Rule for PinNameOffset {
    fn id(&self) -> &'static str {
        "S3.6"
    }

    fn description(&self) -> &'static str {
        "Pin name position offset"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        if symbol.is_derived() || symbol.hide_pin_names {
            return;
        }

        // Zero places names outside the body, where the offset is irrelevant.
        let offset = mm_to_mil(symbol.pin_names_offset);
        if offset == 0 {
            return;
        }
        if offset > 50 {
            log.error("Pin offset outside allowed range");
            log.extra(format!("Pin offset ({}) must not be above 50mils", offset));
        } else if offset < 20 {
            log.warning("Pin offset outside allowed range");
            log.extra(format!("Pin offset ({}) should not be below 20mils", offset));
        } else if offset > 20 {
            log.warning("Pin offset not preferred value");
            log.extra(format!(
                "Pin offset ({}) should be 20mils unless required by symbol geometry",
                offset
            ));
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        log.info("Fixing, assuming typical symbol geometry...");
        symbol.pin_names_offset = mil_to_mm(20.0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ElectricalType, Pin, Property, Rectangle, Rotation};

    fn run(rule: &dyn Rule, symbol: &Symbol) -> RuleLog {
        let mut log = RuleLog::new();
        rule.check(symbol, &RuleContext::default(), &mut log);
        log
    }

    fn body(x0: f64, y0: f64, x1: f64, y1: f64) -> Symbol {
        let mut sym = Symbol::empty("U", "l");
        sym.push_rectangle(Rectangle::new_mil(x0, y0, x1, y1));
        sym.push_pin(
            Pin::new("A", "1", ElectricalType::Input)
                .at(mil_to_mm(-400.0), 0.0, Rotation::R0)
                .in_unit(1, 1),
        );
        sym
    }

    #[test]
    fn test_centered_body() {
        assert_eq!(run(&OriginCentered, &body(-300.0, 300.0, 300.0, -300.0)).error_count(), 0);
    }

    #[test]
    fn test_small_body_may_be_half_grid_off() {
        let log = run(&OriginCentered, &body(-300.0, 350.0, 300.0, -250.0));
        assert_eq!(log.error_count(), 0);
        assert_eq!(log.warning_count(), 0);

        let log = run(&OriginCentered, &body(-500.0, 550.0, 500.0, -450.0));
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_off_center_body() {
        let log = run(&OriginCentered, &body(0.0, 600.0, 600.0, 0.0));
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.entries()[0].extras[0], "Center calculated @ (300, 300)");
    }

    #[test]
    fn test_text_size_fix() {
        let mut sym = Symbol::empty("U", "l");
        let mut prop = Property::new("Reference", "U");
        prop.effects = TextEffect::new_mil(60.0);
        sym.properties.push(prop);
        let mut pin = Pin::new("A", "1", ElectricalType::Input);
        pin.number_effect = TextEffect::new_mil(10.0);
        sym.push_pin(pin);

        assert_eq!(run(&TextSize, &sym).error_count(), 2);
        let mut log = RuleLog::new();
        assert!(TextSize.fix(&mut sym, &mut log));
        let after = run(&TextSize, &sym);
        assert_eq!(after.error_count(), 0);
        assert_eq!(after.warning_count(), 0);
    }

    #[test]
    fn test_pin_name_offset() {
        let mut sym = Symbol::empty("U", "l");
        sym.pin_names_offset = mil_to_mm(60.0);
        assert_eq!(run(&PinNameOffset, &sym).error_count(), 1);
        sym.pin_names_offset = mil_to_mm(40.0);
        assert_eq!(run(&PinNameOffset, &sym).warning_count(), 1);
        sym.pin_names_offset = 0.0;
        assert_eq!(run(&PinNameOffset, &sym).warning_count(), 0);

        sym.pin_names_offset = mil_to_mm(60.0);
        let mut log = RuleLog::new();
        assert!(PinNameOffset.fix(&mut sym, &mut log));
        assert!(!run(&PinNameOffset, &sym).has_errors());
        assert!(!run(&PinNameOffset, &sym).has_warnings());
    }
}
