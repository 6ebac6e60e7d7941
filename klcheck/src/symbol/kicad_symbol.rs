use std::collections::BTreeMap;

use super::graphics::{Arc, Bezier, Circle, FillType, Polyline, Rectangle, Text};
use super::types::{ElectricalType, EmbeddedFile, Pin, Property, Rotation};
use super::DEFAULT_PIN_NAMES_OFFSET;
use crate::parser::SExp;

/// Properties every new symbol carries: (name, default value, hidden).
const DEFAULT_PROPERTIES: &[(&str, &str, bool)] = &[
    ("Reference", "U", false),
    ("Value", "", false),
    ("Footprint", "", true),
    ("Datasheet", "", true),
    ("Description", "", true),
    ("ki_keywords", "", true),
    ("ki_fp_filters", "", true),
];

/// A node inside a `<name>_<unit>_<alt>` sub-symbol that the model does not
/// interpret. Kept so it can be written back in place.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitNode {
    pub unit: u32,
    pub demorgan: u32,
    pub node: SExp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    /// Library the symbol was loaded from (file stem).
    pub libname: String,
    pub extends: Option<String>,
    pub properties: Vec<Property>,
    pub pins: Vec<Pin>,
    pub rectangles: Vec<Rectangle>,
    pub circles: Vec<Circle>,
    pub arcs: Vec<Arc>,
    pub polylines: Vec<Polyline>,
    pub beziers: Vec<Bezier>,
    pub texts: Vec<Text>,
    pub pin_names_offset: f64,
    pub hide_pin_names: bool,
    pub hide_pin_numbers: bool,
    pub is_power: bool,
    /// `local` / `global` qualifier of `(power ..)`, if written.
    pub power_scope: Option<String>,
    pub exclude_from_sim: bool,
    pub in_bom: bool,
    pub on_board: bool,
    pub embedded_fonts: bool,
    pub files: Vec<EmbeddedFile>,
    pub unit_names: BTreeMap<u32, String>,
    /// Symbol-level nodes this model does not interpret.
    pub extra: Vec<SExp>,
    pub unit_extra: Vec<UnitNode>,
    /// Resolved `extends` chain: direct parent first, root last.
    pub(crate) inheritance: Vec<String>,
}

impl Symbol {
    /// Empty symbol, no properties.
    pub fn empty(name: impl Into<String>, libname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            libname: libname.into(),
            extends: None,
            properties: Vec::new(),
            pins: Vec::new(),
            rectangles: Vec::new(),
            circles: Vec::new(),
            arcs: Vec::new(),
            polylines: Vec::new(),
            beziers: Vec::new(),
            texts: Vec::new(),
            pin_names_offset: DEFAULT_PIN_NAMES_OFFSET,
            hide_pin_names: false,
            hide_pin_numbers: false,
            is_power: false,
            power_scope: None,
            exclude_from_sim: false,
            in_bom: true,
            on_board: true,
            embedded_fonts: false,
            files: Vec::new(),
            unit_names: BTreeMap::new(),
            extra: Vec::new(),
            unit_extra: Vec::new(),
            inheritance: Vec::new(),
        }
    }

    /// New symbol with the default property set filled in.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        libname: impl Into<String>,
        reference: &str,
        footprint: &str,
        datasheet: &str,
        keywords: &str,
        description: &str,
        fp_filters: &[&str],
    ) -> Self {
        let mut sym = Self::empty(name, libname);
        sym.add_default_properties();
        sym.set_property_value("Reference", reference);
        sym.set_property_value("Footprint", footprint);
        sym.set_property_value("Datasheet", datasheet);
        sym.set_property_value("ki_keywords", keywords);
        sym.set_property_value("Description", description);
        sym.set_property_value("ki_fp_filters", &fp_filters.join(" "));
        sym
    }

    /// Append any missing default property. `Value` defaults to the symbol name.
    pub fn add_default_properties(&mut self) {
        for (name, value, hidden) in DEFAULT_PROPERTIES {
            if self.get_property(name).is_some() {
                continue;
            }
            let value = if *name == "Value" { self.name.as_str() } else { value };
            let mut prop = Property::new(*name, value);
            prop.is_hidden = *hidden;
            self.properties.push(prop);
        }
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn get_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Value of a property, empty when absent.
    pub fn property_value(&self, name: &str) -> &str {
        self.get_property(name).map(|p| p.value.as_str()).unwrap_or("")
    }

    pub fn set_property_value(&mut self, name: &str, value: &str) {
        match self.get_property_mut(name) {
            Some(prop) => prop.value = value.to_string(),
            None => self.properties.push(Property::new(name, value)),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Property> {
        let idx = self.properties.iter().position(|p| p.name == name)?;
        Some(self.properties.remove(idx))
    }

    pub fn get_fp_filters(&self) -> Vec<&str> {
        self.get_property("ki_fp_filters")
            .map(|p| p.value.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn is_derived(&self) -> bool {
        self.extends.is_some()
    }

    /// Symbols without electrical meaning: no pins, or reference `#SYM`.
    pub fn is_graphic_symbol(&self) -> bool {
        self.extends.is_none()
            && (self.pins.is_empty() || self.property_value("Reference") == "#SYM")
    }

    pub fn is_power_symbol(&self) -> bool {
        self.is_power
    }

    pub fn is_locked(&self) -> bool {
        self.get_property("ki_locked").is_some()
    }

    /// Direct parent name from the resolved chain.
    pub fn parent_name(&self) -> Option<&str> {
        self.inheritance.first().map(String::as_str)
    }

    /// Name of the last symbol in the `extends` chain, or own name.
    pub fn root_symbol_name(&self) -> &str {
        self.inheritance
            .last()
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    pub fn inheritance(&self) -> &[String] {
        &self.inheritance
    }

    /// Highest unit index used by any primitive.
    pub fn unit_count(&self) -> u32 {
        self.tags().map(|(u, _)| u).max().unwrap_or(0)
    }

    /// Highest alternate-style index used by any primitive.
    pub fn demorgan_count(&self) -> u32 {
        self.tags().map(|(_, d)| d).max().unwrap_or(0)
    }

    fn tags(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pins
            .iter()
            .map(|p| (p.unit, p.demorgan))
            .chain(self.rectangles.iter().map(|p| (p.unit, p.demorgan)))
            .chain(self.circles.iter().map(|p| (p.unit, p.demorgan)))
            .chain(self.arcs.iter().map(|p| (p.unit, p.demorgan)))
            .chain(self.polylines.iter().map(|p| (p.unit, p.demorgan)))
            .chain(self.beziers.iter().map(|p| (p.unit, p.demorgan)))
            .chain(self.texts.iter().map(|p| (p.unit, p.demorgan)))
            .chain(self.unit_extra.iter().map(|n| (n.unit, n.demorgan)))
    }

    /// Rectangle-shaped outlines (rectangles plus closed axis-aligned
    /// polylines) restricted to `units` when given.
    fn rectangle_outlines(&self, units: Option<&[u32]>) -> Vec<Polyline> {
        let wanted = |unit: u32| units.map_or(true, |u| u.contains(&unit));
        self.rectangles
            .iter()
            .filter(|r| wanted(r.unit))
            .map(Rectangle::as_polyline)
            .chain(
                self.polylines
                    .iter()
                    .filter(|pl| wanted(pl.unit) && pl.is_rectangle())
                    .cloned(),
            )
            .collect()
    }

    /// The rectangle outline whose center is closest to the origin.
    pub fn get_center_rectangle(&self, units: Option<&[u32]>) -> Option<Polyline> {
        self.rectangle_outlines(units).into_iter().min_by(|a, b| {
            let da = a.center().from_origin().length();
            let db = b.center().from_origin().length();
            da.total_cmp(&db)
        })
    }

    /// The rectangle outline with the largest area.
    pub fn get_largest_area_rectangle(&self, units: Option<&[u32]>) -> Option<Polyline> {
        self.rectangle_outlines(units)
            .into_iter()
            .filter(|pl| pl.area() > 0.0)
            .max_by(|a, b| a.area().total_cmp(&b.area()))
    }

    /// Pins grouped by location. Keys are `(x, y, unit, demorgan)` in
    /// micrometers; pins shared across a unit or style axis (index 0) are
    /// placed into every concrete bucket of that axis.
    pub fn get_pinstacks(&self) -> BTreeMap<(i64, i64, u32, u32), Vec<&Pin>> {
        let units = self.unit_count().max(1);
        let styles = self.demorgan_count().max(1);
        let mut stacks: BTreeMap<(i64, i64, u32, u32), Vec<&Pin>> = BTreeMap::new();

        for pin in &self.pins {
            let unit_list: Vec<u32> = if pin.unit == 0 {
                (1..=units).collect()
            } else {
                vec![pin.unit]
            };
            let style_list: Vec<u32> = if pin.demorgan == 0 {
                (1..=styles).collect()
            } else {
                vec![pin.demorgan]
            };
            let x = (pin.pos.x * 1000.0).round() as i64;
            let y = (pin.pos.y * 1000.0).round() as i64;
            for &d in &style_list {
                for &u in &unit_list {
                    stacks.entry((x, y, u, d)).or_default().push(pin);
                }
            }
        }
        stacks
    }

    /// Two pins or fewer, or three to four pins without a filled body
    /// rectangle: resistors, diodes, transistors and the like.
    pub fn is_small_component_heuristic(&self) -> bool {
        if self.pins.len() <= 2 {
            return true;
        }
        let filled_body = self
            .get_center_rectangle(None)
            .map(|r| r.fill.fill_type == FillType::Background)
            .unwrap_or(false);
        (3..=4).contains(&self.pins.len()) && !filled_body
    }

    pub fn get_pins_by_name(&self, name: &str) -> Vec<&Pin> {
        self.pins.iter().filter(|p| p.name == name).collect()
    }

    pub fn get_pin_by_number(&self, number: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.number == number)
    }

    /// Pins matching any of the given criteria.
    pub fn filter_pins(
        &self,
        name: Option<&str>,
        direction: Option<char>,
        etype: Option<ElectricalType>,
    ) -> Vec<&Pin> {
        let rotation = direction.and_then(Rotation::from_direction);
        self.pins
            .iter()
            .filter(|p| {
                name.map_or(false, |n| p.name == n)
                    || rotation.map_or(false, |r| p.rotation == r)
                    || etype.map_or(false, |t| p.etype == t)
            })
            .collect()
    }

    pub fn push_pin(&mut self, pin: Pin) -> &mut Self {
        self.pins.push(pin);
        self
    }

    pub fn push_rectangle(&mut self, rect: Rectangle) -> &mut Self {
        self.rectangles.push(rect);
        self
    }

    pub fn push_polyline(&mut self, polyline: Polyline) -> &mut Self {
        self.polylines.push(polyline);
        self
    }

    pub fn push_circle(&mut self, circle: Circle) -> &mut Self {
        self.circles.push(circle);
        self
    }

    pub fn push_arc(&mut self, arc: Arc) -> &mut Self {
        self.arcs.push(arc);
        self
    }

    pub fn push_bezier(&mut self, bezier: Bezier) -> &mut Self {
        self.beziers.push(bezier);
        self
    }

    pub fn push_text(&mut self, text: Text) -> &mut Self {
        self.texts.push(text);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn pin_at(number: &str, x: f64, y: f64, unit: u32) -> Pin {
        Pin::new("P", number, ElectricalType::Passive)
            .at(x, y, Rotation::R0)
            .in_unit(unit, 1)
    }

    #[test]
    fn test_default_properties() {
        let sym = Symbol::new("LM358", "Amplifier", "U", "", "", "opamp", "Dual opamp", &["SOIC*", "DIP*"]);
        assert_eq!(sym.property_value("Value"), "LM358");
        assert_eq!(sym.property_value("Reference"), "U");
        assert_eq!(sym.get_fp_filters(), vec!["SOIC*", "DIP*"]);
        assert!(sym.get_property("Footprint").unwrap().is_hidden);
        assert_eq!(sym.properties.len(), 7);
    }

    #[test]
    fn test_unit_count_from_tags() {
        let mut sym = Symbol::empty("X", "lib");
        sym.push_pin(pin_at("1", 0.0, 0.0, 1))
            .push_pin(pin_at("2", 0.0, 2.54, 3));
        assert_eq!(sym.unit_count(), 3);
        assert_eq!(sym.demorgan_count(), 1);
    }

    #[test]
    fn test_pinstack_expansion() {
        let mut sym = Symbol::empty("X", "lib");
        sym.push_pin(pin_at("1", 0.0, 0.0, 1))
            .push_pin(pin_at("2", 2.54, 0.0, 2))
            .push_pin(pin_at("3", 5.08, 0.0, 3))
            .push_pin(pin_at("8", 0.0, 0.0, 0));

        let stacks = sym.get_pinstacks();
        for unit in 1..=3 {
            let shared: Vec<_> = stacks
                .iter()
                .filter(|((x, y, u, _), pins)| {
                    *x == 0 && *y == 0 && *u == unit && pins.iter().any(|p| p.number == "8")
                })
                .collect();
            assert_eq!(shared.len(), 1, "unit {} should hold the shared pin", unit);
        }
        assert_eq!(stacks[&(0, 0, 1, 1)].len(), 2);
    }

    #[test]
    fn test_center_rectangle_prefers_origin() {
        let mut sym = Symbol::empty("X", "lib");
        sym.push_rectangle(Rectangle::new_mil(500.0, 500.0, 700.0, 300.0))
            .push_rectangle(Rectangle::new_mil(-100.0, 100.0, 100.0, -100.0))
            .push_rectangle(Rectangle::new_mil(-1000.0, 1000.0, 1000.0, 900.0));
        let center = sym.get_center_rectangle(None).unwrap();
        assert_eq!(center.center(), Point::new(0.0, 0.0));
        let largest = sym.get_largest_area_rectangle(None).unwrap();
        assert!((largest.area() - 50.8 * 2.54).abs() < 1e-6);
    }

    #[test]
    fn test_small_component_heuristic() {
        let mut sym = Symbol::empty("R", "Device");
        sym.push_pin(pin_at("1", 0.0, 3.81, 1))
            .push_pin(pin_at("2", 0.0, -3.81, 1));
        assert!(sym.is_small_component_heuristic());

        let mut ic = Symbol::empty("IC", "lib");
        for i in 0..4 {
            ic.push_pin(pin_at(&i.to_string(), -7.62, i as f64 * 2.54, 1));
        }
        ic.push_rectangle(Rectangle::new_mil(-200.0, 200.0, 200.0, -200.0));
        assert!(!ic.is_small_component_heuristic());
    }

    #[test]
    fn test_filter_pins() {
        let mut sym = Symbol::empty("X", "lib");
        sym.push_pin(Pin::new("GND", "1", ElectricalType::PowerIn).at(0.0, -5.08, Rotation::R90))
            .push_pin(Pin::new("IN", "2", ElectricalType::Input).at(-5.08, 0.0, Rotation::R0));
        assert_eq!(sym.filter_pins(Some("GND"), None, None).len(), 1);
        assert_eq!(sym.filter_pins(None, Some('R'), None)[0].name, "IN");
        assert_eq!(sym.filter_pins(None, None, Some(ElectricalType::Input)).len(), 1);
        assert!(sym.filter_pins(None, None, None).is_empty());
    }

    #[test]
    fn test_graphic_symbol() {
        let mut sym = Symbol::new("Logo", "Graphic", "#SYM", "", "", "", "", &[]);
        assert!(sym.is_graphic_symbol());
        sym.extends = Some("Other".to_string());
        assert!(!sym.is_graphic_symbol());
    }
}
