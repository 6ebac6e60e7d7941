//! Model to token tree conversion with canonical ordering.

use std::cmp::Ordering;

use super::graphics::{Arc, Bezier, Circle, Fill, Polyline, Rectangle, Stroke, Text};
use super::kicad_symbol::Symbol;
use super::types::{AltFunction, Color, EmbeddedFile, Justify, Pin, Property, TextEffect};
use super::DEFAULT_PIN_NAMES_OFFSET;
use crate::geometry::Point;
use crate::parser::SExp;

pub trait ToSExp {
    fn to_sexp(&self) -> SExp;
}

fn num(v: f64) -> SExp {
    SExp::number(v)
}

fn xy(keyword: &str, p: Point) -> SExp {
    SExp::node(keyword, [num(p.x), num(p.y)])
}

fn at(p: Point, rotation: f64) -> SExp {
    SExp::node("at", [num(p.x), num(p.y), num(rotation)])
}

fn pts(points: &[Point]) -> SExp {
    SExp::node("pts", points.iter().map(|p| xy("xy", *p)))
}

impl ToSExp for Color {
    fn to_sexp(&self) -> SExp {
        SExp::node("color", [num(self.r), num(self.g), num(self.b), num(self.a)])
    }
}

impl ToSExp for TextEffect {
    fn to_sexp(&self) -> SExp {
        let mut font = Vec::new();
        if let Some(face) = &self.face {
            font.push(SExp::node("face", [SExp::string(face.as_str())]));
        }
        font.push(SExp::node("size", [num(self.size_x), num(self.size_y)]));
        if let Some(thickness) = self.thickness {
            font.push(SExp::node("thickness", [num(thickness)]));
        }
        if self.bold {
            font.push(SExp::yes_no("bold", true));
        }
        if self.italic {
            font.push(SExp::yes_no("italic", true));
        }
        if let Some(color) = &self.color {
            font.push(color.to_sexp());
        }

        let mut effects = vec![SExp::node("font", font)];

        let mut justify = Vec::new();
        if self.h_justify != Justify::Center {
            justify.push(SExp::atom(self.h_justify.as_str()));
        }
        if self.v_justify != Justify::Center {
            justify.push(SExp::atom(self.v_justify.as_str()));
        }
        if self.mirrored {
            justify.push(SExp::atom("mirror"));
        }
        if !justify.is_empty() {
            effects.push(SExp::node("justify", justify));
        }
        if self.hidden {
            effects.push(SExp::yes_no("hide", true));
        }
        SExp::node("effects", effects)
    }
}

impl ToSExp for Property {
    fn to_sexp(&self) -> SExp {
        let mut items = Vec::new();
        if self.private {
            items.push(SExp::atom("private"));
        }
        items.push(SExp::string(self.name.as_str()));
        items.push(SExp::string(self.value.as_str()));
        items.push(at(self.pos, self.rotation));
        if self.do_not_autoplace {
            items.push(SExp::node("do_not_autoplace", []));
        }
        if self.is_hidden {
            items.push(SExp::yes_no("hide", true));
        }
        items.extend(self.extra.iter().cloned());
        items.push(self.effects.to_sexp());
        SExp::node("property", items)
    }
}

impl ToSExp for AltFunction {
    fn to_sexp(&self) -> SExp {
        SExp::node(
            "alternate",
            [
                SExp::string(self.name.as_str()),
                SExp::atom(self.etype.as_str()),
                SExp::atom(self.shape.as_str()),
            ],
        )
    }
}

impl ToSExp for Pin {
    fn to_sexp(&self) -> SExp {
        let mut items = vec![
            SExp::atom(self.etype.as_str()),
            SExp::atom(self.shape.as_str()),
            at(self.pos, f64::from(self.rotation.degrees())),
        ];
        if self.is_global {
            items.push(SExp::atom("global"));
        }
        items.push(SExp::node("length", [num(self.length)]));
        if self.is_hidden {
            items.push(SExp::yes_no("hide", true));
        }
        items.push(SExp::node(
            "name",
            [SExp::string(self.name.as_str()), self.name_effect.to_sexp()],
        ));
        items.push(SExp::node(
            "number",
            [SExp::string(self.number.as_str()), self.number_effect.to_sexp()],
        ));

        let mut alternates: Vec<&AltFunction> = self.alternates.iter().collect();
        alternates.sort_by(|a, b| a.name.cmp(&b.name));
        items.extend(alternates.into_iter().map(ToSExp::to_sexp));
        items.extend(self.extra.iter().cloned());
        SExp::node("pin", items)
    }
}

impl ToSExp for Stroke {
    fn to_sexp(&self) -> SExp {
        let mut items = vec![
            SExp::node("width", [num(self.width)]),
            SExp::node("type", [SExp::atom(self.style.as_str())]),
        ];
        if let Some(color) = &self.color {
            items.push(color.to_sexp());
        }
        SExp::node("stroke", items)
    }
}

impl ToSExp for Fill {
    fn to_sexp(&self) -> SExp {
        let mut items = vec![SExp::node("type", [SExp::atom(self.fill_type.as_str())])];
        if let Some(color) = &self.color {
            items.push(color.to_sexp());
        }
        SExp::node("fill", items)
    }
}

impl ToSExp for Rectangle {
    fn to_sexp(&self) -> SExp {
        SExp::node(
            "rectangle",
            [
                xy("start", self.start),
                xy("end", self.end),
                self.stroke.to_sexp(),
                self.fill.to_sexp(),
            ],
        )
    }
}

impl ToSExp for Circle {
    fn to_sexp(&self) -> SExp {
        SExp::node(
            "circle",
            [
                xy("center", self.center),
                SExp::node("radius", [num(self.radius)]),
                self.stroke.to_sexp(),
                self.fill.to_sexp(),
            ],
        )
    }
}

impl ToSExp for Arc {
    fn to_sexp(&self) -> SExp {
        SExp::node(
            "arc",
            [
                xy("start", self.start),
                xy("mid", self.mid),
                xy("end", self.end),
                self.stroke.to_sexp(),
                self.fill.to_sexp(),
            ],
        )
    }
}

impl ToSExp for Polyline {
    fn to_sexp(&self) -> SExp {
        SExp::node(
            "polyline",
            [pts(&self.points), self.stroke.to_sexp(), self.fill.to_sexp()],
        )
    }
}

impl ToSExp for Bezier {
    fn to_sexp(&self) -> SExp {
        SExp::node(
            "bezier",
            [pts(&self.points), self.stroke.to_sexp(), self.fill.to_sexp()],
        )
    }
}

impl ToSExp for Text {
    fn to_sexp(&self) -> SExp {
        let mut items = vec![SExp::string(self.text.as_str()), at(self.pos, self.rotation)];
        if self.is_hidden {
            items.push(SExp::yes_no("hide", true));
        }
        items.push(self.effects.to_sexp());
        SExp::node("text", items)
    }
}

impl ToSExp for EmbeddedFile {
    fn to_sexp(&self) -> SExp {
        let mut items = vec![
            SExp::node("name", [SExp::string(self.name.as_str())]),
            SExp::node("type", [SExp::atom(self.file_type.as_str())]),
            SExp::node("data", self.data.iter().map(|d| SExp::atom(d.as_str()))),
        ];
        if let Some(checksum) = &self.checksum {
            items.push(SExp::node("checksum", [SExp::string(checksum.as_str())]));
        }
        SExp::node("file", items)
    }
}

/// Pin order inside a unit: x, then y descending, then number and the
/// remaining attributes.
fn pin_order(a: &Pin, b: &Pin) -> Ordering {
    a.pos
        .x
        .total_cmp(&b.pos.x)
        .then_with(|| (-a.pos.y).total_cmp(&-b.pos.y))
        .then_with(|| a.number.cmp(&b.number))
        .then_with(|| a.length.total_cmp(&b.length))
        .then_with(|| a.rotation.cmp(&b.rotation))
        .then_with(|| a.shape.as_str().cmp(b.shape.as_str()))
        .then_with(|| a.etype.as_str().cmp(b.etype.as_str()))
        .then_with(|| a.is_hidden.cmp(&b.is_hidden))
}

impl Symbol {
    fn unit_elements(&self, unit: u32, demorgan: u32) -> Vec<SExp> {
        let tagged = |u: u32, d: u32| u == unit && d == demorgan;
        let mut out = Vec::new();
        out.extend(self.arcs.iter().filter(|e| tagged(e.unit, e.demorgan)).map(ToSExp::to_sexp));
        out.extend(self.circles.iter().filter(|e| tagged(e.unit, e.demorgan)).map(ToSExp::to_sexp));
        out.extend(self.texts.iter().filter(|e| tagged(e.unit, e.demorgan)).map(ToSExp::to_sexp));
        out.extend(self.rectangles.iter().filter(|e| tagged(e.unit, e.demorgan)).map(ToSExp::to_sexp));
        out.extend(self.beziers.iter().filter(|e| tagged(e.unit, e.demorgan)).map(ToSExp::to_sexp));
        out.extend(self.polylines.iter().filter(|e| tagged(e.unit, e.demorgan)).map(ToSExp::to_sexp));

        let mut pins: Vec<&Pin> = self.pins.iter().filter(|p| p.is_unit(unit, demorgan)).collect();
        pins.sort_by(|a, b| pin_order(a, b));
        out.extend(pins.into_iter().map(ToSExp::to_sexp));

        out.extend(
            self.unit_extra
                .iter()
                .filter(|n| tagged(n.unit, n.demorgan))
                .map(|n| n.node.clone()),
        );
        out
    }
}

impl ToSExp for Symbol {
    fn to_sexp(&self) -> SExp {
        let mut items = vec![SExp::string(self.name.as_str())];

        if let Some(parent) = &self.extends {
            items.push(SExp::node("extends", [SExp::string(parent.as_str())]));
        } else {
            if self.is_power {
                items.push(SExp::node(
                    "power",
                    self.power_scope.iter().map(|s| SExp::atom(s.as_str())),
                ));
            }
            if self.hide_pin_numbers {
                items.push(SExp::node("pin_numbers", [SExp::yes_no("hide", true)]));
            }
            let mut pin_names = Vec::new();
            if self.pin_names_offset != DEFAULT_PIN_NAMES_OFFSET {
                pin_names.push(SExp::node("offset", [num(self.pin_names_offset)]));
            }
            if self.hide_pin_names {
                pin_names.push(SExp::yes_no("hide", true));
            }
            if !pin_names.is_empty() {
                items.push(SExp::node("pin_names", pin_names));
            }
            items.push(SExp::yes_no("exclude_from_sim", self.exclude_from_sim));
            items.push(SExp::yes_no("in_bom", self.in_bom));
            items.push(SExp::yes_no("on_board", self.on_board));
        }

        items.extend(self.extra.iter().cloned());
        items.extend(self.properties.iter().map(ToSExp::to_sexp));

        // derived symbols inherit everything below from their parent
        if self.extends.is_some() {
            return SExp::node("symbol", items);
        }

        for d in 0..=self.demorgan_count() {
            for u in 0..=self.unit_count() {
                let elements = self.unit_elements(u, d);
                if elements.is_empty() {
                    continue;
                }
                let mut unit = vec![SExp::string(format!("{}_{}_{}", self.name, u, d))];
                unit.extend(elements);
                if let Some(name) = self.unit_names.get(&u) {
                    unit.push(SExp::node("unit_name", [SExp::string(name.as_str())]));
                }
                items.push(SExp::node("symbol", unit));
            }
        }

        items.push(SExp::yes_no("embedded_fonts", self.embedded_fonts));
        if !self.files.is_empty() {
            items.push(SExp::node(
                "embedded_files",
                self.files.iter().map(ToSExp::to_sexp),
            ));
        }
        SExp::node("symbol", items)
    }
}
