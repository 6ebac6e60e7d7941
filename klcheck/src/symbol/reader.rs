//! Token tree to model conversion.

use super::graphics::{Arc, Bezier, Circle, Fill, FillType, Polyline, Rectangle, Stroke, Text};
use super::kicad_symbol::{Symbol, UnitNode};
use super::types::{
    AltFunction, Color, EmbeddedFile, Justify, Pin, Property, Rotation, TextEffect,
};
use super::{FormatError, DEFAULT_PIN_NAMES_OFFSET};
use crate::geometry::Point;
use crate::parser::SExp;

pub(crate) trait FromSExp: Sized {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError>;
}

fn children(node: &SExp) -> &[SExp] {
    node.as_list().and_then(|items| items.get(1..)).unwrap_or(&[])
}

fn xy_of(node: &SExp, key: &str) -> Option<Point> {
    let items = node.get(key)?.as_list()?;
    Some(Point::new(
        items.get(1).and_then(SExp::as_number).unwrap_or(0.0),
        items.get(2).and_then(SExp::as_number).unwrap_or(0.0),
    ))
}

/// `(at x y [rot])`
fn at_of(node: &SExp, context: &str) -> Result<(Point, Option<f64>), FormatError> {
    let pos = xy_of(node, "at").ok_or_else(|| FormatError::missing("at", context))?;
    let rot = node
        .get("at")
        .and_then(SExp::as_list)
        .and_then(|items| items.get(3))
        .and_then(SExp::as_number);
    Ok((pos, rot))
}

fn yes_no(node: &SExp, key: &str) -> Option<bool> {
    node.flag_of(key)
}

/// Hidden either as `(hide yes)` or as the legacy bare `hide` atom.
fn is_hidden(node: &SExp) -> bool {
    yes_no(node, "hide").unwrap_or(false) || node.has_atom("hide")
}

fn points_of(node: &SExp) -> Vec<Point> {
    node.get("pts")
        .map(|pts| {
            pts.get_all("xy")
                .filter_map(|xy| {
                    let items = xy.as_list()?;
                    Some(Point::new(items.get(1)?.as_number()?, items.get(2)?.as_number()?))
                })
                .collect()
        })
        .unwrap_or_default()
}

impl FromSExp for Color {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let items = children(node);
        let channel = |i: usize| {
            items
                .get(i)
                .and_then(SExp::as_number)
                .ok_or_else(|| FormatError::missing("channel", "color"))
        };
        Ok(Color {
            r: channel(0)?,
            g: channel(1)?,
            b: channel(2)?,
            a: channel(3)?,
        })
    }
}

fn color_of(node: &SExp) -> Result<Option<Color>, FormatError> {
    node.get("color").map(Color::from_sexp).transpose()
}

impl FromSExp for Stroke {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        Ok(Stroke {
            width: node.number_of("width").unwrap_or(0.0),
            style: node.string_of("type").unwrap_or("default").to_string(),
            color: color_of(node)?,
        })
    }
}

impl FromSExp for Fill {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let fill_type = match node.string_of("type") {
            Some(t) => t.parse()?,
            None => FillType::None,
        };
        Ok(Fill {
            fill_type,
            color: color_of(node)?,
        })
    }
}

fn stroke_and_fill(node: &SExp) -> Result<(Stroke, Fill), FormatError> {
    let stroke = node
        .get("stroke")
        .map(Stroke::from_sexp)
        .transpose()?
        .unwrap_or_default();
    let fill = node
        .get("fill")
        .map(Fill::from_sexp)
        .transpose()?
        .unwrap_or_default();
    Ok((stroke, fill))
}

impl FromSExp for TextEffect {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let mut effect = TextEffect::default();

        if let Some(font) = node.get("font") {
            if let Some(size) = xy_of(font, "size") {
                effect.size_x = size.x;
                effect.size_y = size.y;
            }
            effect.thickness = font.number_of("thickness");
            effect.face = font.string_of("face").map(str::to_string);
            effect.bold = yes_no(font, "bold").unwrap_or(false) || font.has_atom("bold");
            effect.italic = yes_no(font, "italic").unwrap_or(false) || font.has_atom("italic");
            effect.color = color_of(font)?;
        }
        if effect.color.is_none() {
            effect.color = color_of(node)?;
        }

        if let Some(justify) = node.get("justify") {
            for word in children(justify).iter().filter_map(SExp::as_atom) {
                match word {
                    "left" => effect.h_justify = Justify::Left,
                    "right" => effect.h_justify = Justify::Right,
                    "top" => effect.v_justify = Justify::Top,
                    "bottom" => effect.v_justify = Justify::Bottom,
                    "mirror" => effect.mirrored = true,
                    _ => {}
                }
            }
        }
        effect.mirrored |= node.has_atom("mirror");
        effect.hidden = is_hidden(node);
        Ok(effect)
    }
}

fn effects_of(node: &SExp) -> Result<TextEffect, FormatError> {
    node.get("effects")
        .map(TextEffect::from_sexp)
        .transpose()
        .map(Option::unwrap_or_default)
}

impl FromSExp for Property {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let items = children(node);
        let mut rest = items.iter();
        let mut first = rest.next();
        let private = first.and_then(SExp::as_atom) == Some("private");
        if private {
            first = rest.next();
        }
        let name = first
            .and_then(SExp::as_str)
            .ok_or_else(|| FormatError::missing("name", "property"))?;
        let value = rest
            .next()
            .and_then(|v| match v {
                SExp::Number(n) => Some(crate::parser::format_number(*n)),
                other => other.as_str().map(str::to_string),
            })
            .ok_or_else(|| FormatError::missing("value", format!("property {}", name)))?;

        let (pos, rot) = at_of(node, &format!("property {}", name))?;
        let mut prop = Property::new(name, value);
        prop.private = private;
        prop.pos = pos;
        prop.rotation = rot.unwrap_or(0.0);
        prop.effects = effects_of(node)?;
        prop.is_hidden = is_hidden(node) || prop.effects.hidden;
        prop.effects.hidden = false;
        prop.do_not_autoplace = node.flag_of("do_not_autoplace").unwrap_or(false);

        for child in rest.filter(|c| c.is_list()) {
            match child.keyword() {
                Some("at") | Some("hide") | Some("effects") | Some("do_not_autoplace") => {}
                _ => prop.extra.push(child.clone()),
            }
        }
        Ok(prop)
    }
}

impl FromSExp for AltFunction {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let items = children(node);
        let name = items
            .first()
            .and_then(SExp::as_str)
            .ok_or_else(|| FormatError::missing("name", "alternate"))?;
        let etype = items
            .get(1)
            .and_then(SExp::as_atom)
            .ok_or_else(|| FormatError::missing("type", format!("alternate {}", name)))?
            .parse()?;
        let shape = match items.get(2).and_then(SExp::as_atom) {
            Some(s) => s.parse()?,
            None => super::types::PinShape::Line,
        };
        Ok(AltFunction {
            name: name.to_string(),
            etype,
            shape,
        })
    }
}

fn name_or_number(node: &SExp, key: &str) -> Result<(String, TextEffect), FormatError> {
    let child = node
        .get(key)
        .ok_or_else(|| FormatError::missing(key, "pin"))?;
    let text = match child.as_list().and_then(|items| items.get(1)) {
        Some(SExp::Number(n)) => crate::parser::format_number(*n),
        Some(other) => other.as_str().unwrap_or("").to_string(),
        None => String::new(),
    };
    Ok((text, effects_of(child)?))
}

impl FromSExp for Pin {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let items = children(node);
        let etype = items
            .first()
            .and_then(SExp::as_atom)
            .ok_or_else(|| FormatError::missing("electrical type", "pin"))?
            .parse()?;
        let shape = items
            .get(1)
            .and_then(SExp::as_atom)
            .ok_or_else(|| FormatError::missing("shape", "pin"))?
            .parse()?;

        let (name, name_effect) = name_or_number(node, "name")?;
        let (number, number_effect) = name_or_number(node, "number")?;
        let context = format!("pin {}", number);
        let (pos, rot) = at_of(node, &context)?;
        let length = node
            .number_of("length")
            .ok_or_else(|| FormatError::missing("length", context.as_str()))?;

        let mut pin = Pin::new(name, number, etype);
        pin.shape = shape;
        pin.pos = pos;
        pin.rotation = Rotation::from_degrees(rot.unwrap_or(0.0))?;
        pin.length = length;
        pin.is_global = node.has_atom("global");
        pin.is_hidden = is_hidden(node);
        pin.name_effect = name_effect;
        pin.number_effect = number_effect;

        for child in items.iter().skip(2).filter(|c| c.is_list()) {
            match child.keyword() {
                Some("at") | Some("length") | Some("hide") | Some("name") | Some("number") => {}
                Some("alternate") => pin.alternates.push(AltFunction::from_sexp(child)?),
                _ => pin.extra.push(child.clone()),
            }
        }
        Ok(pin)
    }
}

impl FromSExp for Rectangle {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let start = xy_of(node, "start").ok_or_else(|| FormatError::missing("start", "rectangle"))?;
        let end = xy_of(node, "end").ok_or_else(|| FormatError::missing("end", "rectangle"))?;
        let (stroke, fill) = stroke_and_fill(node)?;
        let mut rect = Rectangle::new(start, end);
        rect.stroke = stroke;
        rect.fill = fill;
        Ok(rect)
    }
}

impl FromSExp for Circle {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let center = xy_of(node, "center").ok_or_else(|| FormatError::missing("center", "circle"))?;
        let radius = node
            .number_of("radius")
            .ok_or_else(|| FormatError::missing("radius", "circle"))?;
        let (stroke, fill) = stroke_and_fill(node)?;
        let mut circle = Circle::new(center, radius);
        circle.stroke = stroke;
        circle.fill = fill;
        Ok(circle)
    }
}

impl FromSExp for Arc {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let start = xy_of(node, "start").ok_or_else(|| FormatError::missing("start", "arc"))?;
        let end = xy_of(node, "end").ok_or_else(|| FormatError::missing("end", "arc"))?;
        let mid = xy_of(node, "mid").unwrap_or_default();
        let (stroke, fill) = stroke_and_fill(node)?;
        let mut arc = Arc::new(start, mid, end);
        arc.stroke = stroke;
        arc.fill = fill;
        Ok(arc)
    }
}

impl FromSExp for Polyline {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let (stroke, fill) = stroke_and_fill(node)?;
        let mut pl = Polyline::new(points_of(node));
        pl.stroke = stroke;
        pl.fill = fill;
        Ok(pl)
    }
}

impl FromSExp for Bezier {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let (stroke, fill) = stroke_and_fill(node)?;
        let mut bezier = Bezier::new(points_of(node));
        bezier.stroke = stroke;
        bezier.fill = fill;
        Ok(bezier)
    }
}

impl FromSExp for Text {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let text = children(node)
            .first()
            .and_then(SExp::as_str)
            .ok_or_else(|| FormatError::missing("text", "text"))?;
        let (pos, rot) = at_of(node, &format!("text {}", text))?;
        let mut t = Text::new(text, pos);
        t.rotation = rot.unwrap_or(0.0);
        t.effects = effects_of(node)?;
        t.is_hidden = is_hidden(node) || t.effects.hidden;
        t.effects.hidden = false;
        Ok(t)
    }
}

impl FromSExp for EmbeddedFile {
    fn from_sexp(node: &SExp) -> Result<Self, FormatError> {
        let name = node
            .string_of("name")
            .ok_or_else(|| FormatError::missing("name", "embedded file"))?;
        let data = node
            .get("data")
            .map(|d| {
                children(d)
                    .iter()
                    .filter_map(|chunk| chunk.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(EmbeddedFile {
            name: name.to_string(),
            file_type: node.string_of("type").unwrap_or("other").to_string(),
            data,
            checksum: node.string_of("checksum").map(str::to_string),
        })
    }
}

pub(crate) struct SymbolReader;

impl SymbolReader {
    /// Build a symbol from a top-level `(symbol "name" ...)` node.
    pub fn read_symbol(node: &SExp, libname: &str) -> Result<Symbol, FormatError> {
        let items = node
            .as_list()
            .ok_or_else(|| FormatError::InvalidFormat("symbol is not a list".to_string()))?;
        let raw_name = items
            .get(1)
            .and_then(SExp::as_str)
            .ok_or_else(|| FormatError::missing("name", "symbol"))?;
        // legacy `lib:part` names keep only the part
        let name = raw_name.rsplit(':').next().unwrap_or(raw_name);
        let mut symbol = Symbol::empty(name, libname);

        for child in &items[2..] {
            match child.keyword() {
                Some("extends") => {
                    symbol.extends = child
                        .as_list()
                        .and_then(|i| i.get(1))
                        .and_then(SExp::as_str)
                        .map(str::to_string);
                }
                Some("pin_names") => {
                    symbol.pin_names_offset = child
                        .number_of("offset")
                        .unwrap_or(DEFAULT_PIN_NAMES_OFFSET);
                    symbol.hide_pin_names = is_hidden(child);
                }
                Some("pin_numbers") => symbol.hide_pin_numbers = is_hidden(child),
                Some("exclude_from_sim") => symbol.exclude_from_sim = Self::flag(child),
                Some("in_bom") => symbol.in_bom = Self::flag(child),
                Some("on_board") => symbol.on_board = Self::flag(child),
                Some("embedded_fonts") => symbol.embedded_fonts = Self::flag(child),
                Some("power") => {
                    symbol.is_power = true;
                    symbol.power_scope = children(child)
                        .first()
                        .and_then(SExp::as_atom)
                        .map(str::to_string);
                }
                Some("property") => symbol.properties.push(Property::from_sexp(child)?),
                Some("embedded_files") => {
                    for file in child.get_all("file") {
                        symbol.files.push(EmbeddedFile::from_sexp(file)?);
                    }
                }
                Some("symbol") => Self::read_unit(child, &mut symbol)?,
                _ => symbol.extra.push(child.clone()),
            }
        }

        Ok(symbol)
    }

    fn flag(node: &SExp) -> bool {
        children(node).first().and_then(SExp::as_str) == Some("yes")
    }

    /// Split `<symbol>_<unit>_<style>` into its indices.
    pub fn parse_unit_name(symbol: &str, unit_name: &str) -> Option<(u32, u32)> {
        let suffix = unit_name.strip_prefix(symbol)?.strip_prefix('_')?;
        let (unit, style) = suffix.split_once('_')?;
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(unit) || !all_digits(style) {
            return None;
        }
        Some((unit.parse().ok()?, style.parse().ok()?))
    }

    fn read_unit(node: &SExp, symbol: &mut Symbol) -> Result<(), FormatError> {
        let items = node.as_list().unwrap_or(&[]);
        let raw = items
            .get(1)
            .and_then(SExp::as_str)
            .ok_or_else(|| FormatError::missing("name", format!("subsymbol of {}", symbol.name)))?;
        let (unit, demorgan) = Self::parse_unit_name(&symbol.name, raw)
            .ok_or_else(|| FormatError::InvalidSubSymbolName(raw.to_string()))?;

        for child in &items[2..] {
            match child.keyword() {
                Some("pin") => {
                    let pin = Pin::from_sexp(child)?;
                    symbol.pins.push(pin.in_unit(unit, demorgan));
                }
                Some("rectangle") => {
                    let mut r = Rectangle::from_sexp(child)?;
                    (r.unit, r.demorgan) = (unit, demorgan);
                    symbol.rectangles.push(r);
                }
                Some("circle") => {
                    let mut c = Circle::from_sexp(child)?;
                    (c.unit, c.demorgan) = (unit, demorgan);
                    symbol.circles.push(c);
                }
                Some("arc") => {
                    let mut a = Arc::from_sexp(child)?;
                    (a.unit, a.demorgan) = (unit, demorgan);
                    symbol.arcs.push(a);
                }
                Some("polyline") => {
                    let mut p = Polyline::from_sexp(child)?;
                    (p.unit, p.demorgan) = (unit, demorgan);
                    symbol.polylines.push(p);
                }
                Some("bezier") => {
                    let mut b = Bezier::from_sexp(child)?;
                    (b.unit, b.demorgan) = (unit, demorgan);
                    symbol.beziers.push(b);
                }
                Some("text") => {
                    let mut t = Text::from_sexp(child)?;
                    (t.unit, t.demorgan) = (unit, demorgan);
                    symbol.texts.push(t);
                }
                Some("unit_name") => {
                    if let Some(name) = children(child).first().and_then(SExp::as_str) {
                        symbol.unit_names.insert(unit, name.to_string());
                    }
                }
                _ => symbol.unit_extra.push(UnitNode {
                    unit,
                    demorgan,
                    node: child.clone(),
                }),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::symbol::{ElectricalType, PinShape};

    #[test]
    fn test_unit_name_split() {
        assert_eq!(SymbolReader::parse_unit_name("R", "R_0_1"), Some((0, 1)));
        assert_eq!(SymbolReader::parse_unit_name("R_Small", "R_Small_12_2"), Some((12, 2)));
        assert_eq!(SymbolReader::parse_unit_name("R", "R_a_1"), None);
        assert_eq!(SymbolReader::parse_unit_name("R", "C_1_1"), None);
    }

    #[test]
    fn test_read_pin() {
        let node = parse(
            r#"(pin power_in inverted (at 0 -5.08 90) (length 2.54) hide
                (name "GND" (effects (font (size 1.27 1.27))))
                (number "2" (effects (font (size 1.27 1.27))))
                (alternate "SDA" bidirectional line))"#,
        )
        .unwrap();
        let pin = Pin::from_sexp(&node).unwrap();
        assert_eq!(pin.name, "GND");
        assert_eq!(pin.number, "2");
        assert_eq!(pin.etype, ElectricalType::PowerIn);
        assert_eq!(pin.shape, PinShape::Inverted);
        assert_eq!(pin.direction(), 'U');
        assert!(pin.is_hidden);
        assert_eq!(pin.alternates.len(), 1);
    }

    #[test]
    fn test_pin_rotation_rejected() {
        let node = parse(
            r#"(pin input line (at 0 0 45) (length 2.54)
                (name "A" (effects (font (size 1.27 1.27))))
                (number "1" (effects (font (size 1.27 1.27)))))"#,
        )
        .unwrap();
        assert!(matches!(
            Pin::from_sexp(&node),
            Err(FormatError::InvalidRotation(_))
        ));
    }

    #[test]
    fn test_read_private_property() {
        let node = parse(
            r#"(property private "KLC_S4.2" "VDD is internal" (at 0 0 0)
                (effects (font (size 1.27 1.27)) hide))"#,
        )
        .unwrap();
        let prop = Property::from_sexp(&node).unwrap();
        assert!(prop.private);
        assert!(prop.is_hidden);
        assert!(!prop.effects.hidden);
        assert_eq!(prop.name, "KLC_S4.2");
    }

    #[test]
    fn test_read_effects() {
        let node = parse(
            r#"(effects (font (face "Arial") (size 1 1.5) (bold yes) italic)
                (justify left bottom mirror))"#,
        )
        .unwrap();
        let e = TextEffect::from_sexp(&node).unwrap();
        assert_eq!(e.face.as_deref(), Some("Arial"));
        assert_eq!((e.size_x, e.size_y), (1.0, 1.5));
        assert!(e.bold && e.italic && e.mirrored);
        assert_eq!(e.h_justify, Justify::Left);
        assert_eq!(e.v_justify, Justify::Bottom);
    }

    #[test]
    fn test_unknown_fill_type() {
        let node = parse("(rectangle (start 0 0) (end 1 1) (fill (type hatched)))").unwrap();
        assert!(matches!(
            Rectangle::from_sexp(&node),
            Err(FormatError::UnknownKeyword { kind: "fill type", .. })
        ));
    }
}
