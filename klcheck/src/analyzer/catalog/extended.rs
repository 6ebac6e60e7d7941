//! Extended checks with no KLC counterpart. These only warn.

use std::f64::consts::FRAC_PI_2;

use crate::analyzer::rules::{Rule, RuleContext, RuleLog};
use crate::geometry::{Point, Segment, EPSILON};
use crate::symbol::{mil_to_mm, mm_to_mil, Justify, Property, Symbol};

/// Segments shorter than this (mm) are considered degenerate.
const SMALL_LENGTH: f64 = 0.1;

/// Segments closer than this to an axis without being on it are suspicious.
const VERY_SMALL_ANGLE: f64 = 0.4 * std::f64::consts::PI / 180.0;

/// EC01
pub struct BasicGeometry;

impl BasicGeometry {
    fn check_arcs(symbol: &Symbol, log: &mut RuleLog) {
        for arc in &symbol.arcs {
            if arc.start.distance_to(&arc.mid) < SMALL_LENGTH
                || arc.end.distance_to(&arc.mid) < SMALL_LENGTH
            {
                log.warning(format!(
                    "Arc has zero or near-zero size: start {}, mid {}, end {}",
                    arc.start, arc.mid, arc.end
                ));
            } else if arc.start.distance_to(&arc.end) < SMALL_LENGTH {
                log.warning(format!(
                    "Arc starts and ends in the same place ({}): is it a circle?",
                    arc.start
                ));
            }
        }
    }

    /// Distance from the nearest axis, in radians.
    fn axis_deviation(angle: f64) -> f64 {
        let quarter = FRAC_PI_2 / 2.0;
        quarter - (quarter - angle.rem_euclid(FRAC_PI_2)).abs()
    }

    fn check_polylines(symbol: &Symbol, log: &mut RuleLog) {
        for polyline in &symbol.polylines {
            let n_points = polyline.points.len();
            match n_points {
                0 => log.warning("Polyline contains no points"),
                1 => log.warning(format!(
                    "Polyline contains only a single point: {}",
                    polyline.points[0]
                )),
                _ => {
                    for (i, seg) in polyline.segments().iter().enumerate() {
                        if seg.length() < SMALL_LENGTH {
                            log.warning(format!(
                                "Polyline contains a zero or near-zero length segment (segment {} of {}): {}, length {:.4}",
                                i + 1,
                                n_points - 1,
                                seg,
                                seg.length()
                            ));
                        }
                        let deviation = Self::axis_deviation(seg.angle());
                        if deviation > 0.0 && deviation < VERY_SMALL_ANGLE {
                            log.warning(format!(
                                "Polyline contains a segment that is nearly but not exactly horizontal or vertical (segment {} of {}): segment {} is {:.4} degrees",
                                i + 1,
                                n_points - 1,
                                seg,
                                seg.angle().to_degrees()
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_segments(symbol: &Symbol, log: &mut RuleLog) {
        let mut seen: Vec<Segment> = Vec::new();
        for polyline in &symbol.polylines {
            for seg in polyline.segments() {
                if seg.length() < SMALL_LENGTH {
                    continue;
                }
                if seen.iter().any(|s| s.is_same(seg, EPSILON)) {
                    log.warning(format!("The same segment exists multiple times: {}", seg));
                } else if let Some(other) = seen.iter().find(|s| s.overlaps(seg, EPSILON)) {
                    log.warning(format!("Segments overlap: {} and {}", other, seg));
                }
                seen.push(*seg);
            }
        }
    }

    fn check_circles_and_arcs(symbol: &Symbol, log: &mut RuleLog) {
        let mut circles: Vec<(Point, f64)> = Vec::new();
        for circle in &symbol.circles {
            let duplicate = circles.iter().any(|(c, r)| {
                c.is_close(&circle.center, EPSILON) && (r - circle.radius).abs() < EPSILON
            });
            if duplicate {
                log.warning(format!(
                    "The same circle geometry exists multiple times: {}, radius {}",
                    circle.center, circle.radius
                ));
            } else {
                circles.push((circle.center, circle.radius));
            }
        }

        let mut arcs: Vec<[Point; 3]> = Vec::new();
        for arc in &symbol.arcs {
            let key = [arc.start, arc.mid, arc.end];
            let duplicate = arcs
                .iter()
                .any(|k| k.iter().zip(key.iter()).all(|(a, b)| a.is_close(b, EPSILON)));
            if duplicate {
                log.warning(format!(
                    "The same arc geometry exists multiple times: {}, midpoint {}, end {}",
                    arc.start, arc.mid, arc.end
                ));
            } else {
                arcs.push(key);
            }
        }
    }
}

impl Rule for BasicGeometry {
    fn id(&self) -> &'static str {
        "EC01"
    }

    fn description(&self) -> &'static str {
        "Basic geometry checks"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        Self::check_arcs(symbol, log);
        Self::check_polylines(symbol, log);
        Self::check_segments(symbol, log);
        Self::check_circles_and_arcs(symbol, log);
    }

    fn fix(&self, _symbol: &mut Symbol, _log: &mut RuleLog) -> bool {
        false
    }
}

/// Where a field should sit and how it should be justified.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    pos: Point,
    justify: Justify,
}

fn position_label(pos: &Point) -> String {
    format!("@ ({}, {})", mm_to_mil(pos.x), mm_to_mil(pos.y))
}

fn same_position(a: &Point, b: &Point) -> bool {
    let r = |v: f64| (v * 1e6).round();
    r(a.x) == r(b.x) && r(a.y) == r(b.y)
}

/// EC02
pub struct FieldPlacement;

impl FieldPlacement {
    /// Recommended placement of Reference, Value and Footprint, keyed by
    /// property name with the label used in messages. `None` when the
    /// symbol has no body rectangle to anchor them to.
    fn recommended(symbol: &Symbol) -> Option<[(&'static str, &'static str, Placement); 3]> {
        let body = symbol.get_center_rectangle(Some(&[0, 1]))?;
        let bbox = body.bounding_box()?;
        let (top, bottom) = (bbox.max.y, bbox.min.y);

        let top_pins = symbol.filter_pins(None, Some('D'), None);
        let above = |offset: f64| match top_pins.iter().map(|p| p.pos.x).reduce(f64::min) {
            None => Placement {
                pos: Point::new(0.0, top + mil_to_mm(offset)),
                justify: Justify::Center,
            },
            Some(x) => Placement {
                pos: Point::new(x - mil_to_mm(100.0), top + mil_to_mm(offset)),
                justify: Justify::Right,
            },
        };

        let bottom_y = bottom - mil_to_mm(50.0);
        let footprint = match symbol
            .filter_pins(None, Some('U'), None)
            .iter()
            .map(|p| p.pos.x)
            .reduce(f64::max)
        {
            None => Placement {
                pos: Point::new(0.0, bottom_y),
                justify: Justify::Center,
            },
            Some(x) => Placement {
                pos: Point::new(x + mil_to_mm(50.0), bottom_y),
                justify: Justify::Left,
            },
        };

        Some([
            ("Reference", "reference", above(125.0)),
            ("Value", "name", above(50.0)),
            ("Footprint", "footprint", footprint),
        ])
    }

    fn check_field(prop: &Property, label: &str, wanted: &Placement, log: &mut RuleLog) {
        if !same_position(&prop.pos, &wanted.pos) {
            log.warning(format!(
                "field: {}, {}, recommended {}",
                label,
                position_label(&prop.pos),
                position_label(&wanted.pos)
            ));
        }
        if prop.effects.h_justify != wanted.justify {
            log.warning(format!(
                "field: {}, justification {}, recommended {}",
                label,
                prop.effects.h_justify.as_str(),
                wanted.justify.as_str()
            ));
        }
    }
}

impl Rule for FieldPlacement {
    fn id(&self) -> &'static str {
        "EC02"
    }

    fn description(&self) -> &'static str {
        "Check part reference, name and footprint position and alignment"
    }

    fn check(&self, symbol: &Symbol, _ctx: &RuleContext<'_>, log: &mut RuleLog) {
        let Some(fields) = Self::recommended(symbol) else {
            return;
        };
        for (name, label, wanted) in &fields {
            if let Some(prop) = symbol.get_property(name) {
                Self::check_field(prop, label, wanted, log);
            }
        }
    }

    fn fix(&self, symbol: &mut Symbol, log: &mut RuleLog) -> bool {
        let Some(fields) = Self::recommended(symbol) else {
            return false;
        };
        log.info("Fixing...");
        let mut changed = false;
        for (name, _, wanted) in fields {
            let Some(prop) = symbol.get_property_mut(name) else {
                continue;
            };
            if !same_position(&prop.pos, &wanted.pos) || prop.effects.h_justify != wanted.justify {
                prop.pos = wanted.pos;
                prop.effects.h_justify = wanted.justify;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Arc, Circle, ElectricalType, Pin, Polyline, Rectangle, Rotation};

    fn run(symbol: &Symbol) -> RuleLog {
        run_rule(&BasicGeometry, symbol)
    }

    fn run_rule(rule: &dyn Rule, symbol: &Symbol) -> RuleLog {
        let mut log = RuleLog::new();
        rule.check(symbol, &RuleContext::default(), &mut log);
        log
    }

    /// Body from (-200, 300) to (200, -300) mil with default fields at the origin.
    fn boxed() -> Symbol {
        let mut sym = Symbol::empty("U", "l");
        sym.push_rectangle(Rectangle::new_mil(-200.0, 300.0, 200.0, -300.0));
        sym.add_default_properties();
        sym
    }

    fn pt(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_axis_deviation() {
        assert!(BasicGeometry::axis_deviation(0.0).abs() < 1e-12);
        assert!(BasicGeometry::axis_deviation(FRAC_PI_2 / 2.0) > 0.7);
        let tiny = 0.1_f64.to_radians();
        assert!((BasicGeometry::axis_deviation(-tiny) - tiny).abs() < 1e-9);
    }

    #[test]
    fn test_clean_outline() {
        let mut sym = Symbol::empty("U", "l");
        sym.push_polyline(Polyline::new(vec![
            pt(0.0, 0.0),
            pt(2.54, 0.0),
            pt(2.54, 2.54),
            pt(0.0, 2.54),
            pt(0.0, 0.0),
        ]));
        sym.push_circle(Circle::new(pt(0.0, 0.0), 1.0));
        let log = run(&sym);
        assert_eq!(log.warning_count(), 0, "{:?}", log.entries());
        assert_eq!(log.error_count(), 0);
    }

    #[test]
    fn test_degenerate_geometry() {
        let mut sym = Symbol::empty("U", "l");
        sym.push_polyline(Polyline::new(vec![pt(1.0, 1.0)]));
        sym.push_polyline(Polyline::new(vec![pt(0.0, 0.0), pt(5.0, 0.01)]));
        sym.push_arc(Arc::new(pt(1.0, 0.0), pt(1.0, 0.05), pt(2.0, 0.0)));
        sym.push_circle(Circle::new(pt(0.0, 0.0), 1.0));
        sym.push_circle(Circle::new(pt(0.0, 0.0), 1.0));
        let log = run(&sym);
        // single point, skewed segment, tiny arc, duplicate circle
        assert_eq!(log.warning_count(), 4, "{:?}", log.entries());
        assert_eq!(log.error_count(), 0);
    }

    #[test]
    fn test_duplicate_segments() {
        let mut sym = Symbol::empty("U", "l");
        sym.push_polyline(Polyline::new(vec![pt(0.0, 0.0), pt(2.54, 0.0)]));
        sym.push_polyline(Polyline::new(vec![pt(2.54, 0.0), pt(0.0, 0.0)]));
        sym.push_polyline(Polyline::new(vec![pt(1.0, 0.0), pt(5.0, 0.0)]));
        let log = run(&sym);
        assert_eq!(log.warning_count(), 2, "{:?}", log.entries());
    }

    #[test]
    fn test_field_placement_without_top_or_bottom_pins() {
        let mut sym = boxed();
        let log = run_rule(&FieldPlacement, &sym);
        // three positions; justification defaults to center already
        assert_eq!(log.warning_count(), 3, "{:?}", log.entries());
        assert_eq!(log.error_count(), 0);
        assert_eq!(
            log.entries()[0].message,
            "field: reference, @ (0, 0), recommended @ (0, 425)"
        );

        let mut fix_log = RuleLog::new();
        assert!(FieldPlacement.fix(&mut sym, &mut fix_log));
        assert_eq!(run_rule(&FieldPlacement, &sym).warning_count(), 0);
        assert_eq!(mm_to_mil(sym.get_property("Footprint").unwrap().pos.y), -350);
    }

    #[test]
    fn test_field_placement_next_to_pins() {
        let mut sym = boxed();
        sym.push_pin(
            Pin::new("VCC", "1", ElectricalType::PowerIn).at(mil_to_mm(-100.0), mil_to_mm(400.0), Rotation::R270),
        );
        sym.push_pin(
            Pin::new("GND", "2", ElectricalType::PowerIn).at(mil_to_mm(100.0), mil_to_mm(-400.0), Rotation::R90),
        );
        let mut fix_log = RuleLog::new();
        assert!(FieldPlacement.fix(&mut sym, &mut fix_log));

        let reference = sym.get_property("Reference").unwrap();
        assert_eq!(mm_to_mil(reference.pos.x), -200);
        assert_eq!(reference.effects.h_justify, Justify::Right);
        let footprint = sym.get_property("Footprint").unwrap();
        assert_eq!(mm_to_mil(footprint.pos.x), 150);
        assert_eq!(footprint.effects.h_justify, Justify::Left);
        assert_eq!(run_rule(&FieldPlacement, &sym).warning_count(), 0);

        sym.get_property_mut("Value").unwrap().effects.h_justify = Justify::Center;
        let log = run_rule(&FieldPlacement, &sym);
        assert_eq!(log.entries()[0].message, "field: name, justification center, recommended right");
    }

    #[test]
    fn test_field_placement_needs_a_body() {
        let mut sym = Symbol::empty("U", "l");
        sym.add_default_properties();
        assert_eq!(run_rule(&FieldPlacement, &sym).warning_count(), 0);
        assert!(!FieldPlacement.fix(&mut sym, &mut RuleLog::new()));
    }
}
