//! Graphic primitives drawn inside a symbol unit.

use std::cell::OnceCell;
use std::str::FromStr;

use super::types::{Color, TextEffect};
use super::{mil_to_mm, FormatError};
use crate::geometry::{BoundingBox, Point, Segment};

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub width: f64,
    /// Line style keyword, e.g. `default`, `solid`, `dash`.
    pub style: String,
    pub color: Option<Color>,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            width: 0.254,
            style: "default".to_string(),
            color: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillType {
    #[default]
    None,
    Outline,
    Background,
    Color,
}

impl FillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillType::None => "none",
            FillType::Outline => "outline",
            FillType::Background => "background",
            FillType::Color => "color",
        }
    }
}

impl FromStr for FillType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FillType::None),
            "outline" => Ok(FillType::Outline),
            "background" => Ok(FillType::Background),
            "color" => Ok(FillType::Color),
            other => Err(FormatError::UnknownKeyword {
                kind: "fill type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fill {
    pub fill_type: FillType,
    pub color: Option<Color>,
}

impl Fill {
    pub fn new(fill_type: FillType) -> Self {
        Self {
            fill_type,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rectangle {
    pub start: Point,
    pub end: Point,
    pub stroke: Stroke,
    pub fill: Fill,
    pub unit: u32,
    pub demorgan: u32,
}

impl Rectangle {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            stroke: Stroke::default(),
            fill: Fill::new(FillType::Background),
            unit: 0,
            demorgan: 0,
        }
    }

    pub fn new_mil(sx: f64, sy: f64, ex: f64, ey: f64) -> Self {
        Self::new(
            Point::new(mil_to_mm(sx), mil_to_mm(sy)),
            Point::new(mil_to_mm(ex), mil_to_mm(ey)),
        )
    }

    pub fn area(&self) -> f64 {
        (self.start.x - self.end.x).abs() * (self.start.y - self.end.y).abs()
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// The same outline as a closed 5-point polyline.
    pub fn as_polyline(&self) -> Polyline {
        let (s, e) = (self.start, self.end);
        let mut pl = Polyline::new(vec![
            s,
            Point::new(e.x, s.y),
            e,
            Point::new(s.x, e.y),
            s,
        ]);
        pl.stroke = self.stroke.clone();
        pl.fill = self.fill.clone();
        pl.unit = self.unit;
        pl.demorgan = self.demorgan;
        pl
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
    pub stroke: Stroke,
    pub fill: Fill,
    pub unit: u32,
    pub demorgan: u32,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self {
            center,
            radius,
            stroke: Stroke::default(),
            fill: Fill::default(),
            unit: 0,
            demorgan: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    pub start: Point,
    pub mid: Point,
    pub end: Point,
    pub stroke: Stroke,
    pub fill: Fill,
    pub unit: u32,
    pub demorgan: u32,
}

impl Arc {
    pub fn new(start: Point, mid: Point, end: Point) -> Self {
        Self {
            start,
            mid,
            end,
            stroke: Stroke::default(),
            fill: Fill::default(),
            unit: 0,
            demorgan: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub stroke: Stroke,
    pub fill: Fill,
    pub unit: u32,
    pub demorgan: u32,
    segments: OnceCell<Vec<Segment>>,
}

impl PartialEq for Polyline {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
            && self.stroke == other.stroke
            && self.fill == other.fill
            && self.unit == other.unit
            && self.demorgan == other.demorgan
    }
}

impl Polyline {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            stroke: Stroke::default(),
            fill: Fill::default(),
            unit: 0,
            demorgan: 0,
            segments: OnceCell::new(),
        }
    }

    /// First and last point coincide. A closed triangle stores 4 points.
    pub fn is_closed(&self) -> bool {
        self.points.len() > 3 && self.points.first() == self.points.last()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }

    pub fn center(&self) -> Point {
        self.bounding_box()
            .map(|bb| bb.center())
            .unwrap_or_else(Point::origin)
    }

    /// Closed, 5 points, and every edge horizontal or vertical.
    pub fn is_rectangle(&self) -> bool {
        if self.points.len() != 5 || !self.is_closed() {
            return false;
        }
        self.points
            .windows(2)
            .all(|w| w[1].x - w[0].x == 0.0 || w[1].y - w[0].y == 0.0)
    }

    pub fn area(&self) -> f64 {
        self.bounding_box().map(|bb| bb.area()).unwrap_or(0.0)
    }

    /// Consecutive point pairs, computed on first use. Mutating `points`
    /// afterwards requires [`Polyline::invalidate_segments`].
    pub fn segments(&self) -> &[Segment] {
        self.segments.get_or_init(|| {
            self.points
                .windows(2)
                .map(|w| Segment::new(w[0], w[1]))
                .collect()
        })
    }

    pub fn invalidate_segments(&mut self) {
        self.segments = OnceCell::new();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bezier {
    pub points: Vec<Point>,
    pub stroke: Stroke,
    pub fill: Fill,
    pub unit: u32,
    pub demorgan: u32,
}

impl Bezier {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            stroke: Stroke {
                width: 0.0,
                ..Stroke::default()
            },
            fill: Fill::default(),
            unit: 0,
            demorgan: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
    pub pos: Point,
    pub rotation: f64,
    pub effects: TextEffect,
    pub is_hidden: bool,
    pub unit: u32,
    pub demorgan: u32,
}

impl Text {
    pub fn new(text: impl Into<String>, pos: Point) -> Self {
        Self {
            text: text.into(),
            pos,
            rotation: 0.0,
            effects: TextEffect::default(),
            is_hidden: false,
            unit: 0,
            demorgan: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_as_polyline() {
        let rect = Rectangle::new_mil(-200.0, 300.0, 200.0, -300.0);
        assert!((rect.area() - 10.16 * 15.24).abs() < 1e-9);
        let pl = rect.as_polyline();
        assert!(pl.is_closed());
        assert!(pl.is_rectangle());
        assert_eq!(pl.center(), Point::new(0.0, 0.0));
        assert_eq!(pl.fill.fill_type, FillType::Background);
    }

    #[test]
    fn test_open_polyline() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
        ]);
        assert!(!pl.is_closed());
        assert!(!pl.is_rectangle());
        assert_eq!(pl.segments().len(), 2);
    }

    #[test]
    fn test_diagonal_not_rectangle() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 0.0),
            Point::new(1.0, -1.0),
            Point::new(0.0, 0.0),
        ]);
        assert!(pl.is_closed());
        assert!(!pl.is_rectangle());
    }
}
