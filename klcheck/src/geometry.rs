//! Minimal 2D geometry used by the symbol model and the rule catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Tolerance used for coincidence tests, in millimeters.
pub const EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.square_length().sqrt()
    }

    pub fn square_length(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn manhattan_length(&self) -> f64 {
        self.x.abs() + self.y.abs()
    }

    /// Angle in radians, 0 pointing right. Vertical vectors report pi/2
    /// regardless of direction, so the value identifies the line's slope.
    pub fn angle(&self) -> f64 {
        if self.x == 0.0 {
            std::f64::consts::FRAC_PI_2
        } else {
            (self.y / self.x).atan()
        }
    }

    pub fn cross(&self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A location in millimeters. Symbol space has Y pointing up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    pub fn from_origin(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn vec_to(&self, other: &Point) -> Vec2 {
        other.from_origin() - self.from_origin()
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        self.vec_to(other).length()
    }

    pub fn angle_to(&self, other: &Point) -> f64 {
        self.vec_to(other).angle()
    }

    pub fn is_close(&self, other: &Point, tol: f64) -> bool {
        self.distance_to(other) < tol
    }

    /// Key for a strict total order: x first, then y.
    pub fn lexicographic_key(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    fn lexicographic_cmp(&self, other: &Point) -> std::cmp::Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn vector(&self) -> Vec2 {
        self.start.vec_to(&self.end)
    }

    pub fn length(&self) -> f64 {
        self.vector().length()
    }

    pub fn angle(&self) -> f64 {
        self.vector().angle()
    }

    /// Same segment with endpoints ordered, so A->B and B->A compare equal.
    pub fn lexicographically_ordered(&self) -> Segment {
        if self.start.lexicographic_cmp(&self.end).is_gt() {
            Segment::new(self.end, self.start)
        } else {
            *self
        }
    }

    /// Equal within `tol`, ignoring direction.
    pub fn is_same(&self, other: &Segment, tol: f64) -> bool {
        let a = self.lexicographically_ordered();
        let b = other.lexicographically_ordered();
        a.start.is_close(&b.start, tol) && a.end.is_close(&b.end, tol)
    }

    /// True when exactly one endpoint is shared.
    pub fn shares_one_endpoint(&self, other: &Segment, tol: f64) -> bool {
        let pairs = [
            (&self.start, &other.start, &self.end, &other.end),
            (&self.start, &other.end, &self.end, &other.start),
            (&self.end, &other.start, &self.start, &other.end),
            (&self.end, &other.end, &self.start, &other.start),
        ];
        for (a, b, rest_a, rest_b) in pairs {
            if a.is_close(b, tol) {
                return !rest_a.is_close(rest_b, tol);
            }
        }
        false
    }

    pub fn contains_point(&self, point: &Point, tol: f64) -> bool {
        let v = self.vector();
        let p = self.start.vec_to(point);

        if v.cross(p).abs() > tol {
            return false;
        }

        let dot = v.dot(p);
        dot >= -tol && dot <= v.square_length() + tol
    }

    /// Collinear overlap. Segments chained end to end do not count.
    pub fn overlaps(&self, other: &Segment, tol: f64) -> bool {
        if self.shares_one_endpoint(other, tol) {
            return false;
        }

        self.contains_point(&other.start, tol)
            || self.contains_point(&other.end, tol)
            || other.contains_point(&self.start, tol)
            || other.contains_point(&self.end, tol)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seg({} -> {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bb = BoundingBox {
            min: *first,
            max: *first,
        };
        for p in iter {
            bb.min.x = bb.min.x.min(p.x);
            bb.min.y = bb.min.y.min(p.y);
            bb.max.x = bb.max.x.max(p.x);
            bb.max.y = bb.max.y.max(p.y);
        }
        Some(bb)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    #[test]
    fn test_vector_ops() {
        let v = Vec2::new(3.0, 4.0);
        assert_eq!(v.length(), 5.0);
        assert_eq!(v.square_length(), 25.0);
        assert_eq!(v.cross(Vec2::new(1.0, 0.0)), -4.0);
        assert_eq!(v.dot(Vec2::new(1.0, 1.0)), 7.0);
        assert_eq!(v - Vec2::new(1.0, 1.0), Vec2::new(2.0, 3.0));
    }

    #[test]
    fn test_vertical_angle() {
        assert_eq!(
            Vec2::new(0.0, -2.0).angle(),
            std::f64::consts::FRAC_PI_2
        );
        assert_eq!(Vec2::new(2.0, 0.0).angle(), 0.0);
    }

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.0, 2.54);
        assert!((a.distance_to(&b) - 2.54).abs() < EPSILON);
        assert_eq!(a.vec_to(&b), Vec2::new(0.0, 2.54));
    }

    #[test]
    fn test_segment_same_reversed() {
        let a = seg(0.0, 0.0, 1.0, 1.0);
        let b = seg(1.0, 1.0, 0.0, 0.0);
        assert!(a.is_same(&b, EPSILON));
        assert!(!a.is_same(&seg(0.0, 0.0, 1.0, 2.0), EPSILON));
    }

    #[test]
    fn test_chained_segments_do_not_overlap() {
        let a = seg(0.0, 0.0, 1.0, 0.0);
        let b = seg(1.0, 0.0, 2.0, 0.0);
        assert!(a.shares_one_endpoint(&b, EPSILON));
        assert!(!a.overlaps(&b, EPSILON));
    }

    #[test]
    fn test_collinear_overlap() {
        let a = seg(0.0, 0.0, 2.0, 0.0);
        let b = seg(1.0, 0.0, 3.0, 0.0);
        assert!(a.overlaps(&b, EPSILON));
        assert!(!a.overlaps(&seg(0.0, 1.0, 2.0, 1.0), EPSILON));
    }

    #[test]
    fn test_bounding_box() {
        let pts = [Point::new(-1.0, 2.0), Point::new(3.0, -4.0)];
        let bb = BoundingBox::from_points(&pts).unwrap();
        assert_eq!(bb.width(), 4.0);
        assert_eq!(bb.height(), 6.0);
        assert_eq!(bb.center(), Point::new(1.0, -1.0));
        assert!(BoundingBox::from_points(&Vec::<Point>::new()).is_none());
    }
}
