#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library of 2D world-space primitives for the platformer pilot."]
#![doc = ""]
#![doc = "This crate provides points, axis-aligned boxes and the coordinate transform"]
#![doc = "boundary between screen space (detector output) and world space (map, planner)."]

use core::fmt;
use libm::{fabs, sqrt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::GeometryError;

/// A point (or displacement) in world or screen units.
///
/// Screen convention throughout the workspace: +x points right, +y points down.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate, growing downward.
    pub y: f64,
}

impl Point2 {
    /// Construct a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Point2 { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: Point2) -> f64 {
        sqrt(self.distance_squared(other))
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(&self, other: Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Returns this point translated by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Point2 {
        Point2::new(self.x + dx, self.y + dy)
    }

    /// Returns this vector multiplied by `factor`.
    pub fn scale(&self, factor: f64) -> Point2 {
        Point2::new(self.x * factor, self.y * factor)
    }

    /// Length of this point interpreted as a vector from the origin.
    pub fn length(&self) -> f64 {
        sqrt(self.x * self.x + self.y * self.y)
    }

    /// Unit vector in the same direction, or `None` for a zero-length vector.
    pub fn normalized(&self) -> Option<Point2> {
        let len = self.length();
        if len <= f64::EPSILON || !len.is_finite() {
            None
        } else {
            Some(Point2::new(self.x / len, self.y / len))
        }
    }

    /// True when both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Point2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// An axis-aligned bounding box stored as min/max corners.
///
/// Invariant: `max.x >= min.x` and `max.y >= min.y`, so width and height are
/// never negative. Both constructors enforce it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    /// Top-left corner (smallest x and y).
    pub min: Point2,
    /// Bottom-right corner (largest x and y).
    pub max: Point2,
}

impl Aabb {
    /// Build a box from any two opposite corners.
    pub fn from_corners(a: Point2, b: Point2) -> Self {
        Aabb {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Build a box from its center and full size. Negative sizes clamp to zero.
    pub fn from_center_size(center: Point2, width: f64, height: f64) -> Self {
        let hw = width.max(0.0) / 2.0;
        let hh = height.max(0.0) / 2.0;
        Aabb {
            min: Point2::new(center.x - hw, center.y - hh),
            max: Point2::new(center.x + hw, center.y + hh),
        }
    }

    /// Box width.
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Box height.
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Box center.
    pub fn center(&self) -> Point2 {
        Point2::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }

    /// True when the box has zero area.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Half-open containment: `min` edges inclusive, `max` edges exclusive.
    ///
    /// This is the rule used by the spatial index so that a point on an edge
    /// shared by two neighbouring boxes belongs to exactly one of them.
    pub fn contains_half_open(&self, p: Point2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    /// Closed containment: all four edges inclusive.
    pub fn contains_point(&self, p: Point2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Strict overlap test. Boxes that merely touch along an edge do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Closed intersection test, used for conservative pruning.
    pub fn intersects(&self, other: &Aabb) -> bool {
        !(other.min.x > self.max.x
            || other.max.x < self.min.x
            || other.min.y > self.max.y
            || other.max.y < self.min.y)
    }

    /// True when the circle at `center` with `radius` touches this box.
    pub fn intersects_circle(&self, center: Point2, radius: f64) -> bool {
        let closest = Point2::new(
            center.x.clamp(self.min.x, self.max.x),
            center.y.clamp(self.min.y, self.max.y),
        );
        center.distance_squared(closest) <= radius * radius
    }

    /// Returns a box with the same center and both sides scaled by `factor`.
    pub fn inflated(&self, factor: f64) -> Aabb {
        Aabb::from_center_size(self.center(), self.width() * factor, self.height() * factor)
    }

    /// Returns a box with the same center and only the height scaled by `factor`.
    pub fn with_height_scale(&self, factor: f64) -> Aabb {
        Aabb::from_center_size(self.center(), self.width(), self.height() * factor)
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

/// Maps detector (screen) coordinates to world coordinates and back.
///
/// Implementations are supplied by the capture layer. A `None` result means
/// the detection cannot be placed in the world this frame and must be skipped.
pub trait CoordinateTransform {
    /// Screen position to world position.
    fn screen_to_world(&self, screen: Point2) -> Option<Point2>;

    /// World position to screen position.
    fn world_to_screen(&self, world: Point2) -> Option<Point2>;
}

/// A per-axis scale followed by a translation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    scale_x: f64,
    scale_y: f64,
    offset: Point2,
}

impl LinearTransform {
    /// Construct a new transform: `world = screen * scale + offset`.
    ///
    /// # Errors
    ///
    /// Returns `Err(GeometryError::InvalidScale)` if either scale is not a positive finite number.
    pub fn new(scale_x: f64, scale_y: f64, offset: Point2) -> Result<Self, GeometryError> {
        if !(scale_x > 0.0 && scale_x.is_finite()) || !(scale_y > 0.0 && scale_y.is_finite()) {
            return Err(GeometryError::InvalidScale("must be positive and finite"));
        }
        if !offset.is_finite() {
            return Err(GeometryError::NonFiniteCoordinate("offset"));
        }
        Ok(LinearTransform { scale_x, scale_y, offset })
    }

    /// Identity transform (screen space is world space).
    pub const fn identity() -> Self {
        LinearTransform {
            scale_x: 1.0,
            scale_y: 1.0,
            offset: Point2::new(0.0, 0.0),
        }
    }
}

impl Default for LinearTransform {
    fn default() -> Self {
        LinearTransform::identity()
    }
}

impl CoordinateTransform for LinearTransform {
    fn screen_to_world(&self, screen: Point2) -> Option<Point2> {
        if !screen.is_finite() {
            return None;
        }
        Some(Point2::new(
            screen.x * self.scale_x + self.offset.x,
            screen.y * self.scale_y + self.offset.y,
        ))
    }

    fn world_to_screen(&self, world: Point2) -> Option<Point2> {
        if !world.is_finite() {
            return None;
        }
        Some(Point2::new(
            (world.x - self.offset.x) / self.scale_x,
            (world.y - self.offset.y) / self.scale_y,
        ))
    }
}

/// Returns true when `a` and `b` differ by less than `eps`.
pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    fabs(a - b) < eps
}
