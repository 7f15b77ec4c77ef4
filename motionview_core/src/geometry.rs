//! Shared geometry: angles, field bounds, quantized field rotation.
//!
//! World coordinates are inches with +y up. Screen coordinates are pixels
//! with +y down. Both are carried as `nalgebra::Point2<f64>`.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A point in field coordinates (inches).
pub type WorldPoint = Point2<f64>;

/// A point in viewport coordinates (pixels).
pub type ScreenPoint = Point2<f64>;

/// Wraps an angle in degrees into `[0, 360)`.
pub fn normalize_deg(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shortest-arc interpolation between two headings.
///
/// The signed difference is folded into `[-180, 180)`, so the path never
/// exceeds half a turn and crosses the 0/360 seam when that is shorter.
pub fn lerp_deg(a: f64, b: f64, t: f64) -> f64 {
    let diff = (b - a + 540.0).rem_euclid(360.0) - 180.0;
    normalize_deg(a + diff * t)
}

/// Linear interpolation.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Rounds `value` to the nearest multiple of `step`; `step <= 0` disables snapping.
pub fn snap_to_step(value: f64, step: f64) -> f64 {
    if step > 0.0 && step.is_finite() {
        (value / step).round() * step
    } else {
        value
    }
}

/// Rectangular extent of the playing field, in inches, plus the pixel padding
/// kept around it when fitting to a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// Viewport padding in pixels
    pub pad: f64,
}

impl Default for FieldBounds {
    fn default() -> Self {
        // 12ft x 12ft field centred on the origin
        Self {
            min_x: -72.0,
            max_x: 72.0,
            min_y: -72.0,
            max_y: 72.0,
            pad: 30.0,
        }
    }
}

impl FieldBounds {
    /// World width; never zero.
    pub fn width(&self) -> f64 {
        let w = self.max_x - self.min_x;
        if w == 0.0 { 1.0 } else { w }
    }

    /// World height; never zero.
    pub fn height(&self) -> f64 {
        let h = self.max_y - self.min_y;
        if h == 0.0 { 1.0 } else { h }
    }

    /// Clamps a point into the field.
    pub fn clamp(&self, p: WorldPoint) -> WorldPoint {
        Point2::new(
            p.x.clamp(self.min_x, self.max_x),
            p.y.clamp(self.min_y, self.max_y),
        )
    }

    /// True when `p` lies inside the field (inclusive).
    pub fn contains(&self, p: WorldPoint) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// The four corners, in no particular order.
    pub fn corners(&self) -> [WorldPoint; 4] {
        [
            Point2::new(self.min_x, self.min_y),
            Point2::new(self.min_x, self.max_y),
            Point2::new(self.max_x, self.min_y),
            Point2::new(self.max_x, self.max_y),
        ]
    }

    /// Bounding box of `points` grown by `margin` on every side.
    ///
    /// Returns `None` for an empty iterator. Padding is taken from `self`.
    pub fn fitted_to<I>(&self, points: I, margin: f64) -> Option<FieldBounds>
    where
        I: IntoIterator<Item = WorldPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some(FieldBounds {
            min_x: min_x - margin,
            max_x: max_x + margin,
            min_y: min_y - margin,
            max_y: max_y + margin,
            pad: self.pad,
        })
    }
}

/// Field rotation, quantized to quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl FieldRotation {
    /// Quantizes an arbitrary angle. Anything other than an exact quarter
    /// turn (after wrapping) maps to `Deg0`.
    pub fn from_degrees(deg: f64) -> Self {
        let norm = normalize_deg(deg);
        if norm == 90.0 {
            FieldRotation::Deg90
        } else if norm == 180.0 {
            FieldRotation::Deg180
        } else if norm == 270.0 {
            FieldRotation::Deg270
        } else {
            FieldRotation::Deg0
        }
    }

    pub fn degrees(&self) -> f64 {
        match self {
            FieldRotation::Deg0 => 0.0,
            FieldRotation::Deg90 => 90.0,
            FieldRotation::Deg180 => 180.0,
            FieldRotation::Deg270 => 270.0,
        }
    }

    /// Exact (cos, sin) for the quarter turn.
    pub fn cos_sin(&self) -> (f64, f64) {
        match self {
            FieldRotation::Deg0 => (1.0, 0.0),
            FieldRotation::Deg90 => (0.0, 1.0),
            FieldRotation::Deg180 => (-1.0, 0.0),
            FieldRotation::Deg270 => (0.0, -1.0),
        }
    }

    /// Rotates a world vector counter-clockwise by this rotation.
    pub fn rotate(&self, v: Vector2<f64>) -> Vector2<f64> {
        let (c, s) = self.cos_sin();
        Vector2::new(v.x * c - v.y * s, v.x * s + v.y * c)
    }

    /// Applies the inverse rotation.
    pub fn unrotate(&self, v: Vector2<f64>) -> Vector2<f64> {
        let (c, s) = self.cos_sin();
        Vector2::new(v.x * c + v.y * s, -v.x * s + v.y * c)
    }
}

/// Axis-aligned rectangle in screen space, built from two drag corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub min: ScreenPoint,
    pub max: ScreenPoint,
}

impl ScreenRect {
    /// Normalizes two arbitrary corners.
    pub fn from_corners(a: ScreenPoint, b: ScreenPoint) -> Self {
        Self {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Projection of `p` onto segment `a`-`b`.
///
/// Returns the parameter along the segment, clamped to `[0, 1]`, and the
/// squared distance from `p` to the projected point.
pub fn project_onto_segment(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> (f64, f64) {
    let v = b - a;
    let w = p - a;
    let vv = v.norm_squared();
    let vv = if vv == 0.0 { 1.0 } else { vv };
    let alpha = (w.dot(&v) / vv).clamp(0.0, 1.0);
    let closest = a + v * alpha;
    (alpha, (p - closest).norm_squared())
}
