//! World (inches) ↔ screen (pixels) mapping with pan, zoom and quantized
//! field rotation.
//!
//! # Mapping
//!
//! ```text
//! base_scale  = min((w - 2·pad) / world_w, (h - 2·pad) / world_h)
//! base_offset = (vx + pad - min_x·base_scale,  vy + pad + max_y·base_scale)
//! scale       = base_scale · zoom
//! offset      = base_offset · zoom + pan
//!
//! (xr, yr) = rotate(x, y)
//! screen   = (offset.x + xr·scale,  offset.y - yr·scale)     // y flipped
//! ```
//!
//! In square mode the viewport is first cropped to a centred square whose
//! corner is `(vx, vy)`.

use crate::config::ViewConfig;
use crate::geometry::{FieldBounds, FieldRotation, ScreenPoint, WorldPoint};
use nalgebra::{Point2, Vector2};

/// Wheel delta → zoom factor sensitivity.
const WHEEL_ZOOM_RATE: f64 = 0.0012;

/// Viewport transform state.
#[derive(Debug, Clone)]
pub struct ViewTransform {
    viewport: Vector2<f64>,
    bounds: FieldBounds,
    field_bounds: FieldBounds,
    square: bool,
    zoom: f64,
    zoom_min: f64,
    zoom_max: f64,
    pan: Vector2<f64>,
    pan_margin: f64,
    rotation: FieldRotation,

    // Derived by compute()
    base_scale: f64,
    base_offset: Vector2<f64>,
    scale: f64,
    offset: Vector2<f64>,
}

impl ViewTransform {
    /// Creates a transform fitted to a `width` x `height` viewport.
    pub fn new(config: &ViewConfig, width: f64, height: f64) -> Self {
        let mut view = Self {
            viewport: Vector2::new(width, height),
            bounds: config.bounds,
            field_bounds: config.bounds,
            square: config.square,
            zoom: 1.0,
            zoom_min: config.zoom_min,
            zoom_max: config.zoom_max,
            pan: Vector2::zeros(),
            pan_margin: config.pan_margin_px,
            rotation: FieldRotation::from_degrees(config.rotation_deg),
            base_scale: 1.0,
            base_offset: Vector2::zeros(),
            scale: 1.0,
            offset: Vector2::zeros(),
        };
        view.compute();
        view
    }

    /// Recomputes the derived scale and offset.
    fn compute(&mut self) {
        let (w, h) = (self.viewport.x, self.viewport.y);
        let pad = self.bounds.pad;
        self.base_scale = ((w - pad * 2.0) / self.bounds.width())
            .min((h - pad * 2.0) / self.bounds.height());

        let (vx, vy) = if self.square {
            let side = w.min(h);
            ((w - side) / 2.0, (h - side) / 2.0)
        } else {
            (0.0, 0.0)
        };

        self.base_offset = Vector2::new(
            vx + pad - self.bounds.min_x * self.base_scale,
            vy + pad + self.bounds.max_y * self.base_scale,
        );
        self.scale = self.base_scale * self.zoom;
        self.offset = self.base_offset * self.zoom + self.pan;
    }

    pub fn world_to_screen(&self, p: WorldPoint) -> ScreenPoint {
        let r = self.rotation.rotate(p.coords);
        Point2::new(self.offset.x + r.x * self.scale, self.offset.y - r.y * self.scale)
    }

    pub fn screen_to_world(&self, p: ScreenPoint) -> WorldPoint {
        let scale = if self.scale == 0.0 { 1.0 } else { self.scale };
        let r = Vector2::new((p.x - self.offset.x) / scale, (self.offset.y - p.y) / scale);
        Point2::from(self.rotation.unrotate(r))
    }

    /// Sets the zoom, keeping the world point under `cursor` fixed on screen.
    pub fn zoom_at(&mut self, cursor: ScreenPoint, zoom: f64) {
        let anchor = self.screen_to_world(cursor);
        self.zoom = zoom.clamp(self.zoom_min, self.zoom_max);

        let new_scale = self.base_scale * self.zoom;
        let base = self.base_offset * self.zoom;
        let r = self.rotation.rotate(anchor.coords);
        self.pan = Vector2::new(
            cursor.x - (r.x * new_scale + base.x),
            cursor.y - (base.y - r.y * new_scale),
        );
        self.compute();
        self.clamp_pan_to_margin();
    }

    /// Multiplies the zoom by `factor` around `cursor`.
    pub fn zoom_by(&mut self, cursor: ScreenPoint, factor: f64) {
        self.zoom_at(cursor, self.zoom * factor);
    }

    /// Mouse-wheel zoom: positive `delta_y` zooms out.
    pub fn wheel(&mut self, cursor: ScreenPoint, delta_y: f64) {
        self.zoom_by(cursor, (-delta_y * WHEEL_ZOOM_RATE).exp());
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.set_pan(self.pan + Vector2::new(dx, dy));
    }

    pub fn set_pan(&mut self, pan: Vector2<f64>) {
        self.pan = pan;
        self.compute();
        self.clamp_pan_to_margin();
    }

    /// Nudges pan so at least `pan_margin` pixels of the field stay visible
    /// on every edge. Returns whether pan changed.
    pub fn clamp_pan_to_margin(&mut self) -> bool {
        let w = if self.viewport.x > 0.0 { self.viewport.x } else { 1.0 };
        let h = if self.viewport.y > 0.0 { self.viewport.y } else { 1.0 };
        let margin = self.pan_margin;

        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for corner in self.bounds.corners() {
            let s = self.world_to_screen(corner);
            min_x = min_x.min(s.x);
            max_x = max_x.max(s.x);
            min_y = min_y.min(s.y);
            max_y = max_y.max(s.y);
        }

        let dx = if max_x < margin {
            margin - max_x
        } else if min_x > w - margin {
            (w - margin) - min_x
        } else {
            0.0
        };
        let dy = if max_y < margin {
            margin - max_y
        } else if min_y > h - margin {
            (h - margin) - min_y
        } else {
            0.0
        };

        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        self.pan += Vector2::new(dx, dy);
        self.compute();
        true
    }

    /// Sets the field rotation; non-quarter-turn angles become 0.
    pub fn set_rotation_deg(&mut self, deg: f64) {
        self.rotation = FieldRotation::from_degrees(deg);
        self.compute();
        self.clamp_pan_to_margin();
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport = Vector2::new(width, height);
        self.compute();
        self.clamp_pan_to_margin();
    }

    /// Frames the given points (plus margin) instead of the whole field.
    pub fn fit_to<I>(&mut self, points: I, margin: f64) -> bool
    where
        I: IntoIterator<Item = WorldPoint>,
    {
        match self.field_bounds.fitted_to(points, margin) {
            Some(bounds) => {
                self.bounds = bounds;
                self.compute();
                true
            }
            None => false,
        }
    }

    /// Back to the full field, zoom 1, no pan.
    pub fn reset_view(&mut self) {
        self.bounds = self.field_bounds;
        self.zoom = 1.0;
        self.pan = Vector2::zeros();
        self.compute();
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> Vector2<f64> {
        self.pan
    }

    pub fn rotation(&self) -> FieldRotation {
        self.rotation
    }

    /// Currently framed bounds (the field, or the fitted pose extents).
    pub fn bounds(&self) -> &FieldBounds {
        &self.bounds
    }

    /// The full playing field.
    pub fn field_bounds(&self) -> &FieldBounds {
        &self.field_bounds
    }

    pub fn viewport(&self) -> Vector2<f64> {
        self.viewport
    }
}

/// Pointer movement (|dx| + |dy|, px) that turns a press into a pan.
const PAN_THRESHOLD_PX: f64 = 3.0;

/// A press that becomes a pan once the pointer has clearly moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanDrag {
    start: ScreenPoint,
    pan_start: Vector2<f64>,
    active: bool,
}

impl PanDrag {
    pub fn begin(at: ScreenPoint, view: &ViewTransform) -> Self {
        Self {
            start: at,
            pan_start: view.pan(),
            active: false,
        }
    }

    /// True once the drag passed the threshold; a press that never does is
    /// a click.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Follows the pointer. Returns whether the view moved.
    pub fn update(&mut self, at: ScreenPoint, view: &mut ViewTransform) -> bool {
        let d = at - self.start;
        if !self.active {
            if d.x.abs() + d.y.abs() <= PAN_THRESHOLD_PX {
                return false;
            }
            self.active = true;
        }
        view.set_pan(self.pan_start + d);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pan_drag_threshold() {
        let mut v = view(800.0, 600.0);
        let mut drag = PanDrag::begin(Point2::new(100.0, 100.0), &v);
        assert!(!drag.update(Point2::new(102.0, 101.0), &mut v));
        assert!(!drag.is_active());
        assert!(drag.update(Point2::new(110.0, 100.0), &mut v));
        assert_relative_eq!(v.pan().x, 10.0);
        // once active, small moves still track
        assert!(drag.update(Point2::new(101.0, 100.0), &mut v));
        assert_relative_eq!(v.pan().x, 1.0);
    }

    fn view(w: f64, h: f64) -> ViewTransform {
        ViewTransform::new(&ViewConfig::default(), w, h)
    }

    #[test]
    fn test_field_fits_viewport() {
        let v = view(804.0, 804.0);
        // (804 - 60) / 144
        assert_relative_eq!(v.scale(), 744.0 / 144.0);
        let top_left = v.world_to_screen(Point2::new(-72.0, 72.0));
        assert_relative_eq!(top_left.x, 30.0, epsilon = 1e-9);
        assert_relative_eq!(top_left.y, 30.0, epsilon = 1e-9);
        let bottom_right = v.world_to_screen(Point2::new(72.0, -72.0));
        assert_relative_eq!(bottom_right.x, 774.0, epsilon = 1e-9);
        assert_relative_eq!(bottom_right.y, 774.0, epsilon = 1e-9);
    }

    #[test]
    fn test_square_mode_centres_field() {
        let v = view(1000.0, 600.0);
        let centre = v.world_to_screen(Point2::new(0.0, 0.0));
        assert_relative_eq!(centre.y, 300.0, epsilon = 1e-9);
        assert!(centre.x > 0.0);
    }

    #[test]
    fn test_round_trip_all_rotations() {
        let mut v = view(640.0, 480.0);
        for deg in [0.0, 90.0, 180.0, 270.0] {
            v.set_rotation_deg(deg);
            let p = Point2::new(12.5, -30.25);
            let back = v.screen_to_world(v.world_to_screen(p));
            assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_screen_y_is_flipped() {
        let v = view(500.0, 500.0);
        let low = v.world_to_screen(Point2::new(0.0, -10.0));
        let high = v.world_to_screen(Point2::new(0.0, 10.0));
        assert!(high.y < low.y);
    }

    #[test]
    fn test_rotation_is_quantized() {
        let mut v = view(500.0, 500.0);
        v.set_rotation_deg(45.0);
        assert_eq!(v.rotation(), FieldRotation::Deg0);
        v.set_rotation_deg(-90.0);
        assert_eq!(v.rotation(), FieldRotation::Deg270);
    }

    #[test]
    fn test_zoom_to_cursor_keeps_anchor() {
        let mut v = view(800.0, 600.0);
        v.set_rotation_deg(90.0);
        let cursor = Point2::new(420.0, 250.0);
        let before = v.screen_to_world(cursor);

        v.zoom_by(cursor, 2.0);
        assert_relative_eq!(v.zoom(), 2.0);
        let after = v.world_to_screen(before);
        assert_relative_eq!(after.x, cursor.x, epsilon = 1e-9);
        assert_relative_eq!(after.y, cursor.y, epsilon = 1e-9);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut v = view(800.0, 600.0);
        v.zoom_by(Point2::new(400.0, 300.0), 1000.0);
        assert_relative_eq!(v.zoom(), 12.0);
        v.zoom_by(Point2::new(400.0, 300.0), 0.0001);
        assert_relative_eq!(v.zoom(), 0.35);
    }

    #[test]
    fn test_wheel_direction() {
        let mut v = view(800.0, 600.0);
        v.wheel(Point2::new(400.0, 300.0), -100.0);
        assert!(v.zoom() > 1.0);
    }

    #[test]
    fn test_pan_margin_keeps_field_visible() {
        let mut v = view(800.0, 600.0);
        v.pan_by(-10_000.0, 10_000.0);

        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        for corner in v.bounds().corners() {
            let s = v.world_to_screen(corner);
            max_x = max_x.max(s.x);
            min_y = min_y.min(s.y);
        }
        assert_relative_eq!(max_x, 15.0, epsilon = 1e-9);
        assert_relative_eq!(min_y, 600.0 - 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_small_pan_untouched() {
        let mut v = view(800.0, 600.0);
        v.pan_by(20.0, -10.0);
        assert_relative_eq!(v.pan().x, 20.0);
        assert_relative_eq!(v.pan().y, -10.0);
    }

    #[test]
    fn test_fit_and_reset() {
        let mut v = view(800.0, 800.0);
        let full_scale = v.scale();
        assert!(v.fit_to(vec![Point2::new(0.0, 0.0), Point2::new(10.0, 10.0)], 6.0));
        assert!(v.scale() > full_scale);
        assert_relative_eq!(v.bounds().min_x, -6.0);
        v.reset_view();
        assert_relative_eq!(v.scale(), full_scale);
        assert!(!v.fit_to(Vec::new(), 6.0));
    }
}
