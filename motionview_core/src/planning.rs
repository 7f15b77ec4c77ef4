//! The planned path: an editable waypoint polyline with selection,
//! snapshot undo/redo and arc-length sampling.
//!
//! Headings follow the on-screen compass convention: 0° points up the
//! screen and angles grow clockwise. A stored heading is relative to the
//! unrotated field; the displayed heading adds the field rotation.

use crate::config::PlanConfig;
use crate::geometry::{
    lerp_deg, normalize_deg, snap_to_step, FieldBounds, FieldRotation, ScreenPoint, ScreenRect,
    WorldPoint,
};
use crate::plan_history::{PlanSnapshot, UndoHistory};
use crate::record;
use crate::view_transform::ViewTransform;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Segments shorter than this are skipped by arc-length sampling.
const MIN_SEGMENT_IN: f64 = 1e-4;

/// One untimed point of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub theta: f64,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Lenient parse: non-numeric coordinates become 0.
    pub fn from_record(value: &Value) -> Option<Waypoint> {
        let obj = value.as_object()?;
        Some(Waypoint {
            x: record::number_field(obj, &["x"]).unwrap_or(0.0),
            y: record::number_field(obj, &["y"]).unwrap_or(0.0),
            theta: record::number_field(obj, &["theta"]).unwrap_or(0.0),
        })
    }

    pub fn position(&self) -> WorldPoint {
        Point2::new(self.x, self.y)
    }
}

/// A point on the plan at some arc length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanSample {
    pub x: f64,
    pub y: f64,
    /// Display heading (stored heading plus field rotation), `[0, 360)`
    pub theta: f64,
}

/// Which numeric field of the primary waypoint an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointField {
    X,
    Y,
    Theta,
}

/// State captured when a heading drag begins.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingDrag {
    /// Waypoint whose handle was grabbed
    pub index: usize,
    /// Its stored heading at grab time
    pub start_theta: f64,
    /// Every selected waypoint with its heading at grab time
    pub base: Vec<(usize, f64)>,
}

/// Screen-space compass angle from `center` to `pointer`, in degrees.
///
/// `None` when the two points coincide.
pub fn screen_angle(center: ScreenPoint, pointer: ScreenPoint) -> Option<f64> {
    let dx = pointer.x - center.x;
    let dy = pointer.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(dx.atan2(-dy).to_degrees())
}

/// The planning document.
#[derive(Debug, Clone)]
pub struct PlanningDocument {
    waypoints: Vec<Waypoint>,
    /// Selected indices in selection order; no duplicates
    selected: Vec<usize>,
    playback_distance: f64,
    history: UndoHistory,
    /// Set while a snapshot is being restored
    applying: bool,
    bounds: FieldBounds,
    rotation: FieldRotation,
    snap_step: f64,
    theta_snap_step: f64,
}

impl PlanningDocument {
    pub fn new(config: &PlanConfig, bounds: FieldBounds) -> Self {
        Self {
            waypoints: Vec::new(),
            selected: Vec::new(),
            playback_distance: 0.0,
            history: UndoHistory::new(config.undo_depth),
            applying: false,
            bounds,
            rotation: FieldRotation::Deg0,
            snap_step: config.snap_step_in,
            theta_snap_step: config.theta_snap_step_deg,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    /// The distinguished selection: the first selected index.
    pub fn primary(&self) -> Option<usize> {
        self.selected.first().copied()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn rotation(&self) -> FieldRotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: FieldRotation) {
        self.rotation = rotation;
    }

    pub fn set_snap_steps(&mut self, coord_step: f64, theta_step: f64) {
        self.snap_step = coord_step;
        self.theta_snap_step = theta_step;
    }

    pub fn playback_distance(&self) -> f64 {
        self.playback_distance
    }

    /// Sets the playback position, clamped to `[0, total_length]`.
    pub fn set_playback_distance(&mut self, distance: f64) {
        let d = if distance.is_finite() { distance } else { 0.0 };
        self.playback_distance = d.clamp(0.0, self.total_length());
    }

    /// Stored heading plus field rotation.
    pub fn display_heading(&self, index: usize) -> f64 {
        self.waypoints
            .get(index)
            .map_or(0.0, |p| normalize_deg(p.theta + self.rotation.degrees()))
    }

    // =========================================================================
    // SNAP / CLAMP
    // =========================================================================

    /// Grid-snaps each coordinate, then clamps into the field.
    pub fn snap_point(&self, p: WorldPoint) -> WorldPoint {
        self.bounds.clamp(Point2::new(
            snap_to_step(p.x, self.snap_step),
            snap_to_step(p.y, self.snap_step),
        ))
    }

    /// Angular-snaps a heading and normalizes it.
    pub fn snap_theta(&self, theta: f64) -> f64 {
        normalize_deg(snap_to_step(theta, self.theta_snap_step))
    }

    // =========================================================================
    // UNDO / REDO
    // =========================================================================

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            waypoints: self.waypoints.clone(),
            selected: self.selected.clone(),
            primary: self.primary(),
            playback_distance: self.playback_distance,
        }
    }

    /// Records the current state before a gesture's first mutation.
    ///
    /// No-op while a snapshot is being applied. Returns whether an entry
    /// was recorded.
    pub fn checkpoint(&mut self) -> bool {
        if self.applying {
            return false;
        }
        let snapshot = self.snapshot();
        self.history.push(snapshot)
    }

    fn apply(&mut self, snapshot: PlanSnapshot) {
        self.applying = true;
        self.waypoints = snapshot.waypoints;
        self.set_selection(snapshot.selected);
        self.set_playback_distance(snapshot.playback_distance);
        self.applying = false;
    }

    /// Restores the previous state. Returns false on underflow.
    pub fn undo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.apply(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.apply(next);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    /// Replaces the selection; out-of-range and repeated indices are dropped.
    pub fn set_selection<I: IntoIterator<Item = usize>>(&mut self, indices: I) {
        self.selected.clear();
        for i in indices {
            if i < self.waypoints.len() && !self.selected.contains(&i) {
                self.selected.push(i);
            }
        }
    }

    pub fn select_single(&mut self, index: usize) {
        self.set_selection([index]);
    }

    pub fn select_all(&mut self) {
        self.set_selection(0..self.waypoints.len());
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Selects every waypoint whose projection lies inside `rect`.
    pub fn select_in_rect(&mut self, rect: &ScreenRect, view: &ViewTransform) {
        let picked: Vec<usize> = self
            .waypoints
            .iter()
            .enumerate()
            .filter(|(_, p)| rect.contains(view.world_to_screen(p.position())))
            .map(|(i, _)| i)
            .collect();
        self.set_selection(picked);
    }

    // =========================================================================
    // HIT TESTING
    // =========================================================================

    /// Closest waypoint within `radius_px` of the screen point.
    pub fn hit_test(&self, screen: ScreenPoint, view: &ViewTransform, radius_px: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.waypoints.iter().enumerate() {
            let d2 = (view.world_to_screen(p.position()) - screen).norm_squared();
            if best.map_or(true, |(_, b)| d2 < b) {
                best = Some((i, d2));
            }
        }
        best.filter(|&(_, d2)| d2 <= radius_px * radius_px).map(|(i, _)| i)
    }

    /// Screen position of a waypoint's heading handle.
    pub fn handle_position(&self, index: usize, view: &ViewTransform, distance_px: f64) -> Option<ScreenPoint> {
        let p = self.waypoints.get(index)?;
        let centre = view.world_to_screen(p.position());
        let theta = self.display_heading(index).to_radians();
        Some(centre + Vector2::new(theta.sin(), -theta.cos()) * distance_px)
    }

    /// First selected waypoint whose heading handle is under the pointer.
    pub fn handle_hit(
        &self,
        screen: ScreenPoint,
        view: &ViewTransform,
        distance_px: f64,
        radius_px: f64,
    ) -> Option<usize> {
        self.selected.iter().copied().find(|&i| {
            self.handle_position(i, view, distance_px)
                .is_some_and(|h| (h - screen).norm_squared() <= radius_px * radius_px)
        })
    }

    // =========================================================================
    // EDITING
    // =========================================================================
    //
    // Discrete edits record their own checkpoint. Continuous drags do not:
    // the gesture records one when it starts.

    /// Appends a snapped, clamped waypoint and selects it alone.
    pub fn add_waypoint(&mut self, at: WorldPoint, theta: f64) -> usize {
        self.checkpoint();
        let p = self.snap_point(at);
        self.waypoints.push(Waypoint::new(p.x, p.y, normalize_deg(theta)));
        let index = self.waypoints.len() - 1;
        self.select_single(index);
        self.set_playback_distance(self.playback_distance);
        index
    }

    /// Moves the selection by a screen-oriented delta in inches.
    ///
    /// The delta is rotated back into field coordinates so that a given
    /// on-screen direction moves waypoints the same way at every rotation.
    pub fn move_selected(&mut self, dx: f64, dy: f64) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        self.checkpoint();
        let delta = self.rotation.unrotate(Vector2::new(dx, dy));
        for i in self.selected.clone() {
            let p = self.waypoints[i].position() + delta;
            let snapped = self.snap_point(p);
            self.waypoints[i].x = snapped.x;
            self.waypoints[i].y = snapped.y;
        }
        self.set_playback_distance(self.playback_distance);
        true
    }

    /// Original positions of the selection, for a drag.
    pub fn selection_origins(&self) -> Vec<(usize, WorldPoint)> {
        self.selected
            .iter()
            .map(|&i| (i, self.waypoints[i].position()))
            .collect()
    }

    /// Places each dragged waypoint at its origin plus a world-space delta.
    pub fn drag_to(&mut self, origins: &[(usize, WorldPoint)], delta: Vector2<f64>) {
        for &(i, origin) in origins {
            let snapped = self.snap_point(origin + delta);
            if let Some(p) = self.waypoints.get_mut(i) {
                p.x = snapped.x;
                p.y = snapped.y;
            }
        }
        self.set_playback_distance(self.playback_distance);
    }

    /// Captures the selection's headings for a handle drag on `index`.
    pub fn begin_heading_drag(&self, index: usize) -> Option<HeadingDrag> {
        let start_theta = normalize_deg(self.waypoints.get(index)?.theta);
        let mut base: Vec<(usize, f64)> = self
            .selected
            .iter()
            .map(|&i| (i, normalize_deg(self.waypoints[i].theta)))
            .collect();
        if !base.iter().any(|&(i, _)| i == index) {
            base.push((index, start_theta));
        }
        Some(HeadingDrag { index, start_theta, base })
    }

    /// Turns the dragged waypoints toward a screen angle.
    ///
    /// The grabbed waypoint takes the pointed-at heading; every other
    /// waypoint in the drag turns by the same delta, keeping relative
    /// orientation.
    pub fn drag_heading(&mut self, drag: &HeadingDrag, screen_angle_deg: f64) {
        let theta_plan = normalize_deg(screen_angle_deg - self.rotation.degrees());
        let delta = normalize_deg(theta_plan - drag.start_theta);
        for &(i, base) in &drag.base {
            let next = self.snap_theta(normalize_deg(base + delta));
            if let Some(p) = self.waypoints.get_mut(i) {
                p.theta = next;
            }
        }
    }

    /// Removes every selected waypoint and clears the selection.
    pub fn delete_selected(&mut self) -> usize {
        if self.selected.is_empty() {
            return 0;
        }
        self.checkpoint();
        let mut doomed = self.selected.clone();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        let mut removed = 0;
        for i in doomed {
            if i < self.waypoints.len() {
                self.waypoints.remove(i);
                removed += 1;
            }
        }
        self.selected.clear();
        self.set_playback_distance(self.playback_distance);
        removed
    }

    /// Sets one numeric field of the primary waypoint.
    ///
    /// Coordinates are snapped and clamped; headings are normalized only.
    pub fn edit_primary(&mut self, field: WaypointField, value: f64) -> bool {
        let Some(index) = self.primary() else {
            return false;
        };
        if !value.is_finite() || index >= self.waypoints.len() {
            return false;
        }
        self.checkpoint();
        let current = self.waypoints[index];
        match field {
            WaypointField::X => {
                self.waypoints[index].x = self.snap_point(Point2::new(value, current.y)).x;
            }
            WaypointField::Y => {
                self.waypoints[index].y = self.snap_point(Point2::new(current.x, value)).y;
            }
            WaypointField::Theta => self.waypoints[index].theta = normalize_deg(value),
        }
        self.set_playback_distance(self.playback_distance);
        true
    }

    /// Removes every waypoint (undoable).
    pub fn clear(&mut self) -> bool {
        if self.waypoints.is_empty() {
            return false;
        }
        self.checkpoint();
        self.waypoints.clear();
        self.selected.clear();
        self.playback_distance = 0.0;
        true
    }

    /// Replaces the whole plan, e.g. from a saved document. Drops history.
    pub fn replace(&mut self, waypoints: Vec<Waypoint>) {
        self.waypoints = waypoints
            .into_iter()
            .map(|p| Waypoint::new(p.x, p.y, normalize_deg(p.theta)))
            .collect();
        self.selected.clear();
        self.playback_distance = 0.0;
        self.history.clear();
    }

    // =========================================================================
    // ARC LENGTH
    // =========================================================================

    /// Sum of segment lengths.
    pub fn total_length(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| (w[1].position() - w[0].position()).norm())
            .filter(|&seg| seg > MIN_SEGMENT_IN)
            .sum()
    }

    /// Position and display heading at arc length `distance`.
    ///
    /// Distances past either end clamp to the end waypoints. A single
    /// waypoint yields itself for every distance.
    pub fn sample_at_distance(&self, distance: f64) -> Option<PlanSample> {
        let rot = self.rotation.degrees();
        let display = |p: &Waypoint, theta: f64| PlanSample {
            x: p.x,
            y: p.y,
            theta: normalize_deg(theta + rot),
        };

        let first = self.waypoints.first()?;
        if self.waypoints.len() == 1 {
            return Some(display(first, first.theta));
        }

        let mut remaining = distance.max(0.0);
        for w in self.waypoints.windows(2) {
            let (a, b) = (&w[0], &w[1]);
            let seg = (b.position() - a.position()).norm();
            if seg <= MIN_SEGMENT_IN {
                continue;
            }
            if remaining <= seg {
                let t = (remaining / seg).clamp(0.0, 1.0);
                let pos = a.position() + (b.position() - a.position()) * t;
                let theta = lerp_deg(normalize_deg(a.theta), normalize_deg(b.theta), t);
                return Some(PlanSample {
                    x: pos.x,
                    y: pos.y,
                    theta: normalize_deg(theta + rot),
                });
            }
            remaining -= seg;
        }

        let last = self.waypoints.last()?;
        Some(display(last, last.theta))
    }

    /// Sample at the current playback position.
    pub fn current_sample(&self) -> Option<PlanSample> {
        self.sample_at_distance(self.playback_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use approx::assert_relative_eq;

    fn doc() -> PlanningDocument {
        PlanningDocument::new(&PlanConfig::default(), FieldBounds::default())
    }

    fn doc_with(points: &[(f64, f64, f64)]) -> PlanningDocument {
        let mut d = doc();
        d.replace(points.iter().map(|&(x, y, t)| Waypoint::new(x, y, t)).collect());
        d
    }

    #[test]
    fn test_total_length_and_sampling() {
        let d = doc_with(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0)]);
        assert_relative_eq!(d.total_length(), 20.0);

        let s = d.sample_at_distance(15.0).unwrap();
        assert_relative_eq!(s.x, 10.0);
        assert_relative_eq!(s.y, 5.0);

        let start = d.sample_at_distance(0.0).unwrap();
        assert_eq!((start.x, start.y), (0.0, 0.0));
        let end = d.sample_at_distance(20.0).unwrap();
        assert_eq!((end.x, end.y), (10.0, 10.0));
        let past = d.sample_at_distance(500.0).unwrap();
        assert_eq!((past.x, past.y), (10.0, 10.0));
    }

    #[test]
    fn test_sampling_continuous_at_joint() {
        let d = doc_with(&[(0.0, 0.0, 0.0), (10.0, 0.0, 90.0), (10.0, 10.0, 180.0)]);
        let before = d.sample_at_distance(10.0 - 1e-9).unwrap();
        let after = d.sample_at_distance(10.0 + 1e-9).unwrap();
        assert_relative_eq!(before.x, after.x, epsilon = 1e-6);
        assert_relative_eq!(before.y, after.y, epsilon = 1e-6);
        assert_relative_eq!(before.theta, after.theta, epsilon = 1e-6);
    }

    #[test]
    fn test_heading_interpolation_shortest_arc() {
        let d = doc_with(&[(0.0, 0.0, 350.0), (10.0, 0.0, 10.0)]);
        let mid = d.sample_at_distance(5.0).unwrap();
        assert_relative_eq!(mid.theta, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_length_segments_skipped() {
        let d = doc_with(&[(0.0, 0.0, 0.0), (0.0, 0.0, 45.0), (4.0, 0.0, 90.0)]);
        assert_relative_eq!(d.total_length(), 4.0);
        let s = d.sample_at_distance(2.0).unwrap();
        assert_relative_eq!(s.x, 2.0);
        assert_relative_eq!(s.theta, 67.5);
    }

    #[test]
    fn test_single_waypoint_uses_same_heading_convention() {
        let mut d = doc_with(&[(3.0, 4.0, 30.0)]);
        d.set_rotation(FieldRotation::Deg90);
        for dist in [0.0, 7.0, -2.0] {
            let s = d.sample_at_distance(dist).unwrap();
            assert_eq!((s.x, s.y), (3.0, 4.0));
            assert_relative_eq!(s.theta, 120.0);
        }
        assert!(doc().sample_at_distance(0.0).is_none());
    }

    #[test]
    fn test_add_snaps_and_clamps() {
        let mut d = doc();
        d.set_snap_steps(1.0, 0.0);
        let i = d.add_waypoint(Point2::new(100.0, 3.4), 0.0);
        assert_eq!(d.get(i), Some(&Waypoint::new(72.0, 3.0, 0.0)));
        assert_eq!(d.selected(), &[i]);
        assert!(d.can_undo());
    }

    #[test]
    fn test_move_selected_is_rotation_aware() {
        let config = ViewConfig::default();
        let mut view = ViewTransform::new(&config, 800.0, 800.0);
        view.set_rotation_deg(90.0);

        let mut d = doc_with(&[(0.0, 0.0, 0.0)]);
        d.set_rotation(FieldRotation::Deg90);
        d.select_single(0);
        let before = view.world_to_screen(d.get(0).unwrap().position());
        d.move_selected(1.0, 0.0);
        let after = view.world_to_screen(d.get(0).unwrap().position());

        assert!(after.x > before.x);
        assert_relative_eq!(after.y, before.y, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_drag_applies_delta_to_selection() {
        let mut d = doc_with(&[(0.0, 0.0, 10.0), (5.0, 0.0, 100.0)]);
        d.select_all();
        let drag = d.begin_heading_drag(0).unwrap();
        // pointer straight right of the grabbed waypoint: 90°
        d.drag_heading(&drag, 90.0);
        assert_relative_eq!(d.get(0).unwrap().theta, 90.0);
        assert_relative_eq!(d.get(1).unwrap().theta, 180.0);
    }

    #[test]
    fn test_heading_drag_respects_rotation_and_snap() {
        let mut d = doc_with(&[(0.0, 0.0, 0.0)]);
        d.set_rotation(FieldRotation::Deg90);
        d.set_snap_steps(0.0, 15.0);
        d.select_single(0);
        let drag = d.begin_heading_drag(0).unwrap();
        d.drag_heading(&drag, 97.0);
        assert_relative_eq!(d.get(0).unwrap().theta, 0.0);
        d.drag_heading(&drag, 50.0);
        assert_relative_eq!(d.get(0).unwrap().theta, 315.0);
    }

    #[test]
    fn test_screen_angle_compass() {
        let c = Point2::new(100.0, 100.0);
        assert_relative_eq!(screen_angle(c, Point2::new(100.0, 50.0)).unwrap(), 0.0);
        assert_relative_eq!(screen_angle(c, Point2::new(150.0, 100.0)).unwrap(), 90.0);
        assert!(screen_angle(c, c).is_none());
    }

    #[test]
    fn test_delete_descending_keeps_indices_valid() {
        let mut d = doc_with(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (2.0, 0.0, 0.0), (3.0, 0.0, 0.0)]);
        d.set_selection([1, 3]);
        assert_eq!(d.delete_selected(), 2);
        assert_eq!(d.waypoints(), &[Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(2.0, 0.0, 0.0)]);
        assert!(d.selected().is_empty());
    }

    #[test]
    fn test_undo_redo_restores_structurally_equal_state() {
        let mut d = doc();
        d.add_waypoint(Point2::new(0.0, 0.0), 0.0);
        d.add_waypoint(Point2::new(10.0, 0.0), 0.0);
        d.set_playback_distance(4.0);
        let before = d.snapshot();

        d.delete_selected();
        let after = d.snapshot();
        assert!(d.undo());
        assert_eq!(d.snapshot(), before);
        assert!(d.redo());
        assert_eq!(d.snapshot(), after);
    }

    #[test]
    fn test_restore_clamps_playback_distance() {
        let mut d = doc_with(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0)]);
        d.set_playback_distance(20.0);
        d.select_single(2);
        d.delete_selected();
        assert_relative_eq!(d.playback_distance(), 10.0);
        d.undo();
        assert_relative_eq!(d.playback_distance(), 20.0);
    }

    #[test]
    fn test_checkpoint_dedup() {
        let mut d = doc_with(&[(0.0, 0.0, 0.0)]);
        assert!(d.checkpoint());
        assert!(!d.checkpoint());
        assert_eq!(d.history().undo_len(), 1);
    }

    #[test]
    fn test_checkpoint_ignored_while_applying() {
        let mut d = doc_with(&[(0.0, 0.0, 0.0)]);
        d.applying = true;
        assert!(!d.checkpoint());
        assert_eq!(d.history().undo_len(), 0);
        d.applying = false;

        d.select_single(0);
        d.delete_selected();
        assert!(d.undo());
        assert!(!d.applying);
        assert_eq!(d.history().undo_len(), 0);
        assert_eq!(d.history().redo_len(), 1);

        // Restoring left the guard down: the next gesture records normally
        d.add_waypoint(Point2::new(5.0, 5.0), 0.0);
        assert_eq!(d.history().undo_len(), 1);
        assert_eq!(d.history().redo_len(), 0);
    }

    #[test]
    fn test_edit_primary() {
        let mut d = doc_with(&[(0.0, 0.0, 0.0), (1.0, 1.0, 0.0)]);
        assert!(!d.edit_primary(WaypointField::X, 5.0));
        d.set_selection([1, 0]);
        assert!(d.edit_primary(WaypointField::X, 500.0));
        assert!(d.edit_primary(WaypointField::Theta, -90.0));
        assert_eq!(d.get(1), Some(&Waypoint::new(72.0, 1.0, 270.0)));
        assert!(!d.edit_primary(WaypointField::Y, f64::NAN));
    }

    #[test]
    fn test_hit_test_and_rect_select() {
        let view = ViewTransform::new(&ViewConfig::default(), 804.0, 804.0);
        let mut d = doc_with(&[(0.0, 0.0, 0.0), (20.0, 20.0, 0.0), (-40.0, 0.0, 0.0)]);
        let centre = view.world_to_screen(Point2::new(0.0, 0.0));

        assert_eq!(d.hit_test(centre + Vector2::new(5.0, 5.0), &view, 12.0), Some(0));
        assert_eq!(d.hit_test(centre + Vector2::new(13.0, 0.0), &view, 12.0), None);

        let far = view.world_to_screen(Point2::new(25.0, 25.0));
        d.select_in_rect(&ScreenRect::from_corners(far, centre), &view);
        assert_eq!(d.selected(), &[0, 1]);
    }

    #[test]
    fn test_handle_hit_only_for_selected() {
        let view = ViewTransform::new(&ViewConfig::default(), 804.0, 804.0);
        let mut d = doc_with(&[(0.0, 0.0, 90.0)]);
        let centre = view.world_to_screen(Point2::new(0.0, 0.0));
        let handle = centre + Vector2::new(36.0, 0.0);

        assert_eq!(d.handle_hit(handle, &view, 36.0, 6.0), None);
        d.select_single(0);
        assert_eq!(d.handle_hit(handle, &view, 36.0, 6.0), Some(0));
    }

    #[test]
    fn test_waypoint_from_record_is_lenient() {
        let w = Waypoint::from_record(&serde_json::json!({ "x": "3", "y": null })).unwrap();
        assert_eq!(w, Waypoint::new(3.0, 0.0, 0.0));
    }
}
