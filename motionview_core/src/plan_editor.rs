//! Presentation-free input handling for the planning document.
//!
//! The host translates its pointer and keyboard events into [`PlanIntent`]s.
//! The editor turns them into document edits through a small gesture state
//! machine:
//!
//! ```text
//!                 PointerDown(primary)
//!   Idle ───────────────┬───────────────┬──────────────┬──────────────┐
//!    ▲        handle hit│   outside field│  waypoint/new │  secondary   │
//!    │                  ▼               ▼              ▼              ▼
//!    │            HeadingDrag         Panning       Dragging      RectSelect
//!    └──────────────────────────── PointerUp ─────────────────────────┘
//! ```
//!
//! Every gesture that mutates records exactly one undo checkpoint before its
//! first change.

use crate::config::PlanConfig;
use crate::geometry::{ScreenPoint, ScreenRect, WorldPoint};
use crate::planning::{screen_angle, HeadingDrag, PlanningDocument, WaypointField};
use crate::playback::PlanPlayback;
use crate::view_transform::{PanDrag, ViewTransform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Keyboard commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanKey {
    Delete,
    Undo,
    Redo,
    /// Screen-direction nudge; `dx`/`dy` are -1, 0 or 1 (+y is up)
    Nudge { dx: f64, dy: f64, coarse: bool },
    TogglePlayback,
    SelectAll,
    ClearSelection,
}

/// Planning-mode user intents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanIntent {
    PointerDown { at: ScreenPoint, button: PointerButton },
    PointerMove { at: ScreenPoint },
    PointerUp { at: ScreenPoint },
    Key(PlanKey),
    EditField { field: WaypointField, value: f64 },
    Clear,
}

/// What an intent did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct PlanOutcome {
    /// The document changed and should be persisted
    pub changed: bool,
    /// Something visible changed
    pub redraw: bool,
}

impl PlanOutcome {
    fn changed() -> Self {
        Self { changed: true, redraw: true }
    }

    fn redraw() -> Self {
        Self { changed: false, redraw: true }
    }

    fn from_change(changed: bool) -> Self {
        Self { changed, redraw: changed }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Idle,
    Dragging {
        start: WorldPoint,
        origins: Vec<(usize, WorldPoint)>,
    },
    Heading(HeadingDrag),
    RectSelect {
        anchor: ScreenPoint,
        current: ScreenPoint,
    },
    Panning(PanDrag),
}

/// Planning document plus its editing and playback state.
#[derive(Debug, Clone)]
pub struct PlanEditor {
    doc: PlanningDocument,
    playback: PlanPlayback,
    gesture: Gesture,
    config: PlanConfig,
}

impl PlanEditor {
    pub fn new(doc: PlanningDocument, playback: PlanPlayback, config: PlanConfig) -> Self {
        Self {
            doc,
            playback,
            gesture: Gesture::Idle,
            config,
        }
    }

    pub fn document(&self) -> &PlanningDocument {
        &self.doc
    }

    /// Direct access for loads and settings changes; bypasses gestures.
    pub fn document_mut(&mut self) -> &mut PlanningDocument {
        &mut self.doc
    }

    pub fn playback(&self) -> &PlanPlayback {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlanPlayback {
        &mut self.playback
    }

    pub fn is_idle(&self) -> bool {
        self.gesture == Gesture::Idle
    }

    /// The rubber-band rectangle while a secondary-button drag is active.
    pub fn selection_rect(&self) -> Option<ScreenRect> {
        match &self.gesture {
            Gesture::RectSelect { anchor, current } => Some(ScreenRect::from_corners(*anchor, *current)),
            _ => None,
        }
    }

    /// Drops any in-progress gesture without further edits.
    pub fn cancel_gesture(&mut self) {
        self.gesture = Gesture::Idle;
    }

    /// Advances plan playback by one frame.
    pub fn tick(&mut self, dt_ms: f64) -> bool {
        self.playback.tick(dt_ms, &mut self.doc)
    }

    pub fn handle(&mut self, intent: PlanIntent, view: &mut ViewTransform) -> PlanOutcome {
        match intent {
            PlanIntent::PointerDown { at, button } => self.pointer_down(at, button, view),
            PlanIntent::PointerMove { at } => self.pointer_move(at, view),
            PlanIntent::PointerUp { .. } => self.pointer_up(view),
            PlanIntent::Key(key) => self.key(key),
            PlanIntent::EditField { field, value } => {
                PlanOutcome::from_change(self.doc.edit_primary(field, value))
            }
            PlanIntent::Clear => {
                self.playback.pause();
                PlanOutcome::from_change(self.doc.clear())
            }
        }
    }

    fn pointer_down(&mut self, at: ScreenPoint, button: PointerButton, view: &mut ViewTransform) -> PlanOutcome {
        if button == PointerButton::Secondary {
            self.gesture = Gesture::RectSelect { anchor: at, current: at };
            return PlanOutcome::redraw();
        }

        let handle = self.doc.handle_hit(
            at,
            view,
            self.config.heading_handle_px,
            self.config.heading_handle_radius_px,
        );
        if let Some(index) = handle {
            if let Some(drag) = self.doc.begin_heading_drag(index) {
                self.doc.checkpoint();
                self.turn_toward(&drag, at, view);
                self.gesture = Gesture::Heading(drag);
                return PlanOutcome::changed();
            }
        }

        let world = view.screen_to_world(at);
        if !view.field_bounds().contains(world) {
            self.gesture = Gesture::Panning(PanDrag::begin(at, view));
            return PlanOutcome::default();
        }

        match self.doc.hit_test(at, view, self.config.hit_radius_px) {
            Some(index) => {
                self.doc.checkpoint();
                if !self.doc.is_selected(index) {
                    self.doc.select_single(index);
                }
            }
            None if self.doc.selected().len() > 1 => {
                self.doc.clear_selection();
                return PlanOutcome::changed();
            }
            None => {
                self.doc.add_waypoint(world, 0.0);
            }
        }

        self.gesture = Gesture::Dragging {
            start: world,
            origins: self.doc.selection_origins(),
        };
        PlanOutcome::changed()
    }

    fn pointer_move(&mut self, at: ScreenPoint, view: &mut ViewTransform) -> PlanOutcome {
        match &mut self.gesture {
            Gesture::Idle => PlanOutcome::default(),
            Gesture::Dragging { start, origins } => {
                let delta = view.screen_to_world(at) - *start;
                self.doc.drag_to(origins, delta);
                PlanOutcome::redraw()
            }
            Gesture::Heading(drag) => {
                let drag = drag.clone();
                self.turn_toward(&drag, at, view);
                PlanOutcome::redraw()
            }
            Gesture::RectSelect { current, .. } => {
                *current = at;
                PlanOutcome::redraw()
            }
            Gesture::Panning(pan) => PlanOutcome {
                changed: false,
                redraw: pan.update(at, view),
            },
        }
    }

    fn pointer_up(&mut self, view: &ViewTransform) -> PlanOutcome {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle | Gesture::Panning(_) => PlanOutcome::default(),
            Gesture::RectSelect { anchor, current } => {
                self.doc.select_in_rect(&ScreenRect::from_corners(anchor, current), view);
                PlanOutcome::changed()
            }
            Gesture::Dragging { .. } | Gesture::Heading(_) => PlanOutcome::changed(),
        }
    }

    fn turn_toward(&mut self, drag: &HeadingDrag, pointer: ScreenPoint, view: &ViewTransform) {
        let Some(p) = self.doc.get(drag.index) else {
            return;
        };
        let centre = view.world_to_screen(p.position());
        if let Some(angle) = screen_angle(centre, pointer) {
            self.doc.drag_heading(drag, angle);
        }
    }

    fn key(&mut self, key: PlanKey) -> PlanOutcome {
        match key {
            PlanKey::Delete => PlanOutcome::from_change(self.doc.delete_selected() > 0),
            PlanKey::Undo => {
                let restored = self.doc.undo();
                if restored {
                    self.playback.pause();
                }
                PlanOutcome::from_change(restored)
            }
            PlanKey::Redo => {
                let restored = self.doc.redo();
                if restored {
                    self.playback.pause();
                }
                PlanOutcome::from_change(restored)
            }
            PlanKey::Nudge { dx, dy, coarse } => {
                let mut step = self.config.move_step_in;
                if coarse {
                    step *= self.config.coarse_move_multiplier;
                }
                if dx == 0.0 && dy == 0.0 {
                    return PlanOutcome::default();
                }
                PlanOutcome::from_change(self.doc.move_selected(dx * step, dy * step))
            }
            PlanKey::TogglePlayback => {
                self.playback.toggle(&mut self.doc);
                PlanOutcome::redraw()
            }
            PlanKey::SelectAll => {
                self.doc.select_all();
                PlanOutcome::changed()
            }
            PlanKey::ClearSelection => {
                self.doc.clear_selection();
                PlanOutcome::changed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::geometry::FieldBounds;
    use crate::planning::Waypoint;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Vector2};

    fn setup() -> (PlanEditor, ViewTransform) {
        let config = PlanConfig::default();
        let doc = PlanningDocument::new(&config, FieldBounds::default());
        let editor = PlanEditor::new(doc, PlanPlayback::new(20.0, 1.0), config);
        let view = ViewTransform::new(&ViewConfig::default(), 804.0, 804.0);
        (editor, view)
    }

    fn click(editor: &mut PlanEditor, view: &mut ViewTransform, at: ScreenPoint) {
        let _ = editor.handle(PlanIntent::PointerDown { at, button: PointerButton::Primary }, view);
        let _ = editor.handle(PlanIntent::PointerUp { at }, view);
    }

    #[test]
    fn test_click_empty_adds_and_selects() {
        let (mut editor, mut view) = setup();
        let at = view.world_to_screen(Point2::new(10.0, 20.0));
        click(&mut editor, &mut view, at);

        let doc = editor.document();
        assert_eq!(doc.len(), 1);
        assert_relative_eq!(doc.get(0).unwrap().x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(doc.get(0).unwrap().y, 20.0, epsilon = 1e-9);
        assert_eq!(doc.selected(), &[0]);
        assert_eq!(doc.history().undo_len(), 1);
    }

    #[test]
    fn test_drag_moves_selection_as_one_undo_step() {
        let (mut editor, mut view) = setup();
        let a = view.world_to_screen(Point2::new(0.0, 0.0));
        click(&mut editor, &mut view, a);

        let _ = editor.handle(PlanIntent::PointerDown { at: a, button: PointerButton::Primary }, &mut view);
        for step in 1..=5 {
            let at = a + Vector2::new(step as f64 * 10.0, 0.0);
            let _ = editor.handle(PlanIntent::PointerMove { at }, &mut view);
        }
        let out = editor.handle(PlanIntent::PointerUp { at: a }, &mut view);
        assert!(out.changed);

        let moved = editor.document().get(0).unwrap().position();
        let expected = view.screen_to_world(a + Vector2::new(50.0, 0.0));
        assert_relative_eq!(moved.x, expected.x, epsilon = 1e-9);
        assert_eq!(editor.document().history().undo_len(), 2);

        let _ = editor.handle(PlanIntent::Key(PlanKey::Undo), &mut view);
        assert_relative_eq!(editor.document().get(0).unwrap().x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_click_empty_with_multi_selection_only_clears() {
        let (mut editor, mut view) = setup();
        editor
            .document_mut()
            .replace(vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(10.0, 0.0, 0.0)]);
        let _ = editor.handle(PlanIntent::Key(PlanKey::SelectAll), &mut view);

        let at = view.world_to_screen(Point2::new(-50.0, -50.0));
        click(&mut editor, &mut view, at);
        assert_eq!(editor.document().len(), 2);
        assert!(editor.document().selected().is_empty());
    }

    #[test]
    fn test_rect_select_with_secondary_button() {
        let (mut editor, mut view) = setup();
        editor.document_mut().replace(vec![
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(5.0, 5.0, 0.0),
            Waypoint::new(60.0, 60.0, 0.0),
        ]);
        let a = view.world_to_screen(Point2::new(-2.0, -2.0));
        let b = view.world_to_screen(Point2::new(8.0, 8.0));
        let _ = editor.handle(PlanIntent::PointerDown { at: a, button: PointerButton::Secondary }, &mut view);
        let _ = editor.handle(PlanIntent::PointerMove { at: b }, &mut view);
        assert!(editor.selection_rect().is_some());
        let _ = editor.handle(PlanIntent::PointerUp { at: b }, &mut view);
        assert_eq!(editor.document().selected(), &[0, 1]);
        assert!(editor.is_idle());
    }

    #[test]
    fn test_heading_handle_drag() {
        let (mut editor, mut view) = setup();
        editor.document_mut().replace(vec![Waypoint::new(0.0, 0.0, 0.0)]);
        editor.document_mut().select_single(0);

        let centre = view.world_to_screen(Point2::new(0.0, 0.0));
        let handle = centre + Vector2::new(0.0, -36.0);
        let _ = editor.handle(PlanIntent::PointerDown { at: handle, button: PointerButton::Primary }, &mut view);
        let _ = editor.handle(PlanIntent::PointerMove { at: centre + Vector2::new(50.0, 0.0) }, &mut view);
        let _ = editor.handle(PlanIntent::PointerUp { at: centre }, &mut view);

        assert_relative_eq!(editor.document().get(0).unwrap().theta, 90.0, epsilon = 1e-9);
        assert_relative_eq!(editor.document().get(0).unwrap().x, 0.0);
    }

    #[test]
    fn test_press_outside_field_pans() {
        let (mut editor, mut view) = setup();
        let at = Point2::new(5.0, 5.0);
        let _ = editor.handle(PlanIntent::PointerDown { at, button: PointerButton::Primary }, &mut view);
        let _ = editor.handle(PlanIntent::PointerMove { at: Point2::new(25.0, 5.0) }, &mut view);
        let _ = editor.handle(PlanIntent::PointerUp { at }, &mut view);
        assert!(editor.document().is_empty());
        assert_relative_eq!(view.pan().x, 20.0);
    }

    #[test]
    fn test_nudge_and_delete() {
        let (mut editor, mut view) = setup();
        editor.document_mut().replace(vec![Waypoint::new(0.0, 0.0, 0.0)]);
        editor.document_mut().select_single(0);

        let _ = editor.handle(PlanIntent::Key(PlanKey::Nudge { dx: 1.0, dy: 0.0, coarse: true }), &mut view);
        assert_relative_eq!(editor.document().get(0).unwrap().x, 2.5);
        let _ = editor.handle(PlanIntent::Key(PlanKey::Nudge { dx: 0.0, dy: 1.0, coarse: false }), &mut view);
        assert_relative_eq!(editor.document().get(0).unwrap().y, 0.5);

        let out = editor.handle(PlanIntent::Key(PlanKey::Delete), &mut view);
        assert!(out.changed);
        assert!(editor.document().is_empty());
    }

    #[test]
    fn test_undo_pauses_playback() {
        let (mut editor, mut view) = setup();
        editor
            .document_mut()
            .replace(vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(10.0, 0.0, 0.0)]);
        editor.document_mut().select_single(1);
        let _ = editor.handle(PlanIntent::EditField { field: WaypointField::X, value: 20.0 }, &mut view);
        let _ = editor.handle(PlanIntent::Key(PlanKey::TogglePlayback), &mut view);
        assert!(editor.playback().is_playing());

        let _ = editor.handle(PlanIntent::Key(PlanKey::Undo), &mut view);
        assert!(!editor.playback().is_playing());
        assert_relative_eq!(editor.document().get(1).unwrap().x, 10.0);
    }

    #[test]
    fn test_clear_is_undoable() {
        let (mut editor, mut view) = setup();
        editor
            .document_mut()
            .replace(vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(10.0, 0.0, 0.0)]);
        assert!(editor.handle(PlanIntent::Clear, &mut view).changed);
        assert!(editor.document().is_empty());
        let _ = editor.handle(PlanIntent::Key(PlanKey::Undo), &mut view);
        assert_eq!(editor.document().len(), 2);
    }
}
