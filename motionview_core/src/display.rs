//! Which pose the viewer shows.
//!
//! Exactly one state is active at a time:
//!
//! | State      | Shown pose                         | Entered by                 |
//! |------------|------------------------------------|----------------------------|
//! | `Idle`     | the selected sample                | pause, unlock, hover end   |
//! | `Hovering` | timeline time or picked track point| pointer over timeline/track|
//! | `Locked`   | a picked track point               | click on the track         |
//! | `Playing`  | the playback time                  | play                       |
//!
//! Playing outranks everything: entering it clears hover and lock, and hover
//! events are ignored until it ends. A timeline hover over a lock remembers
//! the lock and returns to it afterwards.

use crate::frame::PoseFrame;
use crate::geometry::{project_onto_segment, ScreenPoint};
use crate::pose_timeline::{blend, Pose, PoseTimeline};
use crate::view_transform::ViewTransform;

/// A point picked on the drawn track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPick {
    /// Interpolated (framed) pose under the pointer
    pub pose: Pose,
    /// Sample closer to the picked point
    pub nearest_index: usize,
    /// Screen distance from the pointer to the track
    pub distance_px: f64,
}

/// Nearest point on the projected pose polyline within `tolerance_px`.
///
/// Works on framed poses, so the pick matches what is drawn.
pub fn pick_track(
    timeline: &PoseTimeline,
    frame: &PoseFrame,
    view: &ViewTransform,
    at: ScreenPoint,
    tolerance_px: f64,
) -> Option<TrackPick> {
    let poses = timeline.poses();
    if poses.len() < 2 {
        return None;
    }

    let framed: Vec<Pose> = poses.iter().map(|p| frame.apply(p)).collect();
    let screen: Vec<ScreenPoint> = framed
        .iter()
        .map(|p| view.world_to_screen(nalgebra::Point2::new(p.x, p.y)))
        .collect();

    let mut best: Option<(usize, f64, f64)> = None;
    for i in 0..screen.len() - 1 {
        let (alpha, d2) = project_onto_segment(at, screen[i], screen[i + 1]);
        if best.map_or(true, |(_, _, b)| d2 < b) {
            best = Some((i, alpha, d2));
        }
    }

    let (i0, alpha, d2) = best?;
    if d2 > tolerance_px * tolerance_px {
        return None;
    }
    let i1 = i0 + 1;
    Some(TrackPick {
        pose: blend(&framed[i0], &framed[i1], alpha),
        nearest_index: if alpha < 0.5 { i0 } else { i1 },
        distance_px: d2.sqrt(),
    })
}

/// What is being hovered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hover {
    /// A time on the timeline strip, in ms
    Timeline(f64),
    /// A point on the drawn track
    Track(TrackPick),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayState {
    Idle,
    Hovering {
        hover: Hover,
        /// Lock to return to when the hover ends
        held_lock: Option<TrackPick>,
    },
    Locked(TrackPick),
    Playing,
}

/// The pose to show and where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayedPose {
    pub pose: Pose,
    /// Sample index when the pose is (or is nearest) a stored sample
    pub index: Option<usize>,
}

/// Display state machine plus the plain selection it falls back to.
#[derive(Debug, Clone)]
pub struct DisplayController {
    state: DisplayState,
    selected_index: usize,
}

impl Default for DisplayController {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayController {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Idle,
            selected_index: 0,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn is_locked(&self) -> bool {
        matches!(
            self.state,
            DisplayState::Locked(_) | DisplayState::Hovering { held_lock: Some(_), .. }
        )
    }

    pub fn is_hovering(&self) -> bool {
        matches!(self.state, DisplayState::Hovering { .. })
    }

    pub fn is_playing(&self) -> bool {
        self.state == DisplayState::Playing
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Selects a sample directly; drops hover and lock.
    pub fn select_index(&mut self, index: usize, timeline: &PoseTimeline) {
        self.selected_index = clamp_index(index, timeline);
        if !self.is_playing() {
            self.state = DisplayState::Idle;
        }
    }

    /// Moves the selection by `delta` samples, clamped to the track.
    pub fn step(&mut self, delta: isize, timeline: &PoseTimeline) {
        let next = self.selected_index.saturating_add_signed(delta);
        self.select_index(next, timeline);
    }

    /// Playback moves the selection without leaving `Playing`.
    pub fn follow_playback(&mut self, index: usize, timeline: &PoseTimeline) {
        self.selected_index = clamp_index(index, timeline);
    }

    pub fn hover_timeline(&mut self, t: f64) {
        let held_lock = match self.state {
            DisplayState::Playing => return,
            DisplayState::Locked(pick) => Some(pick),
            DisplayState::Hovering { held_lock, .. } => held_lock,
            DisplayState::Idle => None,
        };
        self.state = DisplayState::Hovering {
            hover: Hover::Timeline(t),
            held_lock,
        };
    }

    /// Track hover only applies when nothing is locked.
    pub fn hover_track(&mut self, pick: Option<TrackPick>) {
        match (self.state, pick) {
            (DisplayState::Idle, Some(pick)) => {
                self.state = DisplayState::Hovering {
                    hover: Hover::Track(pick),
                    held_lock: None,
                };
            }
            (DisplayState::Hovering { hover: Hover::Track(_), .. }, Some(pick)) => {
                self.state = DisplayState::Hovering {
                    hover: Hover::Track(pick),
                    held_lock: None,
                };
            }
            (DisplayState::Hovering { hover: Hover::Track(_), .. }, None) => {
                self.state = DisplayState::Idle;
            }
            _ => {}
        }
    }

    /// Ends any hover, returning to a held lock if there was one.
    pub fn end_hover(&mut self) {
        if let DisplayState::Hovering { held_lock, .. } = self.state {
            self.state = match held_lock {
                Some(pick) => DisplayState::Locked(pick),
                None => DisplayState::Idle,
            };
        }
    }

    /// Locks onto a picked point; also moves the selection to its nearest
    /// sample.
    pub fn lock(&mut self, pick: TrackPick) {
        if self.is_playing() {
            return;
        }
        self.selected_index = pick.nearest_index;
        self.state = DisplayState::Locked(pick);
    }

    pub fn unlock(&mut self) {
        match self.state {
            DisplayState::Locked(_) => self.state = DisplayState::Idle,
            DisplayState::Hovering { hover, held_lock: Some(_) } => {
                self.state = DisplayState::Hovering { hover, held_lock: None };
            }
            _ => {}
        }
    }

    /// Enters `Playing`, discarding hover and lock.
    pub fn start_playing(&mut self) {
        self.state = DisplayState::Playing;
    }

    pub fn stop_playing(&mut self) {
        if self.is_playing() {
            self.state = DisplayState::Idle;
        }
    }

    /// Back to a fresh state, e.g. after the track is cleared.
    pub fn reset(&mut self) {
        self.state = DisplayState::Idle;
        self.selected_index = 0;
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// The pose to show, framed.
    pub fn displayed(
        &self,
        timeline: &PoseTimeline,
        frame: &PoseFrame,
        playback_time: f64,
    ) -> Option<DisplayedPose> {
        let at_time = |t: f64| {
            timeline.interpolate_at(t).map(|p| DisplayedPose {
                pose: frame.apply(&p),
                index: timeline.floor_index(t),
            })
        };
        match self.state {
            DisplayState::Playing => at_time(playback_time),
            DisplayState::Hovering { hover: Hover::Timeline(t), .. } => at_time(t),
            DisplayState::Hovering { hover: Hover::Track(pick), .. } | DisplayState::Locked(pick) => {
                Some(DisplayedPose {
                    pose: pick.pose,
                    index: Some(pick.nearest_index),
                })
            }
            DisplayState::Idle => timeline.get(self.selected_index).map(|p| DisplayedPose {
                pose: frame.apply(p),
                index: Some(self.selected_index),
            }),
        }
    }

    /// Time between the hovered point and the selected sample, in ms.
    pub fn hover_delta_ms(&self, timeline: &PoseTimeline) -> Option<f64> {
        let hovered = match self.state {
            DisplayState::Hovering { hover: Hover::Timeline(t), .. } => t,
            DisplayState::Hovering { hover: Hover::Track(pick), .. } => pick.pose.t,
            _ => return None,
        };
        let selected = timeline.get(self.selected_index)?;
        Some(hovered - selected.t)
    }
}

fn clamp_index(index: usize, timeline: &PoseTimeline) -> usize {
    index.min(timeline.len().saturating_sub(1))
}
