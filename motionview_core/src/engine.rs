//! The engine orchestrator.
//!
//! `MotionEngine` owns every component and is driven by three inputs: user
//! intents, frame ticks, and live lines. It has no threads and does no I/O
//! of its own; storage and control requests go through the collaborators
//! passed to the methods that need them.

use crate::config::EngineConfig;
use crate::display::{pick_track, DisplayController, DisplayedPose, TrackPick};
use crate::error::EngineError;
use crate::events::{EventCorrelator, EventMarker};
use crate::frame::{LengthUnit, PoseFrame};
use crate::geometry::ScreenPoint;
use crate::ingest::{IngestReport, LineDisposition, LiveIngestConnector};
use crate::live_session::{ActionResult, ActionTicket, LiveSession, StreamAction};
use crate::persistence::{BulkDocument, DocumentStore, SaveDebouncer, SavedDocument};
use crate::plan_editor::{PlanEditor, PlanIntent, PlanOutcome};
use crate::planning::{PlanSample, PlanningDocument};
use crate::playback::{PlanPlayback, RedrawRequest, TrajectoryPlayback, TrajectoryTick};
use crate::pose_timeline::{Pose, PoseTimeline};
use crate::speed::SpeedNormalizer;
use crate::view_transform::{PanDrag, ViewTransform};
use motionview_env::{EngineContext, StreamControl};
use nalgebra::Point2;
use tracing::{debug, info};

/// Which surface user intents are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Viewing,
    Planning,
}

/// Viewing-mode intents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewIntent {
    /// Press on the field: a drag pans, a click locks onto the track
    PointerDown { at: ScreenPoint },
    PointerMove { at: ScreenPoint },
    PointerUp { at: ScreenPoint },
    /// Pointer left the field canvas
    PointerLeave,
    HoverTimeline { t: f64 },
    EndTimelineHover,
    Step(isize),
    SelectIndex(usize),
    Unlock,
    Wheel { at: ScreenPoint, delta_y: f64 },
    TogglePlayback,
    ToggleFollowHead,
}

/// The temporal/spatial data engine.
pub struct MotionEngine {
    config: EngineConfig,
    mode: AppMode,
    timeline: PoseTimeline,
    events: EventCorrelator,
    speed: SpeedNormalizer,
    frame: PoseFrame,
    ingest: LiveIngestConnector,
    live: LiveSession,
    view: ViewTransform,
    display: DisplayController,
    trajectory: TrajectoryPlayback,
    planner: PlanEditor,
    redraw: RedrawRequest,
    save: SaveDebouncer,
    press: Option<PanDrag>,
    /// Time whose latest event is highlighted during playback
    highlight_t: Option<f64>,
    last_tick_ms: Option<f64>,
}

impl MotionEngine {
    pub fn new(config: EngineConfig, width: f64, height: f64) -> Self {
        let bounds = config.view.bounds;
        let view = ViewTransform::new(&config.view, width, height);

        let mut doc = PlanningDocument::new(&config.plan, bounds);
        doc.set_rotation(view.rotation());
        let planner = PlanEditor::new(
            doc,
            PlanPlayback::new(config.plan_speed_in_per_sec(), config.play_rate),
            config.plan,
        );

        Self {
            mode: AppMode::Viewing,
            timeline: PoseTimeline::new(),
            events: EventCorrelator::new(config.correlation.tolerance_ms),
            speed: SpeedNormalizer::from_config(&config.speed),
            frame: PoseFrame::new(&config.frame, &bounds),
            ingest: LiveIngestConnector::new(config.ingest.queue_capacity),
            live: LiveSession::new(&config.ingest),
            view,
            display: DisplayController::new(),
            trajectory: TrajectoryPlayback::new(config.play_rate),
            planner,
            redraw: RedrawRequest::default(),
            save: SaveDebouncer::new(config.save_debounce_ms),
            press: None,
            highlight_t: None,
            last_tick_ms: None,
            config,
        }
    }

    /// Mints deterministic session ids (simulation and replay).
    pub fn with_session_seed(mut self, seed: u64) -> Self {
        self.live = LiveSession::new(&self.config.ingest).with_session_seed(seed);
        self
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn timeline(&self) -> &PoseTimeline {
        &self.timeline
    }

    pub fn events(&self) -> &EventCorrelator {
        &self.events
    }

    pub fn frame(&self) -> &PoseFrame {
        &self.frame
    }

    pub fn ingest(&self) -> &LiveIngestConnector {
        &self.ingest
    }

    pub fn live(&self) -> &LiveSession {
        &self.live
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    pub fn trajectory(&self) -> &TrajectoryPlayback {
        &self.trajectory
    }

    pub fn planner(&self) -> &PlanEditor {
        &self.planner
    }

    pub fn plan(&self) -> &PlanningDocument {
        self.planner.document()
    }

    /// True once per batch of visible changes.
    pub fn take_redraw(&mut self) -> bool {
        self.redraw.take()
    }

    pub fn save_pending(&self) -> bool {
        self.save.is_pending()
    }

    // =========================================================================
    // MODE / SETTINGS
    // =========================================================================

    pub fn set_mode(&mut self, mode: AppMode) {
        if mode == self.mode {
            return;
        }
        self.pause_trajectory();
        self.planner.playback_mut().pause();
        self.planner.cancel_gesture();
        self.press = None;
        self.mode = mode;
        self.redraw.request();
    }

    /// Replaces the speed band and recomputes every normalized speed.
    pub fn set_speed_bounds(&mut self, min: f64, max: f64) {
        self.speed = SpeedNormalizer::new(min, max);
        self.speed.recompute(&mut self.timeline);
        self.config.speed.min_speed = self.speed.min();
        self.config.speed.max_speed = self.speed.max();
        self.planner
            .playback_mut()
            .set_speed(self.config.plan_speed_in_per_sec());
        self.redraw.request();
    }

    pub fn set_plan_speed_pct(&mut self, pct: f64) {
        self.config.plan.speed_pct = pct;
        self.planner
            .playback_mut()
            .set_speed(self.config.plan_speed_in_per_sec());
    }

    pub fn set_play_rate(&mut self, rate: f64) {
        self.config.play_rate = rate;
        self.trajectory.set_rate(rate);
        self.planner.playback_mut().set_rate(rate);
    }

    pub fn set_units(&mut self, units: LengthUnit) {
        self.frame.set_units(units, self.view.field_bounds());
        self.redraw.request();
    }

    pub fn set_frame_offsets(&mut self, x: f64, y: f64, theta: f64) {
        self.frame.set_offsets(x, y, theta, self.view.field_bounds());
        self.redraw.request();
    }

    /// Field rotation, quantized to quarter turns; shared by view and plan.
    pub fn set_rotation_deg(&mut self, deg: f64) {
        self.view.set_rotation_deg(deg);
        self.planner.document_mut().set_rotation(self.view.rotation());
        self.redraw.request();
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.view.resize(width, height);
        self.redraw.request();
    }

    /// Frames the track (plus margin) instead of the whole field.
    pub fn fit_to_poses(&mut self) -> bool {
        let frame = self.frame;
        let points = self
            .timeline
            .poses()
            .iter()
            .map(|p| {
                let f = frame.apply(p);
                Point2::new(f.x, f.y)
            })
            .collect::<Vec<_>>();
        let fitted = self.view.fit_to(points, self.config.view.fit_margin_in);
        if fitted {
            self.redraw.request();
        }
        fitted
    }

    pub fn reset_view(&mut self) {
        self.view.reset_view();
        self.redraw.request();
    }

    // =========================================================================
    // DOCUMENTS
    // =========================================================================

    /// Replaces the track and events with a recorded run.
    pub fn load_bulk_str(&mut self, text: &str) -> Result<usize, EngineError> {
        let doc = BulkDocument::from_json_str(text)?;
        let count = doc.poses.len();

        self.pause_trajectory();
        if let Some(units) = doc.units {
            self.frame.set_units(units, self.view.field_bounds());
        }
        self.timeline = PoseTimeline::from_poses(doc.poses);
        self.speed.recompute(&mut self.timeline);
        self.events.set_events(doc.events);
        self.events.build_markers(&self.timeline);
        self.display.reset();
        self.highlight_t = None;
        self.view.reset_view();

        info!(poses = count, events = self.events.len(), "loaded recorded run");
        self.changed();
        Ok(count)
    }

    /// Restores a previously saved document.
    pub fn restore(&mut self, doc: SavedDocument) {
        self.planner.document_mut().replace(doc.planned_path.clone());
        if !doc.robot_path.is_empty() {
            self.timeline = PoseTimeline::from_poses(doc.poses());
            self.speed.recompute(&mut self.timeline);
            self.events.set_events(doc.watches);
            self.events.build_markers(&self.timeline);
            self.display.reset();
        }
        self.redraw.request();
    }

    /// Reads and restores the saved document, if one exists.
    pub fn restore_from(&mut self, store: &dyn DocumentStore) -> Result<bool, EngineError> {
        match store.read()? {
            Some(text) => {
                let doc = SavedDocument::from_json_str(&text)?;
                self.restore(doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn saved_document(&self) -> SavedDocument {
        SavedDocument::new(
            self.plan().waypoints(),
            self.timeline.poses(),
            self.events.events(),
        )
    }

    /// Writes the document once the debounce window has passed.
    pub fn poll_save(&mut self, now_ms: f64, store: &dyn DocumentStore) -> Result<bool, EngineError> {
        if !self.save.poll(now_ms) {
            return Ok(false);
        }
        store.write(&self.saved_document().to_json()?)?;
        Ok(true)
    }

    /// Clears the track, events and any buffered live lines.
    pub fn clear_trajectory(&mut self) {
        self.pause_trajectory();
        self.timeline.clear();
        self.events.clear();
        self.ingest.clear_pending();
        self.display.reset();
        self.highlight_t = None;
        self.press = None;
        info!("trajectory cleared");
        self.changed();
    }

    fn changed(&mut self) {
        self.save.schedule(self.last_tick_ms.unwrap_or(0.0));
        self.redraw.request();
    }

    // =========================================================================
    // INTENTS
    // =========================================================================

    pub fn handle_plan(&mut self, intent: PlanIntent) -> PlanOutcome {
        if self.mode != AppMode::Planning {
            return PlanOutcome::default();
        }
        let outcome = self.planner.handle(intent, &mut self.view);
        if outcome.changed {
            self.changed();
        } else if outcome.redraw {
            self.redraw.request();
        }
        outcome
    }

    pub fn handle_view(&mut self, intent: ViewIntent) {
        match intent {
            ViewIntent::Wheel { at, delta_y } => self.view.wheel(at, delta_y),
            ViewIntent::TogglePlayback => {
                if self.trajectory.is_playing() {
                    self.pause_trajectory();
                } else {
                    self.play_trajectory();
                }
            }
            ViewIntent::ToggleFollowHead => {
                let on = !self.live.follow_head();
                self.live.set_follow_head(on);
            }
            _ if self.mode != AppMode::Viewing => return,
            ViewIntent::PointerDown { at } => self.press = Some(PanDrag::begin(at, &self.view)),
            ViewIntent::PointerMove { at } => self.pointer_move(at),
            ViewIntent::PointerUp { at } => self.pointer_up(at),
            ViewIntent::PointerLeave => {
                self.press = None;
                self.display.hover_track(None);
            }
            ViewIntent::HoverTimeline { t } => self.display.hover_timeline(t),
            ViewIntent::EndTimelineHover => self.display.end_hover(),
            ViewIntent::Step(delta) => self.display.step(delta, &self.timeline),
            ViewIntent::SelectIndex(index) => self.display.select_index(index, &self.timeline),
            ViewIntent::Unlock => self.display.unlock(),
        }
        self.redraw.request();
    }

    fn pick(&self, at: ScreenPoint) -> Option<TrackPick> {
        pick_track(
            &self.timeline,
            &self.frame,
            &self.view,
            at,
            self.config.view.track_pick_px,
        )
    }

    fn pointer_move(&mut self, at: ScreenPoint) {
        if self.press.is_none() {
            let pick = self.pick(at);
            self.display.hover_track(pick);
            return;
        }
        if let Some(press) = self.press.as_mut() {
            let was_active = press.is_active();
            press.update(at, &mut self.view);
            if !was_active && press.is_active() {
                self.display.hover_track(None);
            }
        }
    }

    fn pointer_up(&mut self, at: ScreenPoint) {
        let Some(press) = self.press.take() else {
            return;
        };
        if press.is_active() {
            return;
        }
        match self.pick(at) {
            Some(pick) => self.display.lock(pick),
            None => self.display.unlock(),
        }
    }

    // =========================================================================
    // PLAYBACK
    // =========================================================================

    /// Starts trajectory playback from the selected sample. Refused while
    /// streaming.
    pub fn play_trajectory(&mut self) -> bool {
        if self.live.is_streaming() {
            debug!("playback disabled while streaming");
            return false;
        }
        let start = self
            .timeline
            .get(self.display.selected_index())
            .or_else(|| self.timeline.first())
            .map_or(0.0, |p| p.t);
        if !self.trajectory.play(start, &self.timeline) {
            return false;
        }
        self.display.start_playing();
        self.highlight_t = None;
        self.redraw.request();
        true
    }

    pub fn pause_trajectory(&mut self) {
        self.trajectory.pause();
        self.display.stop_playing();
    }

    /// Advances both clocks and the live refresh timer to `now_ms`.
    pub fn tick(&mut self, now_ms: f64) -> Option<IngestReport> {
        let dt = self.last_tick_ms.map_or(0.0, |last| (now_ms - last).max(0.0));
        self.last_tick_ms = Some(now_ms);

        match self.trajectory.tick(dt, &self.timeline) {
            TrajectoryTick::Idle => {}
            TrajectoryTick::Advanced { time, index } => {
                self.display.follow_playback(index, &self.timeline);
                self.highlight_t = self.events.last_at_or_before(time).map(EventMarker::t);
                self.redraw.request();
            }
            TrajectoryTick::Finished { time, index } => {
                self.display.follow_playback(index, &self.timeline);
                self.display.stop_playing();
                self.highlight_t = self.events.last_at_or_before(time).map(EventMarker::t);
                self.redraw.request();
            }
        }

        if self.planner.playback().is_playing() {
            self.planner.tick(dt);
            self.redraw.request();
        }

        if self.live.refresh_due(now_ms) {
            return self.refresh_live();
        }
        None
    }

    // =========================================================================
    // LIVE
    // =========================================================================

    pub fn connect_live(&mut self, now_ms: f64) {
        self.pause_trajectory();
        self.live.connect(now_ms);
        self.redraw.request();
    }

    pub fn disconnect_live(&mut self) {
        self.live.disconnect();
        self.ingest.clear_pending();
        self.redraw.request();
    }

    /// Buffers one transport line. Lines are only accepted while connected.
    pub fn push_live_line(&mut self, raw: &str) -> LineDisposition {
        if !self.live.is_connected() {
            return LineDisposition::Ignored;
        }
        self.ingest.push_line(raw)
    }

    pub fn begin_live_action(&mut self, action: StreamAction, now_ms: f64) -> Option<ActionTicket> {
        if action == StreamAction::Start {
            self.pause_trajectory();
        }
        self.live.begin(action, now_ms)
    }

    pub fn complete_live_action(&mut self, ticket: ActionTicket, result: ActionResult) -> bool {
        let applied = self.live.complete(ticket, result, &mut self.ingest);
        self.redraw.request();
        applied
    }

    /// Runs a control action to completion.
    pub async fn run_live_action<Ctx, C>(&mut self, ctx: &Ctx, control: &C, action: StreamAction) -> Option<bool>
    where
        Ctx: EngineContext + ?Sized,
        C: StreamControl + ?Sized,
    {
        if action == StreamAction::Start {
            self.pause_trajectory();
        }
        let outcome = self.live.run_action(ctx, control, action, &mut self.ingest).await;
        self.redraw.request();
        outcome
    }

    /// One refresh step: integrate, then follow the head if nothing else
    /// owns the display.
    pub fn refresh_live(&mut self) -> Option<IngestReport> {
        let report = self
            .live
            .refresh(&mut self.ingest, &mut self.timeline, &mut self.events, &self.speed)?;

        let idle = !self.display.is_hovering() && !self.display.is_locked() && !self.display.is_playing();
        if self.live.follow_head() && idle && !self.timeline.is_empty() {
            self.display.select_index(self.timeline.len() - 1, &self.timeline);
            self.redraw.request();
        }
        if report.changed() {
            self.changed();
        }
        Some(report)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// The pose to show for the current display state, framed.
    pub fn displayed_pose(&self) -> Option<DisplayedPose> {
        self.display
            .displayed(&self.timeline, &self.frame, self.trajectory.time())
    }

    /// Plan sample at the current plan playback position.
    pub fn plan_sample(&self) -> Option<PlanSample> {
        self.plan().current_sample()
    }

    /// Event highlighted by the last playback tick.
    pub fn highlighted_event(&self) -> Option<&EventMarker> {
        self.events.last_at_or_before(self.highlight_t?)
    }

    /// Marker poses in field coordinates.
    pub fn framed_markers(&self) -> impl Iterator<Item = (&EventMarker, Pose)> + '_ {
        self.events
            .markers()
            .iter()
            .map(move |m| (m, self.frame.apply(&m.pose)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::plan_editor::{PlanKey, PointerButton};
    use approx::assert_relative_eq;

    const RUN: &str = r#"{
        "meta": { "units": "in" },
        "poses": [
            { "t": 0, "x": 0, "y": 0, "theta": 0, "speed": 0 },
            { "t": 50, "x": 1, "y": 0, "theta": 0, "speed": 63.5 },
            { "t": 100, "x": 2, "y": 0, "theta": 0, "speed": 127 },
            { "t": 150, "x": 3, "y": 0, "theta": 0, "speed": 127 }
        ],
        "watches": [ { "t": 100, "label": "A", "value": "1" } ]
    }"#;

    fn engine() -> MotionEngine {
        MotionEngine::new(EngineConfig::default(), 804.0, 804.0)
    }

    #[test]
    fn test_bulk_load_builds_derived_state() {
        let mut engine = engine();
        assert_eq!(engine.load_bulk_str(RUN).unwrap(), 4);
        assert_relative_eq!(engine.timeline().get(1).unwrap().speed_norm, 0.5);
        let marker = &engine.events().markers()[0];
        assert!(marker.ok);
        assert_eq!(marker.pose_index, Some(2));
        assert!(engine.save_pending());
        assert!(engine.take_redraw());
    }

    #[test]
    fn test_bulk_load_rejects_missing_poses() {
        let mut engine = engine();
        assert!(engine.load_bulk_str(r#"{"watches": []}"#).is_err());
        assert!(engine.timeline().is_empty());
    }

    #[test]
    fn test_playback_highlights_latest_event_and_stops() {
        let mut engine = engine();
        engine.load_bulk_str(RUN).unwrap();
        engine.tick(0.0);
        assert!(engine.play_trajectory());

        engine.tick(120.0);
        assert_eq!(engine.display().selected_index(), 2);
        assert_relative_eq!(engine.highlighted_event().unwrap().t(), 100.0);
        assert_relative_eq!(engine.displayed_pose().unwrap().pose.x, 2.4, epsilon = 1e-9);

        engine.tick(1000.0);
        assert!(!engine.trajectory().is_playing());
        assert_eq!(engine.display().selected_index(), 3);
    }

    #[test]
    fn test_live_lines_ignored_until_connected() {
        let mut engine = engine();
        assert_eq!(engine.push_live_line("[DATA],1,0,0,0,0,0"), LineDisposition::Ignored);
        engine.connect_live(0.0);
        assert_eq!(engine.push_live_line("[DATA],1,0,0,0,0,0"), LineDisposition::Queued);
    }

    #[test]
    fn test_streaming_follows_head_and_blocks_playback() {
        let mut engine = engine();
        engine.connect_live(0.0);
        let ticket = engine.begin_live_action(StreamAction::Start, 0.0).unwrap();
        engine.complete_live_action(ticket, ActionResult::Started { retried: false });

        for (t, x) in [(0, 0), (100, 1), (200, 2)] {
            engine.push_live_line(&format!("[14.2] [DATA],{t},{x},0,0,10,10"));
        }
        let report = engine.tick(500.0).unwrap();
        assert_eq!(report.poses_added, 3);
        assert_eq!(engine.display().selected_index(), 2);
        assert!(!engine.play_trajectory());
    }

    #[test]
    fn test_plan_intents_only_in_planning_mode() {
        let mut engine = engine();
        let at = engine.view().world_to_screen(Point2::new(0.0, 0.0));
        let down = PlanIntent::PointerDown { at, button: PointerButton::Primary };

        assert_eq!(engine.handle_plan(down), PlanOutcome::default());
        engine.set_mode(AppMode::Planning);
        assert!(engine.handle_plan(down).changed);
        let _ = engine.handle_plan(PlanIntent::PointerUp { at });
        assert_eq!(engine.plan().len(), 1);
        let _ = engine.handle_plan(PlanIntent::Key(PlanKey::Undo));
        assert!(engine.plan().is_empty());
    }

    #[test]
    fn test_debounced_save_and_restore() {
        let store = MemoryStore::new();
        let mut engine = engine();
        engine.tick(0.0);
        engine.load_bulk_str(RUN).unwrap();

        assert!(!engine.poll_save(100.0, &store).unwrap());
        assert!(engine.poll_save(300.0, &store).unwrap());
        assert_eq!(store.write_count(), 1);

        let mut restored = MotionEngine::new(EngineConfig::default(), 804.0, 804.0);
        assert!(restored.restore_from(&store).unwrap());
        assert_eq!(restored.timeline().poses(), engine.timeline().poses());
        assert_eq!(restored.events().events(), engine.events().events());
    }

    #[test]
    fn test_click_on_track_locks() {
        let mut engine = engine();
        engine.load_bulk_str(RUN).unwrap();
        let at = engine.view().world_to_screen(Point2::new(2.6, 0.0));
        engine.handle_view(ViewIntent::PointerDown { at });
        engine.handle_view(ViewIntent::PointerUp { at });
        assert!(engine.display().is_locked());
        assert_eq!(engine.display().selected_index(), 3);
        assert_relative_eq!(engine.displayed_pose().unwrap().pose.x, 2.6, epsilon = 1e-9);
    }

    #[test]
    fn test_clear_trajectory() {
        let mut engine = engine();
        engine.load_bulk_str(RUN).unwrap();
        engine.clear_trajectory();
        assert!(engine.timeline().is_empty());
        assert!(engine.events().is_empty());
        assert!(engine.displayed_pose().is_none());
    }
}
