//! Scenario runner - executes chaos engineering test scenarios.

use crate::context::SimContext;
use crate::control::{ControlScript, SimControl};
use crate::robot::{RobotConfig, SimRobot};
use crate::scenarios::ScenarioId;
use crate::transport::{SimTransport, TransportFaults};

use motionview_core::plan_editor::{PlanIntent, PlanKey, PointerButton};
use motionview_core::{AppMode, EngineConfig, MotionEngine, SavedDocument, StreamAction, WaypointField};
use motionview_env::{ControlCommand, EngineContext, LineTransport};
use nalgebra::Point2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Canvas size every scenario renders into.
const CANVAS_PX: f64 = 804.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total engine ticks executed
    pub total_ticks: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// The engine's persisted document at the end of the run
    pub document: SavedDocument,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Lines the robot produced
    pub lines_sent: u64,

    /// Lines handed to the engine (faults included)
    pub lines_received: u64,

    pub lines_ignored: u64,
    pub poses_added: u64,
    pub events_added: u64,
    pub out_of_order: u64,
    pub malformed: u64,

    /// Lines dropped by the pending queue on overflow
    pub queue_dropped: u64,

    /// Largest unread backlog seen
    pub max_pending: usize,

    /// Integration steps that ran
    pub refreshes: u64,

    pub control_requests: u64,
    pub reconnects: u64,
    pub sessions: u64,

    /// Plan gestures applied
    pub plan_gestures: u64,
}

/// One engine wired to a simulated backend.
pub(crate) struct Harness {
    pub(crate) ctx: SimContext,
    pub(crate) transport: SimTransport,
    pub(crate) control: SimControl,
    pub(crate) robot: SimRobot,
    pub(crate) engine: MotionEngine,
    pub(crate) metrics: ScenarioMetrics,
    pub(crate) ticks: u64,
}

impl Harness {
    pub(crate) fn new(seed: u64, config: &EngineConfig) -> Self {
        let ctx = SimContext::new(seed);
        let transport = SimTransport::new(ctx.rng_for("transport"));
        let robot = SimRobot::new(ctx.rng_for("robot"), config.view.bounds, RobotConfig::default());
        let engine = MotionEngine::new(config.clone(), CANVAS_PX, CANVAS_PX).with_session_seed(seed);
        Self {
            ctx,
            transport,
            control: SimControl::new(),
            robot,
            engine,
            metrics: ScenarioMetrics::default(),
            ticks: 0,
        }
    }

    fn now_ms(&self) -> f64 {
        self.ctx.now_ms()
    }

    pub(crate) fn connect(&mut self) {
        self.engine.connect_live(self.ctx.now_ms());
    }

    pub(crate) async fn action(&mut self, action: StreamAction) -> Option<bool> {
        let outcome = self.engine.run_live_action(&self.ctx, &self.control, action).await;
        debug!(%action, ?outcome, status = ?self.engine.live().status(), "control action");
        outcome
    }

    /// Lets the robot run and hands its lines to the transport.
    pub(crate) fn robot_emit(&mut self, dt_ms: f64) {
        for line in self.robot.step(dt_ms) {
            self.transport.deliver(&line);
            self.metrics.lines_sent += 1;
        }
    }

    /// Moves every arrived line into the engine.
    pub(crate) fn pump(&mut self) {
        while let Ok(Some(line)) = self.transport.try_recv() {
            self.metrics.lines_received += 1;
            self.engine.push_live_line(&line);
        }
        self.metrics.max_pending = self.metrics.max_pending.max(self.engine.ingest().pending());
    }

    /// Advances the clock and ticks the engine.
    pub(crate) fn tick(&mut self, dt_ms: f64) -> Result<(), String> {
        self.ctx.advance_time(Duration::from_secs_f64(dt_ms.max(0.0) / 1000.0));
        if self.engine.tick(self.now_ms()).is_some() {
            self.metrics.refreshes += 1;
        }
        self.ticks += 1;
        check_invariants(&self.engine)
    }

    /// One frame: robot output, delivery, engine tick.
    pub(crate) fn frame(&mut self, dt_ms: f64, robot_on: bool) -> Result<(), String> {
        if robot_on {
            self.robot_emit(dt_ms);
        }
        self.pump();
        self.tick(dt_ms)
    }

    /// Runs silent frames until one full refresh interval has passed, so
    /// everything buffered is integrated.
    pub(crate) fn settle(&mut self, dt_ms: f64) -> Result<(), String> {
        let interval = self.engine.config().ingest.refresh_interval_ms as f64;
        let mut waited = 0.0;
        while waited <= interval + dt_ms {
            self.frame(dt_ms, false)?;
            waited += dt_ms;
        }
        Ok(())
    }

    pub(crate) fn finish(mut self, scenario: ScenarioId, seed: u64, outcome: Result<(), String>) -> ScenarioResult {
        let stats = self.engine.ingest().stats();
        self.metrics.lines_ignored = stats.lines_ignored;
        self.metrics.poses_added = stats.poses_added;
        self.metrics.events_added = stats.events_added;
        self.metrics.out_of_order = stats.out_of_order;
        self.metrics.malformed = stats.malformed;
        self.metrics.queue_dropped = self.engine.ingest().queue().dropped();
        self.metrics.control_requests = self.control.requests().len() as u64;
        self.metrics.reconnects = self.control.reconnects();
        self.metrics.sessions = self.engine.live().sessions_started();

        ScenarioResult {
            scenario,
            seed,
            passed: outcome.is_ok(),
            total_ticks: self.ticks,
            final_time_secs: self.ctx.now().as_secs_f64(),
            failure_reason: outcome.err(),
            metrics: self.metrics,
            document: self.engine.saved_document(),
        }
    }
}

/// Invariants every scenario holds after every tick.
pub fn check_invariants(engine: &MotionEngine) -> Result<(), String> {
    let poses = engine.timeline().poses();
    if let Some(w) = poses.windows(2).find(|w| w[1].t <= w[0].t) {
        return Err(format!("track not strictly increasing: {} after {}", w[1].t, w[0].t));
    }
    if let Some(p) = poses.iter().find(|p| !(0.0..=1.0).contains(&p.speed_norm)) {
        return Err(format!("speed_norm {} outside [0, 1] at t={}", p.speed_norm, p.t));
    }

    let queue = engine.ingest().queue();
    if queue.len() > queue.capacity() {
        return Err(format!("pending queue {} exceeds capacity {}", queue.len(), queue.capacity()));
    }

    let events = engine.events();
    if let Some(w) = events.events().windows(2).find(|w| w[1].t < w[0].t) {
        return Err(format!("events not sorted: {} after {}", w[1].t, w[0].t));
    }
    let markers = events.markers();
    if !markers.is_empty() && markers.len() != events.len() {
        return Err(format!("{} markers for {} events", markers.len(), events.len()));
    }
    let tolerance = engine.config().correlation.tolerance_ms;
    for marker in markers.iter().filter(|m| m.ok) {
        match (marker.pose_index, marker.dt) {
            (Some(_), Some(dt)) if dt <= tolerance => {}
            _ => return Err(format!("marker at t={} claims a match outside tolerance", marker.t())),
        }
    }

    let plan = engine.plan();
    let bounds = engine.view().field_bounds();
    if let Some(w) = plan.waypoints().iter().find(|w| !bounds.contains(w.position())) {
        return Err(format!("waypoint ({}, {}) outside the field", w.x, w.y));
    }
    if let Some(&i) = plan.selected().iter().find(|&&i| i >= plan.len()) {
        return Err(format!("selection index {} out of range", i));
    }
    Ok(())
}

fn expect(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

/// Runs chaos scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Streaming duration in seconds
    max_duration_secs: f64,

    config: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 30,
            max_duration_secs: 10.0,
            config: EngineConfig::default(),
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs.max(0.0);
        self
    }

    /// Sets the engine configuration every scenario starts from.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn dt_ms(&self) -> f64 {
        1000.0 / self.tick_rate_hz as f64
    }

    fn frames(&self, secs: f64) -> u64 {
        (secs * self.tick_rate_hz as f64).ceil() as u64
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build();
        match runtime {
            Ok(runtime) => runtime.block_on(self.run_async(scenario)),
            Err(e) => {
                let harness = Harness::new(self.seed, &self.config);
                harness.finish(scenario, self.seed, Err(format!("runtime: {e}")))
            }
        }
    }

    /// Runs a scenario on the caller's runtime.
    pub async fn run_async(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut config = self.config.clone();
        if scenario == ScenarioId::BurstOverflow {
            config.ingest.queue_capacity = config.ingest.queue_capacity.min(200);
        }
        let mut h = Harness::new(self.seed, &config);

        let outcome = match scenario {
            ScenarioId::SteadyStream => self.run_steady_stream(&mut h).await,
            ScenarioId::BurstOverflow => self.run_burst_overflow(&mut h).await,
            ScenarioId::SessionRestart => self.run_session_restart(&mut h).await,
            ScenarioId::DuplicateLines => self.run_duplicate_lines(&mut h).await,
            ScenarioId::GarbageLines => self.run_garbage_lines(&mut h).await,
            ScenarioId::ControlTimeout => self.run_control_timeout(&mut h).await,
            ScenarioId::KillFallback => self.run_kill_fallback(&mut h).await,
            ScenarioId::PlanEditing => self.run_plan_editing(&mut h),
        };
        h.finish(scenario, self.seed, outcome)
    }

    async fn start_streaming(&self, h: &mut Harness) -> Result<(), String> {
        h.connect();
        let started = h.action(StreamAction::Start).await;
        expect(started == Some(true), || format!("start failed: {:?}", h.engine.live().status()))?;
        expect(h.engine.live().is_streaming(), || "not streaming after start".into())
    }

    fn stream_for(&self, h: &mut Harness, secs: f64) -> Result<(), String> {
        let dt = self.dt_ms();
        for _ in 0..self.frames(secs) {
            h.frame(dt, true)?;
        }
        h.settle(dt)
    }

    /// DST-001: every sample arrives, every marker is exact, the head is
    /// followed.
    async fn run_steady_stream(&self, h: &mut Harness) -> Result<(), String> {
        self.start_streaming(h).await?;
        self.stream_for(h, self.max_duration_secs)?;

        let stats = h.engine.ingest().stats();
        expect(stats.poses_added == h.robot.samples(), || {
            format!("{} poses added, robot sent {}", stats.poses_added, h.robot.samples())
        })?;
        expect(stats.events_added == h.robot.watches(), || {
            format!("{} events added, robot sent {}", stats.events_added, h.robot.watches())
        })?;
        expect(stats.out_of_order == 0 && stats.malformed == 0, || {
            format!("clean stream rejected lines: {:?}", stats)
        })?;
        expect(h.engine.events().markers().iter().all(|m| m.ok), || {
            "watch stamped with a sample time was not matched".into()
        })?;
        let len = h.engine.timeline().len();
        expect(len == 0 || h.engine.display().selected_index() == len - 1, || {
            format!("selection {} not at head {}", h.engine.display().selected_index(), len.saturating_sub(1))
        })?;
        expect(!h.engine.play_trajectory(), || "playback allowed while streaming".into())
    }

    /// DST-002: a stalled refresh lets the backlog overflow; exactly the
    /// newest `capacity` lines survive.
    async fn run_burst_overflow(&self, h: &mut Harness) -> Result<(), String> {
        self.start_streaming(h).await?;
        let capacity = h.engine.ingest().queue().capacity();

        // Flood well past capacity without letting a refresh run
        let burst_ms = (capacity as f64 * 2.5) * RobotConfig::default().sample_interval_ms;
        h.robot_emit(burst_ms);
        h.pump();
        check_invariants(&h.engine)?;
        let pending = h.engine.ingest().pending();
        expect(pending == capacity, || format!("{} pending after burst, capacity {}", pending, capacity))?;

        let sent_before = h.metrics.lines_sent;
        h.settle(self.dt_ms())?;
        let stats = h.engine.ingest().stats();
        let integrated = stats.poses_added + stats.events_added;
        expect(integrated == capacity as u64, || {
            format!("{} records integrated from a full queue of {}", integrated, capacity)
        })?;
        let dropped = h.engine.ingest().queue().dropped();
        expect(dropped == sent_before - capacity as u64, || {
            format!("{} dropped, expected {}", dropped, sent_before - capacity as u64)
        })?;
        expect(h.engine.timeline().last().map(|p| p.t) == Some(h.robot.clock_ms()), || {
            "newest sample lost in overflow".into()
        })?;

        // Normal service resumes
        let before = h.engine.timeline().len();
        self.stream_for(h, self.max_duration_secs.min(2.0))?;
        expect(h.engine.timeline().len() > before, || "no samples after overflow".into())
    }

    /// DST-003: a second run whose clock restarts at zero is appended after
    /// the first, with its own session id.
    async fn run_session_restart(&self, h: &mut Harness) -> Result<(), String> {
        self.start_streaming(h).await?;
        self.stream_for(h, self.max_duration_secs / 2.0)?;
        let first_session = h.engine.ingest().session();
        let first_end = h.engine.timeline().last().map(|p| p.t);

        expect(h.action(StreamAction::Stop).await == Some(true), || "stop failed".into())?;
        expect(!h.engine.live().is_streaming(), || "still streaming after stop".into())?;
        h.robot.restart();
        h.settle(self.dt_ms())?;

        expect(h.action(StreamAction::Start).await == Some(true), || "restart failed".into())?;
        self.stream_for(h, self.max_duration_secs / 2.0)?;

        expect(h.engine.ingest().session() != first_session, || "session id reused".into())?;
        expect(h.engine.live().sessions_started() == 2, || "expected two sessions".into())?;
        let stats = h.engine.ingest().stats();
        expect(stats.poses_added == h.robot.samples(), || {
            format!("{} poses added across sessions, robot sent {}", stats.poses_added, h.robot.samples())
        })?;
        let second_start = first_end.and_then(|end| h.engine.timeline().poses().iter().find(|p| p.t > end));
        expect(first_end.is_none() || second_start.is_some(), || "second session not appended".into())
    }

    /// DST-004: duplicated samples are rejected by the monotonic guard;
    /// duplicated watches are legitimate events.
    async fn run_duplicate_lines(&self, h: &mut Harness) -> Result<(), String> {
        h.transport.set_faults(TransportFaults {
            duplicate_rate: 0.2,
            ..TransportFaults::default()
        });
        self.start_streaming(h).await?;
        self.stream_for(h, self.max_duration_secs)?;

        let stats = h.engine.ingest().stats();
        let injected = h.transport.stats();
        expect(stats.out_of_order == injected.duplicated_data, || {
            format!("{} rejected, {} duplicated", stats.out_of_order, injected.duplicated_data)
        })?;
        expect(stats.poses_added == h.robot.samples(), || {
            format!("{} poses added, robot sent {}", stats.poses_added, h.robot.samples())
        })?;
        expect(stats.events_added == h.robot.watches() + injected.duplicated_watch, || {
            format!("{} events added", stats.events_added)
        })
    }

    /// DST-005: prefixed lines still parse; junk is either ignored or
    /// counted malformed, never appended.
    async fn run_garbage_lines(&self, h: &mut Harness) -> Result<(), String> {
        h.transport.set_faults(TransportFaults {
            garbage_rate: 0.1,
            prefix: true,
            ..TransportFaults::default()
        });
        self.start_streaming(h).await?;
        self.stream_for(h, self.max_duration_secs)?;

        let stats = h.engine.ingest().stats();
        let injected = h.transport.stats();
        expect(stats.malformed == injected.malformed, || {
            format!("{} malformed counted, {} injected", stats.malformed, injected.malformed)
        })?;
        expect(stats.lines_ignored == injected.noise, || {
            format!("{} ignored, {} noise lines injected", stats.lines_ignored, injected.noise)
        })?;
        expect(stats.poses_added == h.robot.samples(), || {
            format!("{} poses added, robot sent {}", stats.poses_added, h.robot.samples())
        })
    }

    /// DST-006: a hung start is retried after reconnecting; a hung stop
    /// fails without touching the streaming flag.
    async fn run_control_timeout(&self, h: &mut Harness) -> Result<(), String> {
        h.control.script(ControlCommand::Start, [ControlScript::Hang]);
        let before = h.ctx.now();
        self.start_streaming(h).await?;
        let waited = h.ctx.now() - before;
        expect(waited >= h.engine.live().control_timeout(), || {
            format!("start returned after {:?}, before its deadline", waited)
        })?;
        expect(h.control.reconnects() == 1, || "start was not retried".into())?;

        self.stream_for(h, self.max_duration_secs / 2.0)?;

        h.control.script(ControlCommand::Stop, [ControlScript::Hang]);
        expect(h.action(StreamAction::Stop).await == Some(false), || "hung stop reported success".into())?;
        expect(h.engine.live().is_streaming(), || "failed stop cleared the streaming flag".into())?;
        expect(!h.engine.live().is_busy(), || "request still in flight after timeout".into())?;

        let before = h.engine.timeline().len();
        self.stream_for(h, 1.0)?;
        expect(h.engine.timeline().len() > before, || "stream stalled after failed stop".into())?;

        expect(h.action(StreamAction::Stop).await == Some(true), || "second stop failed".into())?;
        let expected = vec![
            ControlCommand::Start,
            ControlCommand::Start,
            ControlCommand::Stop,
            ControlCommand::Stop,
        ];
        expect(h.control.requests() == expected, || format!("requests {:?}", h.control.requests()))
    }

    /// DST-007: kill on a backend without the route falls back to stop, and
    /// lines arriving afterwards are discarded.
    async fn run_kill_fallback(&self, h: &mut Harness) -> Result<(), String> {
        h.control.script(ControlCommand::Kill, [ControlScript::Status(404)]);
        self.start_streaming(h).await?;
        self.stream_for(h, self.max_duration_secs / 2.0)?;

        expect(h.action(StreamAction::Kill).await == Some(true), || "kill failed".into())?;
        expect(!h.engine.live().is_streaming(), || "still streaming after kill".into())?;
        let expected = vec![ControlCommand::Start, ControlCommand::Kill, ControlCommand::Stop];
        expect(h.control.requests() == expected, || format!("requests {:?}", h.control.requests()))?;

        // A backend that keeps talking after the stop
        let frozen = h.engine.timeline().len();
        self.stream_for(h, 1.0)?;
        expect(h.engine.timeline().len() == frozen, || "lines integrated while stopped".into())?;
        expect(h.engine.ingest().pending() == 0, || "backlog kept while stopped".into())?;
        expect(h.engine.play_trajectory() || frozen < 2, || "playback refused after stop".into())
    }

    /// DST-008: seeded gestures; the undo stack unwinds to the empty plan
    /// and redo rebuilds the final one.
    fn run_plan_editing(&self, h: &mut Harness) -> Result<(), String> {
        h.engine.set_mode(AppMode::Planning);
        let mut rng = h.ctx.rng_for("gestures");
        let depth = h.engine.config().plan.undo_depth;
        let gestures = (depth / 2).clamp(1, 40);

        for _ in 0..gestures {
            plan_gesture(&mut h.engine, &mut rng);
            h.metrics.plan_gestures += 1;
            check_invariants(&h.engine)?;
        }

        let final_plan = h.engine.plan().waypoints().to_vec();
        let steps = h.engine.plan().history().undo_len();
        for _ in 0..steps {
            let _ = h.engine.handle_plan(PlanIntent::Key(PlanKey::Undo));
        }
        expect(h.engine.plan().is_empty(), || {
            format!("{} waypoints left after undoing {} steps", h.engine.plan().len(), steps)
        })?;
        expect(!h.engine.plan().can_undo(), || "undo stack not exhausted".into())?;
        for _ in 0..steps {
            let _ = h.engine.handle_plan(PlanIntent::Key(PlanKey::Redo));
        }
        expect(h.engine.plan().waypoints() == final_plan.as_slice(), || {
            "redo did not rebuild the final plan".into()
        })?;

        // Preview runs to the end of the path and stops there
        if h.engine.plan().len() >= 2 {
            let _ = h.engine.handle_plan(PlanIntent::Key(PlanKey::TogglePlayback));
            let total = h.engine.plan().total_length();
            let speed = h.engine.planner().playback().speed();
            let needed = if speed > 0.0 { total / speed + 1.0 } else { 0.0 };
            let dt = self.dt_ms();
            let mut guard = self.frames(needed) + 2;
            while h.engine.planner().playback().is_playing() && guard > 0 {
                h.tick(dt)?;
                guard -= 1;
            }
            expect(!h.engine.planner().playback().is_playing(), || "plan preview never finished".into())?;
            let last = final_plan[final_plan.len() - 1];
            let sample = h.engine.plan_sample();
            expect(
                sample.is_some_and(|s| (s.x - last.x).abs() < 1e-6 && (s.y - last.y).abs() < 1e-6),
                || format!("preview ended at {:?}, last waypoint {:?}", sample, last),
            )?;
        }
        Ok(())
    }
}

/// Random point inside the field, in screen space.
fn random_screen_point(engine: &MotionEngine, rng: &mut ChaCha8Rng) -> Point2<f64> {
    let b = *engine.view().field_bounds();
    let world = Point2::new(
        rng.gen_range(b.min_x + 2.0..b.max_x - 2.0),
        rng.gen_range(b.min_y + 2.0..b.max_y - 2.0),
    );
    engine.view().world_to_screen(world)
}

fn send(engine: &mut MotionEngine, intent: PlanIntent) {
    let _ = engine.handle_plan(intent);
}

/// Applies one random editing gesture.
fn plan_gesture(engine: &mut MotionEngine, rng: &mut ChaCha8Rng) {
    let len = engine.plan().len();

    match rng.gen_range(0..10) {
        // Click: add (or select) a waypoint
        0..=3 => {
            let at = random_screen_point(engine, rng);
            send(engine, PlanIntent::PointerDown { at, button: PointerButton::Primary });
            send(engine, PlanIntent::PointerUp { at });
        }
        // Drag an existing waypoint
        4 if len > 0 => {
            let index = rng.gen_range(0..len);
            let Some(wp) = engine.plan().get(index).copied() else { return };
            let from = engine.view().world_to_screen(wp.position());
            let to = random_screen_point(engine, rng);
            send(engine, PlanIntent::PointerDown { at: from, button: PointerButton::Primary });
            for step in 1..=4 {
                let at = from + (to - from) * (step as f64 / 4.0);
                send(engine, PlanIntent::PointerMove { at });
            }
            send(engine, PlanIntent::PointerUp { at: to });
        }
        // Turn the primary waypoint by its handle
        5 => {
            let handle_px = engine.config().plan.heading_handle_px;
            let handle = engine
                .plan()
                .primary()
                .and_then(|i| engine.plan().handle_position(i, engine.view(), handle_px));
            let centre = engine
                .plan()
                .primary()
                .and_then(|i| engine.plan().get(i))
                .map(|w| engine.view().world_to_screen(w.position()));
            if let (Some(at), Some(centre)) = (handle, centre) {
                let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                let to = centre + nalgebra::Vector2::new(angle.sin(), -angle.cos()) * handle_px;
                send(engine, PlanIntent::PointerDown { at, button: PointerButton::Primary });
                send(engine, PlanIntent::PointerMove { at: to });
                send(engine, PlanIntent::PointerUp { at: to });
            }
        }
        6 => {
            let dx = rng.gen_range(-1.0..=1.0_f64).round();
            let dy = rng.gen_range(-1.0..=1.0_f64).round();
            send(engine, PlanIntent::Key(PlanKey::Nudge { dx, dy, coarse: rng.gen_bool(0.3) }));
        }
        7 => send(engine, PlanIntent::Key(PlanKey::Delete)),
        8 => {
            let value = rng.gen_range(0.0..360.0);
            send(engine, PlanIntent::EditField { field: WaypointField::Theta, value });
        }
        // Rectangle select, sometimes followed by an undo
        _ => {
            let a = random_screen_point(engine, rng);
            let b = random_screen_point(engine, rng);
            send(engine, PlanIntent::PointerDown { at: a, button: PointerButton::Secondary });
            send(engine, PlanIntent::PointerMove { at: b });
            send(engine, PlanIntent::PointerUp { at: b });
            if rng.gen_bool(0.5) {
                send(engine, PlanIntent::Key(PlanKey::Undo));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scenario: ScenarioId, seed: u64) -> ScenarioResult {
        ScenarioRunner::new(seed).with_duration(3.0).run(scenario)
    }

    #[test]
    fn test_every_scenario_passes_on_default_seed() {
        for scenario in ScenarioId::all() {
            let result = run(scenario, 42);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        let a = run(ScenarioId::GarbageLines, 7);
        let b = run(ScenarioId::GarbageLines, 7);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.document, b.document);
    }

    #[test]
    fn test_steady_stream_metrics() {
        let result = run(ScenarioId::SteadyStream, 1);
        assert!(result.passed);
        assert!(result.metrics.poses_added >= 50);
        assert_eq!(result.metrics.sessions, 1);
        assert_eq!(result.document.robot_path.len() as u64, result.metrics.poses_added);
    }

    #[test]
    fn test_burst_overflow_drops_oldest() {
        let result = run(ScenarioId::BurstOverflow, 3);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.queue_dropped > 0);
        assert_eq!(result.metrics.max_pending, 200);
    }

    #[test]
    fn test_plan_editing_records_gestures() {
        let result = run(ScenarioId::PlanEditing, 11);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.plan_gestures, 40);
    }
}
