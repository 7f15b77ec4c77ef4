//! Live streaming session: connection and streaming flags, control requests,
//! and the periodic refresh that integrates buffered lines.
//!
//! # Request lifecycle
//!
//! ```text
//!   begin(action, now) ──► ActionTicket ──► execute_action(ctx, control) ──► complete(ticket, result)
//!        │                                        (async, with timeout)             │
//!        └─ refused while in flight or within the cooldown        stale tickets are ignored
//! ```
//!
//! Requests never block the engine: the host runs [`execute_action`] on its
//! executor and reports back with [`LiveSession::complete`]. Disconnecting
//! bumps the session generation, so the outcome of a request issued before
//! the disconnect is dropped instead of awaited.
//!
//! Flags only change on confirmed success. A failed or timed-out request
//! leaves them at their last known value.

use crate::config::IngestConfig;
use crate::events::EventCorrelator;
use crate::ingest::{IngestReport, LiveIngestConnector};
use crate::pose_timeline::PoseTimeline;
use crate::speed::SpeedNormalizer;
use motionview_env::{with_timeout, ControlCommand, EngineContext, EnvError, SessionId, StreamControl};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the operator asked the backend to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Stop,
    /// Force-terminate; falls back to a graceful stop when unsupported
    Kill,
}

impl std::fmt::Display for StreamAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StreamAction::Start => "start",
            StreamAction::Stop => "stop",
            StreamAction::Kill => "kill",
        })
    }
}

/// Outcome of an executed action.
#[derive(Debug)]
pub enum ActionResult {
    Started {
        /// Succeeded only after reconnecting and retrying
        retried: bool,
    },
    Stopped {
        forced: bool,
        /// Kill was unsupported and a graceful stop was used instead
        fell_back: bool,
    },
    Failed(EnvError),
}

/// Proof that an action was admitted; handed back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTicket {
    pub action: StreamAction,
    generation: u64,
}

/// Connection and streaming state for the live backend.
#[derive(Debug, Clone)]
pub struct LiveSession {
    connected: bool,
    streaming: bool,
    in_flight: Option<ActionTicket>,
    last_action_ms: Option<f64>,
    /// Bumped on connect and disconnect
    generation: u64,
    cooldown_ms: f64,
    control_timeout: Duration,
    refresh_interval_ms: f64,
    next_refresh_ms: Option<f64>,
    follow_head: bool,
    session_seed: Option<u64>,
    sessions_started: u64,
    status: Option<String>,
}

impl LiveSession {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            connected: false,
            streaming: false,
            in_flight: None,
            last_action_ms: None,
            generation: 0,
            cooldown_ms: config.action_cooldown_ms as f64,
            control_timeout: Duration::from_millis(config.control_timeout_ms),
            refresh_interval_ms: config.refresh_interval_ms.max(1) as f64,
            next_refresh_ms: None,
            follow_head: config.follow_head,
            session_seed: None,
            sessions_started: 0,
            status: None,
        }
    }

    /// Mints deterministic session ids (simulation).
    pub fn with_session_seed(mut self, seed: u64) -> Self {
        self.session_seed = Some(seed);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// True while a control request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Latest user-facing status line.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn control_timeout(&self) -> Duration {
        self.control_timeout
    }

    pub fn follow_head(&self) -> bool {
        self.follow_head
    }

    pub fn set_follow_head(&mut self, on: bool) {
        self.follow_head = on;
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    /// The action a start/stop toggle should issue now.
    pub fn toggle_action(&self) -> StreamAction {
        if self.streaming {
            StreamAction::Stop
        } else {
            StreamAction::Start
        }
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    pub fn connect(&mut self, now_ms: f64) {
        if self.connected {
            return;
        }
        self.generation += 1;
        self.connected = true;
        self.streaming = false;
        self.in_flight = None;
        self.next_refresh_ms = Some(now_ms + self.refresh_interval_ms);
        self.status = Some("Connected".into());
        info!(generation = self.generation, "live session connected");
    }

    /// Drops the connection. Outstanding requests are abandoned.
    pub fn disconnect(&mut self) {
        if let Some(ticket) = self.in_flight.take() {
            debug!(action = %ticket.action, "abandoning in-flight request");
        }
        self.generation += 1;
        self.connected = false;
        self.streaming = false;
        self.next_refresh_ms = None;
        self.status = Some("Disconnected".into());
        info!(generation = self.generation, "live session disconnected");
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Admits an action, or refuses it while disconnected, while another
    /// request is in flight, or within the cooldown after the previous one.
    pub fn begin(&mut self, action: StreamAction, now_ms: f64) -> Option<ActionTicket> {
        if !self.connected || self.in_flight.is_some() {
            return None;
        }
        if self.last_action_ms.is_some_and(|last| now_ms - last < self.cooldown_ms) {
            debug!(%action, "action refused: cooldown");
            return None;
        }
        let ticket = ActionTicket {
            action,
            generation: self.generation,
        };
        self.last_action_ms = Some(now_ms);
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Applies an action's outcome. Returns false for a stale ticket.
    pub fn complete(
        &mut self,
        ticket: ActionTicket,
        result: ActionResult,
        ingest: &mut LiveIngestConnector,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(action = %ticket.action, "discarding outcome from an earlier connection");
            return false;
        }
        self.in_flight = None;

        match result {
            ActionResult::Started { retried } => {
                self.streaming = true;
                let session = self.mint_session();
                ingest.restart_session(session);
                self.status = Some(if retried {
                    "Streaming started (after retry)".into()
                } else {
                    "Streaming started".into()
                });
                info!(%session, retried, "streaming started");
            }
            ActionResult::Stopped { forced, fell_back } => {
                self.streaming = false;
                ingest.clear_pending();
                self.status = Some(if forced && !fell_back {
                    "Force-killed".into()
                } else {
                    "Streaming stopped".into()
                });
                info!(forced, fell_back, "streaming stopped");
            }
            ActionResult::Failed(error) => {
                warn!(action = %ticket.action, %error, "control request failed");
                self.status = Some(format!("{} failed: {}", ticket.action, error));
            }
        }
        true
    }

    fn mint_session(&mut self) -> SessionId {
        self.sessions_started += 1;
        match self.session_seed {
            Some(seed) => SessionId::from_seed(seed.wrapping_add(self.sessions_started)),
            None => SessionId::new(),
        }
    }

    /// Admits, executes and completes an action in one call.
    ///
    /// `None` when the action was refused.
    pub async fn run_action<Ctx, C>(
        &mut self,
        ctx: &Ctx,
        control: &C,
        action: StreamAction,
        ingest: &mut LiveIngestConnector,
    ) -> Option<bool>
    where
        Ctx: EngineContext + ?Sized,
        C: StreamControl + ?Sized,
    {
        let ticket = self.begin(action, ctx.now_ms())?;
        let result = execute_action(ctx, control, self.control_timeout, action).await;
        let succeeded = !matches!(result, ActionResult::Failed(_));
        self.complete(ticket, result, ingest);
        Some(succeeded)
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// True when the refresh interval has elapsed; schedules the next one.
    pub fn refresh_due(&mut self, now_ms: f64) -> bool {
        match self.next_refresh_ms {
            Some(next) if self.connected && now_ms >= next => {
                let following = next + self.refresh_interval_ms;
                self.next_refresh_ms = Some(if following > now_ms {
                    following
                } else {
                    now_ms + self.refresh_interval_ms
                });
                true
            }
            _ => false,
        }
    }

    /// One refresh step. Integrates buffered lines while streaming and
    /// discards them otherwise, so the backlog cannot grow while paused.
    pub fn refresh(
        &self,
        ingest: &mut LiveIngestConnector,
        timeline: &mut PoseTimeline,
        events: &mut EventCorrelator,
        speed: &SpeedNormalizer,
    ) -> Option<IngestReport> {
        if !self.connected {
            return None;
        }
        if !self.streaming {
            ingest.clear_pending();
            return None;
        }
        Some(ingest.integrate(timeline, events, speed))
    }
}

/// Executes one action against the backend with the configured deadline.
///
/// - `Start` that fails or times out reconnects and retries once.
/// - `Kill` answered with 404 falls back to `Stop`.
pub async fn execute_action<Ctx, C>(
    ctx: &Ctx,
    control: &C,
    timeout: Duration,
    action: StreamAction,
) -> ActionResult
where
    Ctx: EngineContext + ?Sized,
    C: StreamControl + ?Sized,
{
    match action {
        StreamAction::Start => match request(ctx, control, timeout, ControlCommand::Start).await {
            Ok(()) => ActionResult::Started { retried: false },
            Err(EnvError::Control { status, message }) => {
                ActionResult::Failed(EnvError::Control { status, message })
            }
            Err(first) => {
                warn!(error = %first, "start failed; reconnecting and retrying once");
                if let Err(e) = control.reconnect().await {
                    return ActionResult::Failed(e);
                }
                match request(ctx, control, timeout, ControlCommand::Start).await {
                    Ok(()) => ActionResult::Started { retried: true },
                    Err(e) => ActionResult::Failed(e),
                }
            }
        },
        StreamAction::Stop => match request(ctx, control, timeout, ControlCommand::Stop).await {
            Ok(()) => ActionResult::Stopped { forced: false, fell_back: false },
            Err(e) => ActionResult::Failed(e),
        },
        StreamAction::Kill => match request(ctx, control, timeout, ControlCommand::Kill).await {
            Ok(()) => ActionResult::Stopped { forced: true, fell_back: false },
            Err(e) if e.status() == Some(404) => {
                debug!("kill unsupported; falling back to stop");
                match request(ctx, control, timeout, ControlCommand::Stop).await {
                    Ok(()) => ActionResult::Stopped { forced: true, fell_back: true },
                    Err(e) => ActionResult::Failed(e),
                }
            }
            Err(e) => ActionResult::Failed(e),
        },
    }
}

/// One request under a deadline; non-2xx replies become `EnvError::Control`.
async fn request<Ctx, C>(ctx: &Ctx, control: &C, timeout: Duration, command: ControlCommand) -> Result<(), EnvError>
where
    Ctx: EngineContext + ?Sized,
    C: StreamControl + ?Sized,
{
    let reply = with_timeout(ctx, timeout, control.request(command)).await?;
    if reply.is_success() {
        Ok(())
    } else {
        Err(EnvError::control(reply.status, reply.message.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use motionview_env::{ControlReply, TokioContext};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Script {
        Reply(u16),
        Hang,
    }

    /// Replies from a script; an exhausted script answers 200.
    struct ScriptedControl {
        script: Mutex<VecDeque<Script>>,
        log: Mutex<Vec<ControlCommand>>,
        reconnects: Mutex<usize>,
    }

    impl ScriptedControl {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                log: Mutex::new(Vec::new()),
                reconnects: Mutex::new(0),
            }
        }

        fn log(&self) -> Vec<ControlCommand> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StreamControl for ScriptedControl {
        async fn request(&self, command: ControlCommand) -> Result<ControlReply, EnvError> {
            self.log.lock().unwrap().push(command);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Script::Hang) => std::future::pending().await,
                Some(Script::Reply(status)) if status != 200 => {
                    Ok(ControlReply::with_status(status, "scripted"))
                }
                _ => Ok(ControlReply::ok()),
            }
        }

        async fn reconnect(&self) -> Result<(), EnvError> {
            *self.reconnects.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn config() -> IngestConfig {
        IngestConfig {
            control_timeout_ms: 20,
            ..IngestConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let ctx = TokioContext::new();
        let control = ScriptedControl::new(vec![]);
        let mut ingest = LiveIngestConnector::new(16);
        let mut session = LiveSession::new(&config());
        session.connect(0.0);

        assert_eq!(session.run_action(&ctx, &control, StreamAction::Start, &mut ingest).await, Some(true));
        assert!(session.is_streaming());
        assert!(ingest.session().is_some());

        ingest.push_line("[DATA],1,0,0,0,0,0");
        // The cooldown refuses an immediate second action
        let ticket = session.begin(StreamAction::Stop, ctx.now_ms());
        assert!(ticket.is_none());

        let ticket = session.begin(StreamAction::Stop, ctx.now_ms() + 1000.0).unwrap();
        let result = execute_action(&ctx, &control, session.control_timeout(), ticket.action).await;
        assert!(session.complete(ticket, result, &mut ingest));
        assert!(!session.is_streaming());
        assert_eq!(ingest.pending(), 0);
        assert_eq!(control.log(), vec![ControlCommand::Start, ControlCommand::Stop]);
    }

    #[tokio::test]
    async fn test_start_timeout_retries_once() {
        let ctx = TokioContext::new();
        let control = ScriptedControl::new(vec![Script::Hang, Script::Reply(200)]);
        let result = execute_action(&ctx, &control, Duration::from_millis(20), StreamAction::Start).await;
        assert!(matches!(result, ActionResult::Started { retried: true }));
        assert_eq!(*control.reconnects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_keeps_flag() {
        let ctx = TokioContext::new();
        let control = ScriptedControl::new(vec![Script::Hang, Script::Hang]);
        let mut ingest = LiveIngestConnector::new(16);
        let mut session = LiveSession::new(&config());
        session.connect(0.0);

        assert_eq!(session.run_action(&ctx, &control, StreamAction::Start, &mut ingest).await, Some(false));
        assert!(!session.is_streaming());
        assert!(!session.is_busy());
        assert!(session.status().unwrap().starts_with("start failed"));
    }

    #[tokio::test]
    async fn test_kill_falls_back_to_stop() {
        let ctx = TokioContext::new();
        let control = ScriptedControl::new(vec![Script::Reply(404), Script::Reply(200)]);
        let result = execute_action(&ctx, &control, Duration::from_millis(20), StreamAction::Kill).await;
        assert!(matches!(result, ActionResult::Stopped { forced: true, fell_back: true }));
        assert_eq!(control.log(), vec![ControlCommand::Kill, ControlCommand::Stop]);

        let control = ScriptedControl::new(vec![Script::Reply(500)]);
        let result = execute_action(&ctx, &control, Duration::from_millis(20), StreamAction::Kill).await;
        assert!(matches!(result, ActionResult::Failed(EnvError::Control { status: 500, .. })));
    }

    #[test]
    fn test_stale_outcome_ignored_after_disconnect() {
        let mut ingest = LiveIngestConnector::new(16);
        let mut session = LiveSession::new(&config());
        session.connect(0.0);
        let ticket = session.begin(StreamAction::Start, 0.0).unwrap();
        session.disconnect();
        session.connect(10.0);

        assert!(!session.complete(ticket, ActionResult::Started { retried: false }, &mut ingest));
        assert!(!session.is_streaming());
        assert!(ingest.session().is_none());
    }

    #[test]
    fn test_actions_need_connection() {
        let mut session = LiveSession::new(&config());
        assert!(session.begin(StreamAction::Start, 0.0).is_none());
    }

    #[test]
    fn test_refresh_discards_backlog_when_not_streaming() {
        let mut ingest = LiveIngestConnector::new(16);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        let mut session = LiveSession::new(&config());
        session.connect(0.0);

        assert!(!session.refresh_due(499.0));
        assert!(session.refresh_due(500.0));
        assert!(!session.refresh_due(700.0));
        assert!(session.refresh_due(1000.0));

        ingest.push_line("[DATA],1,0,0,0,0,0");
        let report = session.refresh(&mut ingest, &mut timeline, &mut events, &SpeedNormalizer::default());
        assert!(report.is_none());
        assert_eq!(ingest.pending(), 0);
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_refresh_integrates_while_streaming() {
        let mut ingest = LiveIngestConnector::new(16);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        let mut session = LiveSession::new(&config()).with_session_seed(9);
        session.connect(0.0);
        let ticket = session.begin(StreamAction::Start, 0.0).unwrap();
        session.complete(ticket, ActionResult::Started { retried: false }, &mut ingest);
        assert_eq!(ingest.session(), Some(SessionId::from_seed(10)));

        ingest.push_line("[DATA],1,0,0,0,0,0");
        ingest.push_line("[DATA],2,1,0,0,0,0");
        let report = session
            .refresh(&mut ingest, &mut timeline, &mut events, &SpeedNormalizer::default())
            .unwrap();
        assert_eq!(report.poses_added, 2);
        assert_eq!(timeline.len(), 2);
    }
}
