//! Replays a captured console log through a live engine.

use crate::exporter::SimExport;
use crate::runner::{check_invariants, ScenarioMetrics};
use motionview_core::ingest::IngestStats;
use motionview_core::live_session::{ActionResult, StreamAction};
use motionview_core::{EngineConfig, MotionEngine, SavedDocument};
use tracing::{info, warn};

/// Outcome of a replay.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub lines: u64,
    pub stats: IngestStats,
    /// Integration steps that ran
    pub refreshes: u64,
    pub failure_reason: Option<String>,
    pub document: SavedDocument,
}

impl ReplayReport {
    pub fn passed(&self) -> bool {
        self.failure_reason.is_none()
    }

    pub fn to_export(&self, source: &str) -> SimExport {
        let mut export = SimExport::new(source, 0);
        export.passed = self.passed();
        export.failure_reason = self.failure_reason.clone();
        export.metrics = ScenarioMetrics {
            lines_received: self.lines,
            lines_ignored: self.stats.lines_ignored,
            poses_added: self.stats.poses_added,
            events_added: self.stats.events_added,
            out_of_order: self.stats.out_of_order,
            malformed: self.stats.malformed,
            refreshes: self.refreshes,
            sessions: 1,
            ..ScenarioMetrics::default()
        };
        export.document = self.document.clone();
        export
    }
}

/// Feeds `text` line by line into a streaming engine, integrating after
/// every `batch` lines, and checks the engine invariants after each step.
pub fn replay_log(text: &str, config: &EngineConfig, batch: usize) -> ReplayReport {
    let mut engine = MotionEngine::new(config.clone(), 804.0, 804.0).with_session_seed(0);
    engine.connect_live(0.0);
    if let Some(ticket) = engine.begin_live_action(StreamAction::Start, 0.0) {
        engine.complete_live_action(ticket, ActionResult::Started { retried: false });
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut refreshes = 0;
    let mut failure_reason = None;
    for chunk in lines.chunks(batch.max(1)) {
        for line in chunk {
            engine.push_live_line(line);
        }
        if engine.refresh_live().is_some() {
            refreshes += 1;
        }
        if let Err(reason) = check_invariants(&engine) {
            warn!(%reason, "replay invariant violated");
            failure_reason = Some(reason);
            break;
        }
    }

    let stats = engine.ingest().stats();
    info!(
        lines = lines.len(),
        poses = stats.poses_added,
        events = stats.events_added,
        out_of_order = stats.out_of_order,
        malformed = stats.malformed,
        "replay finished"
    );
    ReplayReport {
        lines: lines.len() as u64,
        stats,
        refreshes,
        failure_reason,
        document: engine.saved_document(),
    }
}
