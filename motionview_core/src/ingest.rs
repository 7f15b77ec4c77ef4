//! Live ingestion: line protocol, pending queue, incremental integration.
//!
//! # Protocol
//!
//! ```text
//! "[28.08] [INFO]: [DATA],1250,12.5,-3.0,90.0,40,42"
//!                  └── payload starts at the earliest tag
//!
//! [DATA],t,x,y,theta,l_vel,r_vel        (>= 7 fields; t, x, y numeric)
//! [WATCH],t,level,label,value...        (>= 5 fields; value keeps its commas)
//! ```
//!
//! # Flow
//!
//! ```text
//! transport ──push_line()──► LineQueue (bounded, drop-oldest)
//!                                 │ cursor
//!                   refresh tick  ▼
//!                            integrate() ──► PoseTimeline / EventCorrelator
//! ```
//!
//! Lines are integrated strictly in arrival order. Malformed lines and
//! non-increasing samples are dropped and counted, never reported as errors.

use crate::events::{Event, EventCorrelator, EventLevel};
use crate::pose_timeline::{Pose, PoseTimeline};
use crate::speed::SpeedNormalizer;
use motionview_env::SessionId;
use std::collections::VecDeque;
use tracing::debug;

const DATA_TAG: &str = "[DATA]";
const WATCH_TAG: &str = "[WATCH]";

/// Returns the payload starting at the earliest `[DATA]`/`[WATCH]` tag,
/// trimmed, or `None` when the line carries neither.
pub fn strip_to_tag(line: &str) -> Option<&str> {
    let start = match (line.find(DATA_TAG), line.find(WATCH_TAG)) {
        (Some(d), Some(w)) => d.min(w),
        (Some(d), None) => d,
        (None, Some(w)) => w,
        (None, None) => return None,
    };
    let payload = line[start..].trim();
    (!payload.is_empty()).then_some(payload)
}

fn parse_num(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One parsed protocol record.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveRecord {
    Data(Pose),
    Watch(Event),
}

impl LiveRecord {
    /// Parses a tag-stripped payload. `None` for anything malformed.
    pub fn parse(payload: &str) -> Option<LiveRecord> {
        if payload.starts_with("[DATA],") {
            let parts: Vec<&str> = payload.split(',').collect();
            if parts.len() < 7 {
                return None;
            }
            let t = parse_num(parts[1])?;
            let x = parse_num(parts[2])?;
            let y = parse_num(parts[3])?;
            let theta = parse_num(parts[4]).unwrap_or(0.0);
            let l_vel = parse_num(parts[5]);
            let r_vel = parse_num(parts[6]);
            return Some(LiveRecord::Data(Pose::new(t, x, y, theta).with_wheels(l_vel, r_vel)));
        }
        if payload.starts_with("[WATCH],") {
            let parts: Vec<&str> = payload.split(',').collect();
            if parts.len() < 5 {
                return None;
            }
            let t = parse_num(parts[1])?;
            let level = EventLevel::from_raw(parts[2]);
            let label = parts[3].replace(':', "");
            let value = parts[4..].join(",");
            return Some(LiveRecord::Watch(Event::new(t, level, label, value)));
        }
        None
    }

    pub fn t(&self) -> f64 {
        match self {
            LiveRecord::Data(pose) => pose.t,
            LiveRecord::Watch(event) => event.t,
        }
    }
}

// =============================================================================
// PENDING QUEUE
// =============================================================================

/// Bounded arrival-order queue with a consume cursor.
///
/// Overflow drops the oldest lines and pulls the cursor back by the same
/// amount, so unread lines are never skipped twice and memory stays bounded.
#[derive(Debug, Clone)]
pub struct LineQueue {
    lines: VecDeque<String>,
    cursor: usize,
    capacity: usize,
    dropped: u64,
}

impl LineQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
        if self.lines.len() > self.capacity {
            let drop = self.lines.len() - self.capacity;
            self.lines.drain(..drop);
            self.cursor = self.cursor.saturating_sub(drop);
            self.dropped += drop as u64;
        }
    }

    /// Lines not yet consumed.
    pub fn unread(&self) -> usize {
        self.lines.len() - self.cursor
    }

    /// Total buffered lines, consumed or not.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines discarded by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Takes every unread line in arrival order and compacts the buffer.
    pub fn drain_unread(&mut self) -> Vec<String> {
        let start = self.cursor.min(self.lines.len());
        let fresh: Vec<String> = self.lines.drain(start..).collect();
        self.lines.clear();
        self.cursor = 0;
        fresh
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.cursor = 0;
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// What happened to an arriving line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDisposition {
    /// Carried a tag and was queued
    Queued,
    /// No tag; shown to the operator but not queued
    Ignored,
}

/// Outcome of one integration step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub lines_consumed: usize,
    pub poses_added: usize,
    pub events_added: usize,
    pub malformed: usize,
    pub out_of_order: usize,
}

impl IngestReport {
    /// True when the track or event list changed.
    pub fn changed(&self) -> bool {
        self.poses_added > 0 || self.events_added > 0
    }
}

/// Running totals across the connector's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines_received: u64,
    pub lines_ignored: u64,
    pub poses_added: u64,
    pub events_added: u64,
    pub malformed: u64,
    pub out_of_order: u64,
}

/// Parses queued lines into the pose track and event list.
#[derive(Debug, Clone)]
pub struct LiveIngestConnector {
    queue: LineQueue,
    /// Last accepted raw DATA time in the current session
    baseline: Option<f64>,
    /// Shift applied to the current session's timestamps
    session_offset: Option<f64>,
    session: Option<SessionId>,
    stats: IngestStats,
}

impl LiveIngestConnector {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: LineQueue::new(queue_capacity),
            baseline: None,
            session_offset: None,
            session: None,
            stats: IngestStats::default(),
        }
    }

    /// Accepts a raw transport line.
    pub fn push_line(&mut self, raw: &str) -> LineDisposition {
        self.stats.lines_received += 1;
        match strip_to_tag(raw) {
            Some(payload) => {
                self.queue.push(payload.to_string());
                LineDisposition::Queued
            }
            None => {
                self.stats.lines_ignored += 1;
                LineDisposition::Ignored
            }
        }
    }

    pub fn queue(&self) -> &LineQueue {
        &self.queue
    }

    pub fn pending(&self) -> usize {
        self.queue.unread()
    }

    /// Discards buffered lines (streaming paused or stopped).
    pub fn clear_pending(&mut self) {
        self.queue.clear();
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Starts a new run: the monotonic baseline is forgotten so timestamps
    /// may restart from zero.
    pub fn restart_session(&mut self, session: SessionId) {
        debug!(%session, "live session restarted; monotonic baseline reset");
        self.baseline = None;
        self.session_offset = None;
        self.session = Some(session);
    }

    /// Shift that would start the session just after the track head when
    /// its first sample is at `t`.
    fn shift_for(t: f64, timeline: &PoseTimeline) -> f64 {
        match timeline.last() {
            Some(last) if t <= last.t => last.t - t + 1.0,
            _ => 0.0,
        }
    }

    /// Offset for this session, pinned by its first DATA record.
    ///
    /// A run whose clock starts at or before the end of the existing track is
    /// shifted to begin just after it, keeping the track sorted.
    fn offset_for(&mut self, t: f64, timeline: &PoseTimeline) -> f64 {
        *self.session_offset.get_or_insert_with(|| Self::shift_for(t, timeline))
    }

    /// Drains the queue into `timeline` and `events`. O(new lines).
    pub fn integrate(
        &mut self,
        timeline: &mut PoseTimeline,
        events: &mut EventCorrelator,
        speed: &SpeedNormalizer,
    ) -> IngestReport {
        let lines = self.queue.drain_unread();
        let mut report = IngestReport {
            lines_consumed: lines.len(),
            ..IngestReport::default()
        };
        if lines.is_empty() {
            return report;
        }

        // WATCH records seen before the session's first DATA wait for its offset
        let mut held: Vec<Event> = Vec::new();
        for line in &lines {
            match LiveRecord::parse(line) {
                None => {
                    report.malformed += 1;
                }
                Some(LiveRecord::Data(mut pose)) => {
                    if self.baseline.is_some_and(|b| pose.t <= b) {
                        debug!(t = pose.t, baseline = ?self.baseline, "dropping out-of-order sample");
                        report.out_of_order += 1;
                        continue;
                    }
                    let raw_t = pose.t;
                    let offset = self.offset_for(raw_t, timeline);
                    pose.t += offset;
                    speed.apply(&mut pose);
                    if timeline.append_live(pose) {
                        self.baseline = Some(raw_t);
                        report.poses_added += 1;
                    } else {
                        debug!(t = pose.t, "dropping sample behind track head");
                        report.out_of_order += 1;
                    }
                    for mut event in held.drain(..) {
                        event.t += offset;
                        events.insert(event, timeline);
                    }
                }
                Some(LiveRecord::Watch(mut event)) => {
                    report.events_added += 1;
                    match self.session_offset {
                        Some(offset) => {
                            event.t += offset;
                            events.insert(event, timeline);
                        }
                        None => held.push(event),
                    }
                }
            }
        }

        // No DATA yet this session: place the events provisionally without
        // pinning the offset
        if !held.is_empty() {
            let first_t = held.iter().map(|e| e.t).fold(f64::INFINITY, f64::min);
            let shift = Self::shift_for(first_t, timeline);
            for mut event in held {
                event.t += shift;
                events.insert(event, timeline);
            }
        }

        if report.poses_added > 0 {
            events.refresh_approximate(timeline);
        }

        self.stats.poses_added += report.poses_added as u64;
        self.stats.events_added += report.events_added as u64;
        self.stats.malformed += report.malformed as u64;
        self.stats.out_of_order += report.out_of_order as u64;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn integrate(connector: &mut LiveIngestConnector, timeline: &mut PoseTimeline, events: &mut EventCorrelator) -> IngestReport {
        connector.integrate(timeline, events, &SpeedNormalizer::default())
    }

    #[test]
    fn test_strip_to_tag() {
        assert_eq!(strip_to_tag("[28.08] [INFO]: [DATA],1,2,3"), Some("[DATA],1,2,3"));
        assert_eq!(strip_to_tag("x [WATCH],1,a [DATA],2 "), Some("[WATCH],1,a [DATA],2"));
        assert_eq!(strip_to_tag("no tag here"), None);
    }

    #[test]
    fn test_parse_data() {
        let record = LiveRecord::parse("[DATA],1250,12.5,-3.0,x,40,-42").unwrap();
        let LiveRecord::Data(pose) = record else { panic!("expected data") };
        assert_relative_eq!(pose.t, 1250.0);
        assert_relative_eq!(pose.x, 12.5);
        assert_relative_eq!(pose.theta, 0.0);
        assert_relative_eq!(pose.speed_raw, 41.0);

        let LiveRecord::Data(pose) = LiveRecord::parse("[DATA],1,0,0,0,,").unwrap() else { panic!() };
        assert_eq!(pose.l_vel, None);
        assert_relative_eq!(pose.speed_raw, 0.0);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(LiveRecord::parse("[DATA],1,2,3,4,5").is_none());
        assert!(LiveRecord::parse("[DATA],abc,2,3,4,5,6").is_none());
        assert!(LiveRecord::parse("[DATA],1,,3,4,5,6").is_none());
        assert!(LiveRecord::parse("[WATCH],1,INFO,label").is_none());
        assert!(LiveRecord::parse("[WATCH],x,INFO,label,v").is_none());
        assert!(LiveRecord::parse("[DATA]1,2,3,4,5,6,7").is_none());
    }

    #[test]
    fn test_parse_watch_keeps_commas() {
        let LiveRecord::Watch(event) = LiveRecord::parse("[WATCH],500,warning,arm: pos:,1,2,3").unwrap() else {
            panic!("expected watch")
        };
        assert_relative_eq!(event.t, 500.0);
        assert_eq!(event.level, EventLevel::Warn);
        assert_eq!(event.label, "arm pos");
        assert_eq!(event.value, "1,2,3");
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let mut queue = LineQueue::new(3);
        for i in 0..5 {
            queue.push(i.to_string());
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.drain_unread(), vec!["2", "3", "4"]);
        assert_eq!(queue.unread(), 0);
    }

    #[test]
    fn test_integrate_in_arrival_order() {
        let mut connector = LiveIngestConnector::new(100);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        connector.push_line("[DATA],0,0,0,0,0,0");
        connector.push_line("[WATCH],50,INFO,mode,auto");
        connector.push_line("[DATA],50,1,0,0,127,127");
        connector.push_line("[DATA],40,9,9,0,0,0");
        connector.push_line("[DATA],oops");
        assert_eq!(connector.push_line("hello"), LineDisposition::Ignored);

        let report = integrate(&mut connector, &mut timeline, &mut events);
        assert_eq!(report.lines_consumed, 5);
        assert_eq!(report.poses_added, 2);
        assert_eq!(report.events_added, 1);
        assert_eq!(report.out_of_order, 1);
        assert_eq!(report.malformed, 1);
        assert_relative_eq!(timeline.last().unwrap().speed_norm, 1.0);
        assert!(events.markers()[0].ok);

        let idle = integrate(&mut connector, &mut timeline, &mut events);
        assert_eq!(idle, IngestReport::default());
    }

    #[test]
    fn test_duplicate_lines_dropped() {
        let mut connector = LiveIngestConnector::new(100);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        for _ in 0..3 {
            connector.push_line("[DATA],10,1,1,0,0,0");
        }
        let report = integrate(&mut connector, &mut timeline, &mut events);
        assert_eq!(report.poses_added, 1);
        assert_eq!(report.out_of_order, 2);
    }

    #[test]
    fn test_session_restart_shifts_new_run_after_track() {
        let mut connector = LiveIngestConnector::new(100);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        connector.restart_session(SessionId::from_seed(1));
        connector.push_line("[DATA],0,0,0,0,0,0");
        connector.push_line("[DATA],1000,1,0,0,0,0");
        integrate(&mut connector, &mut timeline, &mut events);

        connector.restart_session(SessionId::from_seed(2));
        connector.push_line("[DATA],0,5,5,0,0,0");
        connector.push_line("[WATCH],20,INFO,run,2");
        connector.push_line("[DATA],100,6,6,0,0,0");
        let report = integrate(&mut connector, &mut timeline, &mut events);

        assert_eq!(report.poses_added, 2);
        let times: Vec<f64> = timeline.poses().iter().map(|p| p.t).collect();
        assert_eq!(times, vec![0.0, 1000.0, 1001.0, 1101.0]);
        assert_relative_eq!(events.events()[0].t, 1021.0);
        assert!(events.markers()[0].ok);
    }

    #[test]
    fn test_restart_beginning_with_watch_keeps_every_sample() {
        let mut connector = LiveIngestConnector::new(100);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        connector.push_line("[DATA],0,0,0,0,0,0");
        connector.push_line("[DATA],1000,1,0,0,0,0");
        integrate(&mut connector, &mut timeline, &mut events);

        connector.restart_session(SessionId::from_seed(2));
        connector.push_line("[WATCH],20,INFO,run,2");
        connector.push_line("[DATA],0,5,5,0,0,0");
        connector.push_line("[DATA],10,5,5,0,0,0");
        connector.push_line("[DATA],30,5,5,0,0,0");
        let report = integrate(&mut connector, &mut timeline, &mut events);

        assert_eq!(report.poses_added, 3);
        assert_eq!(report.out_of_order, 0);
        assert_eq!(report.events_added, 1);
        let times: Vec<f64> = timeline.poses().iter().map(|p| p.t).collect();
        assert_eq!(times, vec![0.0, 1000.0, 1001.0, 1011.0, 1031.0]);
        assert_relative_eq!(events.events()[0].t, 1021.0);
    }

    #[test]
    fn test_watch_only_batch_does_not_pin_offset() {
        let mut connector = LiveIngestConnector::new(100);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        connector.push_line("[DATA],1000,1,0,0,0,0");
        integrate(&mut connector, &mut timeline, &mut events);

        connector.restart_session(SessionId::from_seed(2));
        connector.push_line("[WATCH],20,INFO,run,2");
        integrate(&mut connector, &mut timeline, &mut events);
        assert_relative_eq!(events.events()[0].t, 1001.0);

        connector.push_line("[DATA],0,5,5,0,0,0");
        let report = integrate(&mut connector, &mut timeline, &mut events);
        assert_eq!(report.poses_added, 1);
        assert_relative_eq!(timeline.last().unwrap().t, 1001.0);
    }

    #[test]
    fn test_without_restart_old_times_are_rejected() {
        let mut connector = LiveIngestConnector::new(100);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        connector.push_line("[DATA],500,0,0,0,0,0");
        integrate(&mut connector, &mut timeline, &mut events);
        connector.push_line("[DATA],0,0,0,0,0,0");
        let report = integrate(&mut connector, &mut timeline, &mut events);
        assert_eq!(report.out_of_order, 1);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_overflow_bounds_memory_under_burst() {
        let mut connector = LiveIngestConnector::new(10);
        let (mut timeline, mut events) = (PoseTimeline::new(), EventCorrelator::default());
        for t in 0..100 {
            connector.push_line(&format!("[DATA],{},0,0,0,0,0", t));
        }
        assert_eq!(connector.queue().len(), 10);
        let report = integrate(&mut connector, &mut timeline, &mut events);
        assert_eq!(report.poses_added, 10);
        assert_relative_eq!(timeline.first().unwrap().t, 90.0);
        assert_eq!(connector.queue().dropped(), 90);
    }
}
