//! Discrete events ("watches") and their correlation to the pose track.
//!
//! Events are an independent sequence sorted by time. Each event is bound to
//! the track by time proximity: a sample within the tolerance window gives an
//! exact marker, anything else an approximate marker placed at the
//! interpolated pose. A tolerance miss is never an error.

use crate::pose_timeline::{Pose, PoseTimeline};
use crate::record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    #[default]
    Info,
    Warn,
    Error,
    Debug,
}

impl EventLevel {
    /// Maps free-form level text. Case-insensitive substring match;
    /// FATAL counts as ERROR and unknown text as INFO.
    pub fn from_raw(raw: &str) -> EventLevel {
        let upper = raw.to_uppercase();
        if upper.contains("ERROR") || upper.contains("FATAL") {
            EventLevel::Error
        } else if upper.contains("WARN") {
            EventLevel::Warn
        } else if upper.contains("DEBUG") {
            EventLevel::Debug
        } else {
            EventLevel::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
            EventLevel::Debug => "DEBUG",
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled value sampled at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Timestamp in milliseconds
    pub t: f64,
    pub level: EventLevel,
    pub label: String,
    pub value: String,
}

impl Event {
    pub fn new(t: f64, level: EventLevel, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            t,
            level,
            label: label.into(),
            value: value.into(),
        }
    }

    /// Builds an event from an alias-tolerant record.
    ///
    /// | field | aliases |
    /// |-------|---------|
    /// | t     | `t`, `timestamp`, `time`, `ms` |
    /// | level | `level`, `lvl`, `severity` |
    /// | label | `label`, `name` |
    /// | value | `value`, `val`, `message` |
    ///
    /// Only the time is mandatory.
    pub fn from_record(value: &Value) -> Option<Event> {
        let obj = value.as_object()?;
        let t = record::number_field(obj, &["t", "timestamp", "time", "ms"])?;
        let level = record::field(obj, &["level", "lvl", "severity"])
            .map(|v| EventLevel::from_raw(&record::text(v)))
            .unwrap_or_default();
        let label = record::field(obj, &["label", "name"])
            .map(record::text)
            .unwrap_or_default();
        let value = record::field(obj, &["value", "val", "message"])
            .map(record::text)
            .unwrap_or_default();
        Some(Event { t, level, label, value })
    }
}

/// An event placed on the track.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMarker {
    pub event: Event,
    /// True when a sample lies within the tolerance window
    pub ok: bool,
    /// Index of the matched sample when `ok`
    pub pose_index: Option<usize>,
    /// |Δt| to the matched sample when `ok`
    pub dt: Option<f64>,
    /// Matched sample, or the interpolated pose for approximate markers
    pub pose: Pose,
}

impl EventMarker {
    pub fn t(&self) -> f64 {
        self.event.t
    }
}

/// Event sequence plus its markers on a pose track.
///
/// Markers are either absent (no track to place them on yet) or parallel to
/// the event list, one per event in the same order.
#[derive(Debug, Clone)]
pub struct EventCorrelator {
    events: Vec<Event>,
    markers: Vec<EventMarker>,
    tolerance_ms: f64,
}

impl Default for EventCorrelator {
    fn default() -> Self {
        Self::new(40.0)
    }
}

impl EventCorrelator {
    pub fn new(tolerance_ms: f64) -> Self {
        Self {
            events: Vec::new(),
            markers: Vec::new(),
            tolerance_ms,
        }
    }

    pub fn tolerance_ms(&self) -> f64 {
        self.tolerance_ms
    }

    /// Parses raw records, dropping those without a numeric time, and
    /// stable-sorts ascending.
    pub fn normalize(raw: &[Value]) -> Vec<Event> {
        let mut events: Vec<Event> = raw.iter().filter_map(Event::from_record).collect();
        events.sort_by(|a, b| a.t.total_cmp(&b.t));
        events
    }

    /// Replaces all events. Markers are invalidated until rebuilt.
    pub fn set_events(&mut self, mut events: Vec<Event>) {
        events.sort_by(|a, b| a.t.total_cmp(&b.t));
        self.events = events;
        self.markers.clear();
    }

    /// Replaces all events from raw records; returns how many were kept.
    pub fn load(&mut self, raw: &[Value]) -> usize {
        self.set_events(Self::normalize(raw));
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.markers.clear();
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn markers(&self) -> &[EventMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn correlate(&self, event: &Event, timeline: &PoseTimeline) -> Option<EventMarker> {
        if let Some(hit) = timeline.nearest_within_tolerance(event.t, self.tolerance_ms) {
            let pose = *timeline.get(hit.index)?;
            return Some(EventMarker {
                event: event.clone(),
                ok: true,
                pose_index: Some(hit.index),
                dt: Some(hit.dt),
                pose,
            });
        }
        let pose = timeline.interpolate_at(event.t)?;
        Some(EventMarker {
            event: event.clone(),
            ok: false,
            pose_index: None,
            dt: None,
            pose,
        })
    }

    /// Rebuilds every marker against `timeline`. O(m log n).
    pub fn build_markers(&mut self, timeline: &PoseTimeline) {
        if timeline.is_empty() {
            self.markers.clear();
            return;
        }
        let markers: Vec<EventMarker> = self
            .events
            .iter()
            .filter_map(|e| self.correlate(e, timeline))
            .collect();
        self.markers = markers;
    }

    /// Re-correlates approximate markers after the track has grown.
    ///
    /// Exact markers stay valid because existing samples never change.
    pub fn refresh_approximate(&mut self, timeline: &PoseTimeline) {
        if self.markers.len() != self.events.len() {
            self.build_markers(timeline);
            return;
        }
        for i in 0..self.markers.len() {
            if self.markers[i].ok {
                continue;
            }
            if let Some(marker) = self.correlate(&self.markers[i].event, timeline) {
                self.markers[i] = marker;
            }
        }
    }

    /// Inserts one event in time order (after equal times) and places it.
    pub fn insert(&mut self, event: Event, timeline: &PoseTimeline) {
        let at = self.events.partition_point(|e| e.t <= event.t);
        let placed = self.markers.len() == self.events.len() && !timeline.is_empty();
        let marker = if placed { self.correlate(&event, timeline) } else { None };
        self.events.insert(at, event);
        match marker {
            Some(marker) => self.markers.insert(at, marker),
            None => self.build_markers(timeline),
        }
    }

    /// Latest marker at or before `t`. O(log n).
    pub fn last_at_or_before(&self, t: f64) -> Option<&EventMarker> {
        let upper = self.markers.partition_point(|m| m.t() <= t);
        upper.checked_sub(1).and_then(|i| self.markers.get(i))
    }

    /// Event closest in time to `t`, with its |Δt|. O(log n).
    pub fn closest_to(&self, t: f64) -> Option<(&Event, f64)> {
        let upper = self.events.partition_point(|e| e.t <= t);
        let before = upper.checked_sub(1).and_then(|i| self.events.get(i));
        let after = self.events.get(upper);
        match (before, after) {
            (Some(b), Some(a)) => {
                let (db, da) = ((t - b.t).abs(), (a.t - t).abs());
                if db <= da { Some((b, db)) } else { Some((a, da)) }
            }
            (Some(b), None) => Some((b, (t - b.t).abs())),
            (None, Some(a)) => Some((a, (a.t - t).abs())),
            (None, None) => None,
        }
    }

    /// Most recent value per label at or before `t`, in label order.
    pub fn latest_by_label(&self, t: f64) -> Vec<&Event> {
        let upper = self.events.partition_point(|e| e.t <= t);
        let mut latest: std::collections::BTreeMap<&str, &Event> = std::collections::BTreeMap::new();
        for event in &self.events[..upper] {
            latest.insert(event.label.as_str(), event);
        }
        latest.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn track_every_50ms(n: usize) -> PoseTimeline {
        PoseTimeline::from_poses(
            (0..n).map(|i| Pose::new(i as f64 * 50.0, i as f64, 0.0, 0.0)).collect(),
        )
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(EventLevel::from_raw("error"), EventLevel::Error);
        assert_eq!(EventLevel::from_raw("FATAL!"), EventLevel::Error);
        assert_eq!(EventLevel::from_raw("Warning"), EventLevel::Warn);
        assert_eq!(EventLevel::from_raw("debug"), EventLevel::Debug);
        assert_eq!(EventLevel::from_raw("trace"), EventLevel::Info);
        assert_eq!(EventLevel::from_raw(""), EventLevel::Info);
    }

    #[test]
    fn test_normalize_aliases() {
        let events = EventCorrelator::normalize(&[
            json!({ "timestamp": 300, "severity": "warn", "name": "battery", "val": 11.9 }),
            json!({ "ms": "100", "lvl": "ERROR", "label": "motor", "message": "stall, left" }),
            json!({ "label": "no time" }),
            json!({ "t": 200 }),
        ]);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].t, 100.0);
        assert_eq!(events[0].level, EventLevel::Error);
        assert_eq!(events[0].value, "stall, left");
        assert_eq!(events[1].label, "");
        assert_eq!(events[1].level, EventLevel::Info);
        assert_eq!(events[2].label, "battery");
        assert_eq!(events[2].value, "11.9");
    }

    #[test]
    fn test_marker_within_tolerance_is_exact() {
        let track = track_every_50ms(10);
        let mut correlator = EventCorrelator::new(40.0);
        correlator.set_events(vec![Event::new(100.0, EventLevel::Info, "A", "")]);
        correlator.build_markers(&track);

        let marker = &correlator.markers()[0];
        assert!(marker.ok);
        assert_eq!(marker.pose_index, Some(2));
        assert_eq!(marker.pose.t, 100.0);
    }

    #[test]
    fn test_marker_outside_tolerance_is_approximate() {
        let track = PoseTimeline::from_poses(vec![
            Pose::new(0.0, 0.0, 0.0, 0.0),
            Pose::new(1000.0, 10.0, 0.0, 0.0),
        ]);
        let mut correlator = EventCorrelator::new(40.0);
        correlator.set_events(vec![Event::new(250.0, EventLevel::Warn, "B", "")]);
        correlator.build_markers(&track);

        let marker = &correlator.markers()[0];
        assert!(!marker.ok);
        assert_eq!(marker.pose_index, None);
        assert_relative_eq!(marker.pose.x, 2.5);
    }

    #[test]
    fn test_no_markers_without_track() {
        let mut correlator = EventCorrelator::default();
        correlator.set_events(vec![Event::new(1.0, EventLevel::Info, "A", "")]);
        correlator.build_markers(&PoseTimeline::new());
        assert!(correlator.markers().is_empty());
        assert!(correlator.last_at_or_before(10.0).is_none());
    }

    #[test]
    fn test_last_at_or_before() {
        let track = track_every_50ms(20);
        let mut correlator = EventCorrelator::default();
        correlator.set_events(vec![
            Event::new(100.0, EventLevel::Info, "a", "1"),
            Event::new(300.0, EventLevel::Info, "b", "2"),
            Event::new(300.0, EventLevel::Info, "c", "3"),
            Event::new(700.0, EventLevel::Info, "d", "4"),
        ]);
        correlator.build_markers(&track);

        assert!(correlator.last_at_or_before(99.0).is_none());
        assert_eq!(correlator.last_at_or_before(100.0).unwrap().event.label, "a");
        assert_eq!(correlator.last_at_or_before(300.0).unwrap().event.label, "c");
        assert_eq!(correlator.last_at_or_before(699.0).unwrap().event.label, "c");
        assert_eq!(correlator.last_at_or_before(1e9).unwrap().event.label, "d");
    }

    #[test]
    fn test_insert_keeps_order_and_markers_parallel() {
        let track = track_every_50ms(20);
        let mut correlator = EventCorrelator::default();
        correlator.insert(Event::new(500.0, EventLevel::Info, "late", ""), &track);
        correlator.insert(Event::new(100.0, EventLevel::Info, "early", ""), &track);
        correlator.insert(Event::new(500.0, EventLevel::Info, "late2", ""), &track);

        let labels: Vec<&str> = correlator.events().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["early", "late", "late2"]);
        assert_eq!(correlator.markers().len(), 3);
        assert_eq!(correlator.markers()[2].event.label, "late2");
    }

    #[test]
    fn test_refresh_approximate_after_growth() {
        let mut track = track_every_50ms(3); // 0..100ms
        let mut correlator = EventCorrelator::default();
        correlator.insert(Event::new(400.0, EventLevel::Info, "ahead", ""), &track);
        assert!(!correlator.markers()[0].ok);

        for i in 3..10 {
            track.append_live(Pose::new(i as f64 * 50.0, i as f64, 0.0, 0.0));
        }
        correlator.refresh_approximate(&track);
        assert!(correlator.markers()[0].ok);
        assert_eq!(correlator.markers()[0].pose_index, Some(8));
    }

    #[test]
    fn test_closest_and_latest_by_label() {
        let mut correlator = EventCorrelator::default();
        correlator.set_events(vec![
            Event::new(100.0, EventLevel::Info, "volt", "12.1"),
            Event::new(200.0, EventLevel::Info, "amp", "3"),
            Event::new(300.0, EventLevel::Info, "volt", "11.8"),
        ]);
        let (event, dt) = correlator.closest_to(260.0).unwrap();
        assert_eq!(event.t, 300.0);
        assert_relative_eq!(dt, 40.0);
        let (event, _) = correlator.closest_to(150.0).unwrap();
        assert_eq!(event.t, 100.0);

        let latest = correlator.latest_by_label(250.0);
        let values: Vec<&str> = latest.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["3", "12.1"]);
    }
}
