//! Document formats and debounced saving.
//!
//! Two JSON shapes are understood:
//!
//! - **Saved document**: written by the engine and read back on start.
//!   `{"planned-path": [...], "robot-path": [...], "watches": [...]}`
//! - **Bulk load**: a recorded run. `{"poses": [...], "watches"|"watch"|"events": [...],
//!   "meta": {"units": "..."}}`
//!
//! Readers are lenient per record and strict only about the overall shape.

use crate::error::EngineError;
use crate::events::{Event, EventCorrelator};
use crate::frame::LengthUnit;
use crate::planning::Waypoint;
use crate::pose_timeline::Pose;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

// =============================================================================
// SAVED DOCUMENT
// =============================================================================

/// A pose as persisted. The derived normalized speed is not stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedPose {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub l_vel: Option<f64>,
    pub r_vel: Option<f64>,
    pub speed_raw: f64,
}

impl From<&Pose> for SavedPose {
    fn from(p: &Pose) -> Self {
        Self {
            t: p.t,
            x: p.x,
            y: p.y,
            theta: p.theta,
            l_vel: p.l_vel,
            r_vel: p.r_vel,
            speed_raw: p.speed_raw,
        }
    }
}

impl From<SavedPose> for Pose {
    fn from(s: SavedPose) -> Self {
        let mut pose = Pose::new(s.t, s.x, s.y, s.theta).with_wheels(s.l_vel, s.r_vel);
        pose.speed_raw = s.speed_raw;
        pose
    }
}

/// Everything the engine persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedDocument {
    #[serde(rename = "planned-path", default)]
    pub planned_path: Vec<Waypoint>,
    #[serde(rename = "robot-path", default)]
    pub robot_path: Vec<SavedPose>,
    #[serde(default)]
    pub watches: Vec<Event>,
}

impl SavedDocument {
    pub fn new(waypoints: &[Waypoint], poses: &[Pose], events: &[Event]) -> Self {
        Self {
            planned_path: waypoints.to_vec(),
            robot_path: poses.iter().map(SavedPose::from).collect(),
            watches: events.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Lenient read: malformed entries are skipped or defaulted, missing
    /// sections are empty.
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let root: Value = serde_json::from_str(text)?;
        let obj = root
            .as_object()
            .ok_or_else(|| EngineError::invalid_document("saved document is not an object"))?;

        let planned_path = array(obj.get("planned-path"))
            .iter()
            .filter_map(Waypoint::from_record)
            .collect();
        let mut robot_path: Vec<SavedPose> = array(obj.get("robot-path"))
            .iter()
            .filter_map(Pose::from_record)
            .map(|p| SavedPose::from(&p))
            .collect();
        robot_path.sort_by(|a, b| a.t.total_cmp(&b.t));
        let watches = EventCorrelator::normalize(array(obj.get("watches")));

        Ok(Self {
            planned_path,
            robot_path,
            watches,
        })
    }

    pub fn poses(&self) -> Vec<Pose> {
        self.robot_path.iter().copied().map(Pose::from).collect()
    }
}

fn array(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

// =============================================================================
// BULK LOAD
// =============================================================================

/// A parsed recorded run.
#[derive(Debug, Clone, Default)]
pub struct BulkDocument {
    /// Sorted ascending by time
    pub poses: Vec<Pose>,
    /// Sorted ascending by time
    pub events: Vec<Event>,
    /// From `meta.units`, when present
    pub units: Option<LengthUnit>,
}

impl BulkDocument {
    /// Parses a recorded run. Fails only when the document has no `poses`
    /// array.
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let root: Value = serde_json::from_str(text)?;
        Self::from_value(&root)
    }

    pub fn from_value(root: &Value) -> Result<Self, EngineError> {
        let raw_poses = root
            .get("poses")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::invalid_document("missing poses[]"))?;

        let mut poses: Vec<Pose> = raw_poses.iter().filter_map(Pose::from_record).collect();
        poses.sort_by(|a, b| a.t.total_cmp(&b.t));

        let raw_events = ["watches", "watch", "events"]
            .iter()
            .find_map(|key| root.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let events = EventCorrelator::normalize(raw_events);

        let units = root
            .get("meta")
            .and_then(|m| m.get("units"))
            .and_then(Value::as_str)
            .map(LengthUnit::infer);

        debug!(
            poses = poses.len(),
            dropped = raw_poses.len() - poses.len(),
            events = events.len(),
            "parsed bulk document"
        );
        Ok(Self { poses, events, units })
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Where the saved document lives.
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn read(&self) -> Result<Option<String>, EngineError>;
    fn write(&self, contents: &str) -> Result<(), EngineError>;
}

/// A JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentStore for FileStore {
    fn read(&self) -> Result<Option<String>, EngineError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, contents)?;
        info!(path = %self.path.display(), bytes = contents.len(), "saved document");
        Ok(())
    }
}

/// Document kept under a single key of an embedded sled database, for hosts
/// that already keep their state there.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    const KEY: &'static [u8] = b"motionview/document";

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let db = sled::open(path).map_err(|e| EngineError::Storage(format!("Failed to open sled DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a temporary store (for testing)
    pub fn open_temp() -> Result<Self, EngineError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| EngineError::Storage(format!("Failed to open temp DB: {}", e)))?;
        Ok(Self { db })
    }
}

impl DocumentStore for SledStore {
    fn read(&self) -> Result<Option<String>, EngineError> {
        let bytes = self
            .db
            .get(Self::KEY)
            .map_err(|e| EngineError::Storage(format!("Read failed: {}", e)))?;
        match bytes {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| EngineError::invalid_document(format!("stored document is not UTF-8: {}", e))),
            None => Ok(None),
        }
    }

    fn write(&self, contents: &str) -> Result<(), EngineError> {
        self.db
            .insert(Self::KEY, contents.as_bytes())
            .map_err(|e| EngineError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| EngineError::Storage(format!("Flush failed: {}", e)))?;
        debug!(bytes = contents.len(), "saved document to sled");
        Ok(())
    }
}

/// In-memory store for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Option<String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self) -> Result<Option<String>, EngineError> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> Result<(), EngineError> {
        *self.contents.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(contents.to_string());
        *self.writes.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        Ok(())
    }
}

// =============================================================================
// DEBOUNCE
// =============================================================================

/// Trailing-edge debounce: a save fires once the document has been quiet
/// for `delay_ms`. Each new change pushes the deadline back.
#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    delay_ms: f64,
    due_at_ms: Option<f64>,
}

impl SaveDebouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms: delay_ms as f64,
            due_at_ms: None,
        }
    }

    /// Notes a change at `now_ms`.
    pub fn schedule(&mut self, now_ms: f64) {
        self.due_at_ms = Some(now_ms + self.delay_ms);
    }

    pub fn is_pending(&self) -> bool {
        self.due_at_ms.is_some()
    }

    /// True exactly once when the deadline has passed.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        match self.due_at_ms {
            Some(due) if now_ms >= due => {
                self.due_at_ms = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.due_at_ms = None;
    }
}
