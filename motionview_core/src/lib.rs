//! MotionView Core - Temporal/Spatial Data Engine for Robot Runs
//!
//! This library turns a robot's recorded or live-streamed poses and telemetry
//! events into something an operator can scrub, replay and plan against:
//! 1. **Time**: a sorted pose track with interpolation, nearest-sample
//!    lookup and tolerance-based event correlation
//! 2. **Space**: a rotatable, zoomable field view mapping inches to pixels
//! 3. **Planning**: an editable waypoint path with undo/redo and
//!    constant-speed preview along its arc length
//!
//! # Architecture
//!
//! ```text
//!  transport lines ─► LiveIngestConnector ─┐
//!  bulk/saved JSON ─► persistence ─────────┼─► PoseTimeline ─► DisplayController
//!                                          └─► EventCorrelator      │
//!  pointer / keys ──► MotionEngine ─► PlanEditor ─► PlanningDocument │
//!                          │                                        ▼
//!                          └──────────► ViewTransform ◄──── PoseFrame
//! ```
//!
//! `MotionEngine` owns everything and is driven by intents, frame ticks and
//! live lines. I/O (clock, transport, control requests) lives behind the
//! traits in `motionview_env`.

pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod live_session;
pub mod persistence;
pub mod plan_editor;
pub mod plan_history;
pub mod planning;
pub mod playback;
pub mod pose_timeline;
pub mod record;
pub mod speed;
pub mod view_transform;

// Re-export key types for convenience
pub use config::EngineConfig;
pub use display::{DisplayController, DisplayState, DisplayedPose, TrackPick};
pub use engine::{AppMode, MotionEngine, ViewIntent};
pub use error::EngineError;
pub use events::{Event, EventCorrelator, EventLevel, EventMarker};
pub use frame::{LengthUnit, PoseFrame};
pub use geometry::{FieldBounds, FieldRotation, ScreenPoint, WorldPoint};
pub use ingest::{IngestReport, LineDisposition, LiveIngestConnector};
pub use live_session::{execute_action, ActionResult, ActionTicket, LiveSession, StreamAction};
pub use persistence::{BulkDocument, DocumentStore, FileStore, MemoryStore, SaveDebouncer, SavedDocument, SledStore};
pub use plan_editor::{PlanEditor, PlanIntent, PlanKey, PlanOutcome, PointerButton};
pub use planning::{PlanSample, PlanningDocument, Waypoint, WaypointField};
pub use pose_timeline::{Pose, PoseTimeline};
pub use speed::SpeedNormalizer;
pub use view_transform::ViewTransform;
