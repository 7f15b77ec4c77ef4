//! MotionView Deterministic Simulation Testing (DST) Harness
//!
//! This crate runs the MotionView engine against a simulated streaming
//! backend where every source of non-determinism is controlled:
//! - **Time**: Virtual clock; sleeps (and so control timeouts) jump it forward
//! - **Transport**: In-memory line stream with duplicates, junk and prefixes
//! - **Control**: Scripted start/stop/kill replies, including hangs and 404s
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Harness                             │
//! │  ┌──────────┐  lines   ┌──────────────┐  push   ┌─────────┐ │
//! │  │ SimRobot ├─────────►│ SimTransport ├────────►│         │ │
//! │  └──────────┘          └──────────────┘         │ Motion  │ │
//! │  ┌────────────┐  start/stop/kill                │ Engine  │ │
//! │  │ SimControl │◄────────────────────────────────┤         │ │
//! │  └────────────┘                                 └────▲────┘ │
//! │  ┌────────────────────────────┐   now / sleep        │      │
//! │  │ SimContext (virtual clock) ├──────────────────────┘      │
//! │  └────────────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use motionview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(10.0)
//!     .run(ScenarioId::SessionRestart);
//! assert!(result.passed);
//! ```

mod context;
mod control;
mod error;
mod exporter;
mod replay;
mod robot;
mod runner;
mod transport;
pub mod scenarios;

pub use context::SimContext;
pub use control::{ControlScript, SimControl};
pub use error::SimError;
pub use exporter::SimExport;
pub use replay::{replay_log, ReplayReport};
pub use robot::{RobotConfig, SimRobot};
pub use runner::{check_invariants, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use transport::{SimTransport, TransportFaults, TransportStats};
