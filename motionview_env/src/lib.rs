//! MotionView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary that lets the MotionView engine
//! run against a real streaming backend (tokio) or a deterministic simulation.
//!
//! # Core Concept
//!
//! The engine itself is single-threaded and frame-driven. Everything that
//! touches the outside world is intercepted here:
//! - Time (`now()`, `sleep()`)
//! - The live line stream (`recv()`, `try_recv()`)
//! - Control requests against the companion streaming process (`request()`)
//!
//! # Example
//!
//! ```ignore
//! use motionview_env::{EngineContext, LineTransport};
//!
//! async fn pump<Ctx: EngineContext, T: LineTransport>(ctx: &Ctx, transport: &T) {
//!     loop {
//!         while let Ok(Some(line)) = transport.try_recv() {
//!             session.on_line(&line);
//!         }
//!         ctx.sleep(Duration::from_millis(16)).await;
//!     }
//! }
//! ```

mod context;
mod control;
mod error;
mod tokio_impl;
mod transport;
mod types;

pub use context::EngineContext;
pub use control::StreamControl;
pub use error::EnvError;
pub use tokio_impl::{with_timeout, ChannelTransport, TokioContext};
pub use transport::LineTransport;
pub use types::{ControlCommand, ControlReply, SessionId};
