//! Control requests against the companion streaming process.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ControlCommand, ControlReply};

/// Sends start / stop / force-kill requests to the streaming backend.
///
/// Requests are idempotent from the engine's point of view. A reply with a
/// non-success status is returned as `Ok(reply)` so callers can inspect the
/// status (a 404 on kill means "not supported, fall back to stop"); transport
/// level failures are `Err`.
///
/// Deadlines are not the implementor's concern: callers wrap requests with
/// [`crate::with_timeout`].
#[async_trait]
pub trait StreamControl: Send + Sync + 'static {
    /// Issues one control request.
    async fn request(&self, command: ControlCommand) -> Result<ControlReply, EnvError>;

    /// Re-establishes the control connection after a failed request.
    ///
    /// The default has nothing to re-establish.
    async fn reconnect(&self) -> Result<(), EnvError> {
        Ok(())
    }
}
