//! Live line transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;

/// Abstraction for the live message stream carrying `[DATA]`/`[WATCH]` lines.
///
/// # Implementations
///
/// - **Production**: `ChannelTransport`, fed by whatever socket task owns the
///   connection to the streaming backend
/// - **Simulation**: `SimTransport`, scripted with bursts and injected faults
///
/// # Line Flow
///
/// ```text
/// Backend                 Transport                 Engine
///   |                         |                        |
///   |-- "...[DATA],..." ----->|                        |
///   |                         |-- try_recv() --------->|-- push into pending queue
///   |                         |                        |-- (refresh tick) integrate
/// ```
///
/// Lines are delivered in arrival order; a transport never reorders.
#[async_trait]
pub trait LineTransport: Send + Sync + 'static {
    /// Waits for the next line.
    ///
    /// # Returns
    /// * `Some(line)` - A line was received (without its trailing newline)
    /// * `None` - The stream was closed
    async fn recv(&self) -> Option<String>;

    /// Takes the next already-arrived line without waiting.
    ///
    /// # Returns
    /// * `Ok(Some(line))` - A line was waiting
    /// * `Ok(None)` - Nothing buffered right now
    /// * `Err(EnvError::Closed)` - The stream has ended and is drained
    fn try_recv(&self) -> Result<Option<String>, EnvError>;

    /// Closes the stream. Lines already buffered may still be drained.
    fn close(&self);
}
