//! Core environment context trait for the MotionView engine.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts the wall clock so that playback, the live refresh
/// timer, and control-request timeouts behave identically in production
/// (tokio) and in deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by the harness
#[async_trait]
pub trait EngineContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Drives playback clocks and the refresh interval.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Convenience: current time in fractional milliseconds.
    fn now_ms(&self) -> f64 {
        self.now().as_secs_f64() * 1000.0
    }
}
