//! Error types for the simulation harness.

use motionview_core::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The async runtime could not be built
    #[error("Runtime error: {0}")]
    Runtime(String),
}
