//! Engine error types.
//!
//! Individual malformed records are never errors: they are dropped where they
//! are parsed. Only whole-document failures surface as `EngineError`.

use motionview_env::EnvError;
use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON was valid but did not have the expected shape
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Reading or writing a document failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded document store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport or control request failed
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    /// A configuration value is out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Creates an invalid-document error.
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }
}
