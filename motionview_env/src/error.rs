//! Error types for the MotionView environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Live transport failed (socket dropped, buffer full, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The streaming backend answered a control request with a failure status
    #[error("Control request failed with status {status}: {message}")]
    Control { status: u16, message: String },

    /// The transport or control channel has been closed
    #[error("Channel closed")]
    Closed,

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a control error from a backend status.
    pub fn control(status: u16, message: impl Into<String>) -> Self {
        Self::Control {
            status,
            message: message.into(),
        }
    }

    /// Returns the backend status code when this is a control failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Control { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the request never completed within its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_status() {
        let err = EnvError::control(404, "no such route");
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Control request failed with status 404: no such route"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = EnvError::Timeout(5000);
        assert!(err.is_timeout());
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "Timeout after 5000ms");
    }
}
