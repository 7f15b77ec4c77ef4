//! Common types for the MotionView environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one live streaming run.
///
/// A new id is minted every time streaming starts, so log lines and exported
/// documents can tell consecutive runs apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SessionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A control request understood by the streaming backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    /// Begin streaming records
    Start,
    /// Stop streaming gracefully
    Stop,
    /// Force-terminate the streaming process
    Kill,
}

impl ControlCommand {
    /// Route on the backend's control surface.
    pub fn path(&self) -> &'static str {
        match self {
            ControlCommand::Start => "/start",
            ControlCommand::Stop => "/stop",
            ControlCommand::Kill => "/kill",
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::Kill => "kill",
        };
        f.write_str(name)
    }
}

/// Backend answer to a control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    /// HTTP-style status code
    pub status: u16,

    /// Optional human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlReply {
    /// A 200 reply.
    pub fn ok() -> Self {
        Self {
            status: 200,
            message: None,
        }
    }

    /// A reply with the given status and message.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the backend does not know the route.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}
