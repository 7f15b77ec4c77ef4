//! Scripted stream-control backend.

use async_trait::async_trait;
use motionview_env::{ControlCommand, ControlReply, EnvError, StreamControl};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// How the backend answers one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScript {
    /// 200
    Ok,
    /// Reply with a non-success status
    Status(u16),
    /// Never answer
    Hang,
    /// Connection-level failure
    Unreachable,
}

/// Backend whose replies are queued per command.
///
/// Commands with nothing queued answer 200.
#[derive(Default)]
pub struct SimControl {
    scripts: Mutex<HashMap<ControlCommand, VecDeque<ControlScript>>>,
    log: Mutex<Vec<ControlCommand>>,
    reconnects: AtomicU64,
}

impl SimControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues replies for `command`, answered in order.
    pub fn script(&self, command: ControlCommand, replies: impl IntoIterator<Item = ControlScript>) {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        scripts.entry(command).or_default().extend(replies);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ControlCommand> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn next_reply(&self, command: ControlCommand) -> ControlScript {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ControlScript::Ok)
    }
}

#[async_trait]
impl StreamControl for SimControl {
    async fn request(&self, command: ControlCommand) -> Result<ControlReply, EnvError> {
        match self.next_reply(command) {
            ControlScript::Ok => Ok(ControlReply::ok()),
            ControlScript::Status(status) => Ok(ControlReply::with_status(status, format!("{command} rejected"))),
            ControlScript::Hang => std::future::pending().await,
            ControlScript::Unreachable => Err(EnvError::transport("backend unreachable")),
        }
    }

    async fn reconnect(&self) -> Result<(), EnvError> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
