pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The relay clones this to push events to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Identifier of one live socket, reported to clients as `socketId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection: its id plus the channel feeding its writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: HandleId,
    tx: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(tx: ConnectionSender) -> Self {
        Self {
            id: HandleId::new(),
            tx,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn sender(&self) -> &ConnectionSender {
        &self.tx
    }
}
