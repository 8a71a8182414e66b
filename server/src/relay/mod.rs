//! Signaling relay for proctoring streams.
//!
//! Pairs a student's camera feed with a teacher's viewer and forwards
//! WebRTC signaling between the two. All state is in memory and owned by a
//! single [`Relay`] built at server start.

pub mod connections;
pub mod lifecycle;
pub mod router;
pub mod sessions;
pub mod types;

use parking_lot::Mutex;
use thiserror::Error;

use crate::ws::broadcast::{force_close, send_event};
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionHandle;
use connections::ConnectionRegistry;
use sessions::SessionRegistry;
use types::{Role, TestId};

/// Close code sent to a socket whose user registered again elsewhere.
pub const CLOSE_SUPERSEDED: u16 = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Target user not connected")]
    UnknownRecipient { to: String },
}

/// Owns the connection and session registries.
///
/// Operations that read one registry and write the other (register, start,
/// stop, disconnect) run under `ops`, so a disconnect can never slip between
/// a session's handle lookup and its insert.
#[derive(Debug, Default)]
pub struct Relay {
    connections: ConnectionRegistry,
    sessions: SessionRegistry,
    ops: Mutex<()>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Bind `user_id` to the calling socket and acknowledge with its socket id.
    ///
    /// A different socket previously bound to the same user is closed with
    /// [`CLOSE_SUPERSEDED`], and every session holding that socket ends as if
    /// it had disconnected.
    pub fn register(&self, user_id: &str, role: Role, test_id: TestId, handle: &ConnectionHandle) {
        let _ops = self.ops.lock();
        let superseded = self
            .connections
            .register(user_id, role, test_id.clone(), handle.clone());

        if let Some(old) = superseded {
            tracing::info!(
                user_id = %user_id,
                old_handle_id = %old.id(),
                handle_id = %handle.id(),
                "Closing superseded connection"
            );
            force_close(&old, CLOSE_SUPERSEDED, "Superseded by a newer connection");
            self.end_sessions_of(old.id(), user_id);
        }

        tracing::info!(
            user_id = %user_id,
            role = %role,
            test_id = %test_id,
            handle_id = %handle.id(),
            "User registered"
        );

        send_event(
            handle,
            &ServerEvent::Registered {
                success: true,
                socket_id: handle.id(),
            },
        );
    }
}
