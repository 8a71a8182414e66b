use axum::extract::ws::{CloseFrame, Message};

use super::protocol::ServerEvent;
use super::ConnectionHandle;

/// Encode a server event as a JSON text frame and push it to one connection.
/// Delivery is best-effort: events for a closed connection are dropped.
pub fn send_event(handle: &ConnectionHandle, event: &ServerEvent) {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(
                handle_id = %handle.id(),
                event = event.name(),
                error = %e,
                "Failed to encode server event"
            );
            return;
        }
    };

    if handle.sender().send(Message::Text(json.into())).is_err() {
        tracing::debug!(
            handle_id = %handle.id(),
            event = event.name(),
            "Dropped event for closed connection"
        );
    }
}

/// Force-close a connection with a WebSocket Close frame.
pub fn force_close(handle: &ConnectionHandle, close_code: u16, reason: &str) {
    let close_frame = CloseFrame {
        code: close_code,
        reason: reason.into(),
    };
    let _ = handle.sender().send(Message::Close(Some(close_frame)));
}
