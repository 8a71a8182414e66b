//! JSON wire protocol for the `/streaming` socket.
//!
//! Every frame is a text message of the form `{"event": "<name>", "data": {...}}`.
//! Field names inside `data` are camelCase.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relay::sessions::SessionInfo;
use crate::relay::types::{Role, SignalMessage, SignalType, TestId};
use crate::state::AppState;
use crate::ws::{ConnectionHandle, HandleId};

/// Reason sent to the surviving party when its peer's socket goes away.
pub const PEER_DISCONNECTED: &str = "peer-disconnected";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub user_id: String,
    pub role: Role,
    pub test_id: TestId,
}

/// Payload of `start-stream` and `stop-stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPayload {
    pub student_id: String,
    pub teacher_id: String,
    pub test_id: TestId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionsQuery {
    pub test_id: TestId,
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Register(RegisterPayload),
    StartStream(StreamPayload),
    Signal(SignalMessage),
    StopStream(StreamPayload),
    GetActiveSessions(ActiveSessionsQuery),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::StartStream(_) => "start-stream",
            Self::Signal(_) => "signal",
            Self::StopStream(_) => "stop-stream",
            Self::GetActiveSessions(_) => "get-active-sessions",
        }
    }
}

/// Body of a `stream-stopped` event. Its shape depends on who receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamStopped {
    /// Acknowledgement to the caller of `stop-stream`.
    Ack { success: bool },
    /// Sent to the student; names the teacher that stopped.
    ToStudent {
        #[serde(rename = "teacherId")]
        teacher_id: String,
    },
    /// Sent to the teacher; names the student that stopped.
    ToTeacher {
        #[serde(rename = "studentId")]
        student_id: String,
    },
    /// Sent to the survivor when the other side disconnects.
    PeerGone { reason: String },
}

impl StreamStopped {
    pub fn peer_disconnected() -> Self {
        Self::PeerGone {
            reason: PEER_DISCONNECTED.to_string(),
        }
    }
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Registered {
        success: bool,
        socket_id: HandleId,
    },
    StreamRequest {
        teacher_id: String,
        test_id: TestId,
    },
    StreamStarted {
        success: bool,
        session_key: String,
    },
    Signal {
        #[serde(rename = "type")]
        kind: SignalType,
        data: serde_json::Value,
        from: String,
    },
    SignalError {
        error: String,
        to: String,
    },
    StreamStopped(StreamStopped),
    ActiveSessions {
        sessions: Vec<SessionInfo>,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::StreamRequest { .. } => "stream-request",
            Self::StreamStarted { .. } => "stream-started",
            Self::Signal { .. } => "signal",
            Self::SignalError { .. } => "signal-error",
            Self::StreamStopped(_) => "stream-stopped",
            Self::ActiveSessions { .. } => "active-sessions",
        }
    }
}

/// Decode one text frame into a client event.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Handle an incoming text frame from `handle`.
/// Malformed frames are logged and dropped; the connection stays open.
pub fn handle_text_message(text: &str, handle: &ConnectionHandle, state: &AppState) {
    let event = match decode_client_event(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                handle_id = %handle.id(),
                error = %e,
                "Dropping undecodable frame"
            );
            return;
        }
    };

    tracing::debug!(
        handle_id = %handle.id(),
        event = event.name(),
        "Dispatching client event"
    );
    dispatch_event(event, handle, state);
}

/// Dispatch a decoded event to the relay.
fn dispatch_event(event: ClientEvent, handle: &ConnectionHandle, state: &AppState) {
    let relay = &state.relay;
    match event {
        ClientEvent::Register(req) => {
            relay.register(&req.user_id, req.role, req.test_id, handle);
        }
        ClientEvent::StartStream(req) => {
            relay.start_session(&req.student_id, &req.teacher_id, req.test_id, handle);
        }
        ClientEvent::Signal(message) => {
            relay.route(message, handle);
        }
        ClientEvent::StopStream(req) => {
            relay.stop_session(&req.student_id, &req.teacher_id, req.test_id, handle);
        }
        ClientEvent::GetActiveSessions(req) => {
            relay.send_active_sessions(&req.test_id, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_register_with_numeric_test_id() {
        let event = decode_client_event(
            r#"{"event":"register","data":{"userId":"teacher1","role":"teacher","testId":5}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Register(RegisterPayload {
                user_id: "teacher1".to_string(),
                role: Role::Teacher,
                test_id: "5".into(),
            })
        );
    }

    #[test]
    fn test_decode_signal_keeps_payload() {
        let event = decode_client_event(
            r#"{"event":"signal","data":{"type":"offer","data":{"sdp":"v=0"},"from":"student1","to":"teacher1","testId":5,"role":"student"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::Signal(msg) => {
                assert_eq!(msg.kind, SignalType::Offer);
                assert_eq!(msg.data, json!({"sdp": "v=0"}));
                assert_eq!(msg.role, Some(Role::Student));
            }
            other => panic!("Expected Signal, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        let result = decode_client_event(r#"{"event":"launch-missiles","data":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_client_event("not json").is_err());
    }

    #[test]
    fn test_registered_wire_shape() {
        let id = HandleId::new();
        let value = serde_json::to_value(ServerEvent::Registered {
            success: true,
            socket_id: id,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "registered", "data": {"success": true, "socketId": id.to_string()}})
        );
    }

    #[test]
    fn test_stream_stopped_shapes() {
        let ack = serde_json::to_value(ServerEvent::StreamStopped(StreamStopped::Ack {
            success: true,
        }))
        .unwrap();
        assert_eq!(ack, json!({"event": "stream-stopped", "data": {"success": true}}));

        let notice = serde_json::to_value(ServerEvent::StreamStopped(StreamStopped::ToStudent {
            teacher_id: "teacher1".to_string(),
        }))
        .unwrap();
        assert_eq!(notice["data"], json!({"teacherId": "teacher1"}));

        let gone = serde_json::to_value(ServerEvent::StreamStopped(
            StreamStopped::peer_disconnected(),
        ))
        .unwrap();
        assert_eq!(gone["data"], json!({"reason": "peer-disconnected"}));
    }

    #[test]
    fn test_signal_event_wire_shape() {
        let value = serde_json::to_value(ServerEvent::Signal {
            kind: SignalType::IceCandidate,
            data: json!({"candidate": "a=1"}),
            from: "teacher1".to_string(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "event": "signal",
                "data": {"type": "ice-candidate", "data": {"candidate": "a=1"}, "from": "teacher1"}
            })
        );
    }
}
