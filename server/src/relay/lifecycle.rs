use chrono::Utc;

use super::sessions::{Session, SessionKey};
use super::types::TestId;
use super::Relay;
use crate::ws::broadcast::send_event;
use crate::ws::protocol::{ServerEvent, StreamStopped};
use crate::ws::{ConnectionHandle, HandleId};

impl Relay {
    /// Start (or restart) a stream session and ask the student to begin streaming.
    ///
    /// Parties that are not connected are recorded as absent. Only the student
    /// receives `stream-request`; the initiator gets `stream-started`.
    pub fn start_session(
        &self,
        student_id: &str,
        teacher_id: &str,
        test_id: TestId,
        initiator: &ConnectionHandle,
    ) -> SessionKey {
        let _ops = self.ops.lock();
        let key = SessionKey::new(test_id.clone(), student_id, teacher_id);
        let student = self.connections.resolve(student_id);
        let teacher = self.connections.resolve(teacher_id);

        let replaced = self.sessions.insert(Session {
            key: key.clone(),
            student_handle: student.as_ref().map(ConnectionHandle::id),
            teacher_handle: teacher.as_ref().map(ConnectionHandle::id),
            started_at: Utc::now(),
        });

        tracing::info!(
            session_key = %key,
            student_connected = student.is_some(),
            teacher_connected = teacher.is_some(),
            replaced = replaced.is_some(),
            "Stream session started"
        );

        if let Some(student) = &student {
            send_event(
                student,
                &ServerEvent::StreamRequest {
                    teacher_id: teacher_id.to_string(),
                    test_id,
                },
            );
        }

        send_event(
            initiator,
            &ServerEvent::StreamStarted {
                success: true,
                session_key: key.to_string(),
            },
        );

        key
    }

    /// Stop a stream session. Stopping a session that does not exist succeeds
    /// and only acknowledges the caller.
    ///
    /// When a session was removed, both parties are looked up afresh and each
    /// one currently connected is told who stopped streaming with it.
    pub fn stop_session(
        &self,
        student_id: &str,
        teacher_id: &str,
        test_id: TestId,
        caller: &ConnectionHandle,
    ) -> Option<Session> {
        let _ops = self.ops.lock();
        let key = SessionKey::new(test_id, student_id, teacher_id);
        let removed = self.sessions.remove(&key);

        tracing::info!(
            session_key = %key,
            existed = removed.is_some(),
            "Stream session stopped"
        );

        if removed.is_some() {
            if let Some(student) = self.connections.resolve(student_id) {
                send_event(
                    &student,
                    &ServerEvent::StreamStopped(StreamStopped::ToStudent {
                        teacher_id: teacher_id.to_string(),
                    }),
                );
            }
            if let Some(teacher) = self.connections.resolve(teacher_id) {
                send_event(
                    &teacher,
                    &ServerEvent::StreamStopped(StreamStopped::ToTeacher {
                        student_id: student_id.to_string(),
                    }),
                );
            }
        }

        send_event(
            caller,
            &ServerEvent::StreamStopped(StreamStopped::Ack { success: true }),
        );

        removed
    }

    /// All sessions for a test, in no particular order.
    pub fn list_active_sessions(&self, test_id: &TestId) -> Vec<Session> {
        self.sessions.for_test(test_id)
    }

    /// Answer `get-active-sessions`.
    pub fn send_active_sessions(&self, test_id: &TestId, caller: &ConnectionHandle) {
        let sessions = self
            .list_active_sessions(test_id)
            .iter()
            .map(Session::info)
            .collect();
        send_event(caller, &ServerEvent::ActiveSessions { sessions });
    }

    /// Clean up after a socket goes away.
    ///
    /// Unknown handles are ignored, including sockets already superseded by a
    /// newer registration (their sessions ended at that point). Otherwise the
    /// user is unregistered, every session holding this handle is dropped, and
    /// the other party of each dropped session is told its peer disconnected.
    pub fn on_disconnect(&self, handle_id: HandleId) -> Vec<Session> {
        let _ops = self.ops.lock();
        let Some(user_id) = self.connections.release(handle_id) else {
            tracing::debug!(handle_id = %handle_id, "Disconnect for unregistered handle");
            return Vec::new();
        };

        let removed = self.end_sessions_of(handle_id, &user_id);

        tracing::info!(
            user_id = %user_id,
            handle_id = %handle_id,
            sessions_removed = removed.len(),
            "User disconnected"
        );

        removed
    }

    /// Drop every session holding `handle_id` and tell the other party of
    /// each one that its peer is gone. Caller holds `ops`.
    pub(super) fn end_sessions_of(&self, handle_id: HandleId, user_id: &str) -> Vec<Session> {
        let removed = self.sessions.remove_referencing(handle_id);

        for session in &removed {
            let peer_id = if session.student_handle == Some(handle_id) {
                &session.key.teacher_id
            } else {
                &session.key.student_id
            };

            if let Some(peer) = self.connections.resolve(peer_id) {
                send_event(
                    &peer,
                    &ServerEvent::StreamStopped(StreamStopped::peer_disconnected()),
                );
            }

            tracing::info!(
                session_key = %session.key,
                user_id = %user_id,
                peer_id = %peer_id,
                "Stream session ended by disconnect"
            );
        }

        removed
    }
}
