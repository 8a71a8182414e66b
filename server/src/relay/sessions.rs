use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::TestId;
use crate::ws::HandleId;

/// Composite key of a stream session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub test_id: TestId,
    pub student_id: String,
    pub teacher_id: String,
}

impl SessionKey {
    pub fn new(test_id: TestId, student_id: &str, teacher_id: &str) -> Self {
        Self {
            test_id,
            student_id: student_id.to_string(),
            teacher_id: teacher_id.to_string(),
        }
    }
}

/// Renders as `{testId}-{studentId}-{teacherId}`, the form clients see.
impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.test_id, self.student_id, self.teacher_id)
    }
}

/// An active student/teacher stream pairing.
///
/// The handle ids are captured when the session starts and are never
/// refreshed. `None` means that party was not connected at the time.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub student_handle: Option<HandleId>,
    pub teacher_handle: Option<HandleId>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// True when either stored handle reference is `handle_id`.
    pub fn references(&self, handle_id: HandleId) -> bool {
        self.student_handle == Some(handle_id) || self.teacher_handle == Some(handle_id)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_key: self.key.to_string(),
            test_id: self.key.test_id.clone(),
            student_id: self.key.student_id.clone(),
            teacher_id: self.key.teacher_id.clone(),
            student_socket_id: self.student_handle,
            teacher_socket_id: self.teacher_handle,
            started_at: self.started_at,
        }
    }
}

/// Wire view of a session in `active-sessions` replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_key: String,
    pub test_id: TestId,
    pub student_id: String,
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_socket_id: Option<HandleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_socket_id: Option<HandleId>,
    pub started_at: DateTime<Utc>,
}

/// In-memory table of active sessions. Presence of a key means "active".
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session, overwriting any record under the same key.
    pub fn insert(&self, session: Session) -> Option<Session> {
        self.sessions.insert(session.key.clone(), session)
    }

    pub fn get(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.remove(key).map(|(_, session)| session)
    }

    /// Sessions belonging to one test, in no particular order.
    pub fn for_test(&self, test_id: &TestId) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|entry| &entry.key().test_id == test_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove and return every session that references `handle_id`.
    pub fn remove_referencing(&self, handle_id: HandleId) -> Vec<Session> {
        // Collect keys first to avoid holding shard locks during removal
        let keys: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().references(handle_id))
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter()
            .filter_map(|key| {
                self.sessions
                    .remove_if(key, |_, session| session.references(handle_id))
                    .map(|(_, session)| session)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
