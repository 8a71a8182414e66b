use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::types::{Role, TestId};
use crate::ws::{ConnectionHandle, HandleId};

/// Group every connection taking part in a test joins.
pub fn test_group(test_id: &TestId) -> String {
    format!("test-{}", test_id)
}

/// Group for one role within a test, e.g. `teacher-5`.
pub fn role_group(role: Role, test_id: &TestId) -> String {
    format!("{}-{}", role, test_id)
}

/// What a user registered with.
#[derive(Debug, Clone)]
pub struct Registration {
    pub handle: ConnectionHandle,
    pub role: Role,
    pub test_id: TestId,
}

#[derive(Debug, Default)]
struct Table {
    /// user_id -> registration
    by_user: HashMap<String, Registration>,
    /// Reverse mapping: handle -> user_id
    by_handle: HashMap<HandleId, String>,
    /// Broadcast groups: group name -> member handles
    groups: HashMap<String, HashSet<HandleId>>,
}

impl Table {
    fn leave_groups(&mut self, handle_id: HandleId) {
        self.groups.retain(|_, members| {
            members.remove(&handle_id);
            !members.is_empty()
        });
    }

    fn drop_user(&mut self, user_id: &str) -> Option<Registration> {
        let registration = self.by_user.remove(user_id)?;
        let handle_id = registration.handle.id();
        self.by_handle.remove(&handle_id);
        self.leave_groups(handle_id);
        Some(registration)
    }
}

/// Tracks which user is live on which socket.
///
/// At most one handle per user. The primary map, the reverse index and the
/// group table sit behind a single lock so every mutation updates all three
/// together.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    table: RwLock<Table>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, replacing any previous binding.
    ///
    /// Returns the handle that was displaced when the user was already bound
    /// to a different socket. A socket re-registering under a new user id
    /// releases its old user id.
    pub fn register(
        &self,
        user_id: &str,
        role: Role,
        test_id: TestId,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let handle_id = handle.id();
        let mut table = self.table.write();

        if let Some(prev_user) = table.by_handle.get(&handle_id).cloned() {
            if prev_user != user_id {
                table.by_user.remove(&prev_user);
            }
        }
        table.leave_groups(handle_id);

        let groups = [test_group(&test_id), role_group(role, &test_id)];
        let previous = table.by_user.insert(
            user_id.to_string(),
            Registration {
                handle,
                role,
                test_id,
            },
        );

        let superseded = previous
            .map(|registration| registration.handle)
            .filter(|old| old.id() != handle_id);
        if let Some(old) = &superseded {
            table.by_handle.remove(&old.id());
            table.leave_groups(old.id());
        }

        table.by_handle.insert(handle_id, user_id.to_string());
        for group in groups {
            table.groups.entry(group).or_default().insert(handle_id);
        }

        superseded
    }

    /// Current handle for a user.
    pub fn resolve(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.table
            .read()
            .by_user
            .get(user_id)
            .map(|registration| registration.handle.clone())
    }

    /// Full registration record for a user.
    pub fn registration(&self, user_id: &str) -> Option<Registration> {
        self.table.read().by_user.get(user_id).cloned()
    }

    /// User currently bound to a handle.
    pub fn reverse_resolve(&self, handle_id: HandleId) -> Option<String> {
        self.table.read().by_handle.get(&handle_id).cloned()
    }

    /// Drop a user's binding. Returns the handle it was bound to.
    pub fn remove(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.table
            .write()
            .drop_user(user_id)
            .map(|registration| registration.handle)
    }

    /// Reverse-resolve and remove in one step.
    ///
    /// Used on disconnect: a concurrent re-registration of the same user on a
    /// new socket is never torn down by the old socket going away.
    pub fn release(&self, handle_id: HandleId) -> Option<String> {
        let mut table = self.table.write();
        let user_id = table.by_handle.get(&handle_id).cloned()?;
        table.drop_user(&user_id);
        Some(user_id)
    }

    /// Handles currently in a broadcast group.
    pub fn group_members(&self, group: &str) -> Vec<HandleId> {
        self.table
            .read()
            .groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.table.read().by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
