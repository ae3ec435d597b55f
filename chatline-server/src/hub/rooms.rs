use std::collections::{HashMap, HashSet};

use shared::models::{GroupId, UserId};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::connection::{ConnectionHandle, ConnectionId};

#[derive(Debug, Clone)]
struct RoomEntry {
    owner: UserId,
    handle: ConnectionHandle,
}

#[derive(Debug, Default)]
struct RoomState {
    rooms: HashMap<GroupId, HashMap<ConnectionId, RoomEntry>>,
    joined: HashMap<ConnectionId, HashSet<GroupId>>,
}

impl RoomState {
    fn detach(&mut self, connection: &ConnectionId, group: GroupId) -> bool {
        let Some(members) = self.rooms.get_mut(&group) else {
            return false;
        };
        let removed = members.remove(connection).is_some();
        if members.is_empty() {
            self.rooms.remove(&group);
        }
        removed
    }

    fn forget(&mut self, connection: &ConnectionId, group: GroupId) {
        if let Some(groups) = self.joined.get_mut(connection) {
            groups.remove(&group);
            if groups.is_empty() {
                self.joined.remove(connection);
            }
        }
    }
}

/// Group id → set of joined connections.
///
/// Join and leave are idempotent and keyed by connection, not identity: two
/// tabs of the same user are two room members. Each entry remembers its
/// owning identity so that losing access evicts every tab at once.
#[derive(Debug, Default)]
pub struct RoomRouter {
    inner: Mutex<RoomState>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection`, owned by `user`, to `group`. Returns `false` when it
    /// was already there.
    pub async fn join(&self, user: UserId, connection: &ConnectionHandle, group: GroupId) -> bool {
        let mut guard = self.inner.lock().await;
        let entry = RoomEntry {
            owner: user,
            handle: connection.clone(),
        };
        let inserted = guard
            .rooms
            .entry(group)
            .or_default()
            .insert(connection.id(), entry)
            .is_none();
        guard.joined.entry(connection.id()).or_default().insert(group);
        if inserted {
            debug!(connection_id = %connection.id(), group_id = %group, "joined room");
        }
        inserted
    }

    /// Removes `connection` from `group`. Leaving a room never joined is a no-op.
    pub async fn leave(&self, connection: &ConnectionId, group: GroupId) -> bool {
        let mut guard = self.inner.lock().await;
        let removed = guard.detach(connection, group);
        guard.forget(connection, group);
        if removed {
            debug!(connection_id = %connection, group_id = %group, "left room");
        }
        removed
    }

    /// Takes every connection owned by `user` out of `group` because the
    /// identity lost access, superseded tabs included. Returns the evicted
    /// connections.
    pub async fn evict(&self, group: GroupId, user: UserId) -> Vec<ConnectionHandle> {
        let mut guard = self.inner.lock().await;
        let owned: Vec<ConnectionId> = guard
            .rooms
            .get(&group)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, entry)| entry.owner == user)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();

        let mut evicted = Vec::with_capacity(owned.len());
        for id in owned {
            if let Some(entry) = guard.rooms.get_mut(&group).and_then(|members| members.remove(&id)) {
                evicted.push(entry.handle);
            }
            guard.forget(&id, group);
        }
        if guard.rooms.get(&group).is_some_and(HashMap::is_empty) {
            guard.rooms.remove(&group);
        }
        if !evicted.is_empty() {
            info!(user_id = %user, group_id = %group, connections = evicted.len(), "evicted from room");
        }
        evicted
    }

    /// Drops `connection` from every room it joined; used on transport close.
    pub async fn leave_all(&self, connection: &ConnectionId) -> usize {
        let mut guard = self.inner.lock().await;
        let groups = guard.joined.remove(connection).unwrap_or_default();
        let left = groups
            .into_iter()
            .filter(|group| guard.detach(connection, *group))
            .count();
        if left > 0 {
            debug!(connection_id = %connection, rooms = left, "left all rooms");
        }
        left
    }

    /// Empties `group` entirely, returning the connections that were in it.
    pub async fn close_room(&self, group: GroupId) -> Vec<ConnectionHandle> {
        let mut guard = self.inner.lock().await;
        let members = guard.rooms.remove(&group).unwrap_or_default();
        for id in members.keys() {
            guard.forget(id, group);
        }
        members.into_values().map(|entry| entry.handle).collect()
    }

    pub async fn members_of(&self, group: GroupId) -> Vec<ConnectionHandle> {
        self.inner
            .lock()
            .await
            .rooms
            .get(&group)
            .map(|members| members.values().map(|entry| entry.handle.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn rooms_of(&self, connection: &ConnectionId) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self
            .inner
            .lock()
            .await
            .joined
            .get(connection)
            .map(|groups| groups.iter().copied().collect())
            .unwrap_or_default();
        groups.sort_unstable();
        groups
    }
}
