use std::collections::HashMap;

use metrics::gauge;
use shared::models::{PushEvent, UserId};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::connection::{ConnectionHandle, ConnectionId, DeliveryReport, fan_out};

#[derive(Debug, Default)]
struct PresenceState {
    /// Addressable connection per identity; the latest connect wins.
    by_user: HashMap<UserId, ConnectionHandle>,
    /// Every live connection, superseded ones included, for online-set
    /// broadcasts.
    live: HashMap<ConnectionId, ConnectionHandle>,
}

impl PresenceState {
    fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.by_user.keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// Sends the online set to every live connection. Called with the lock
    /// held: `try_send` never waits, and successive sets must arrive in the
    /// order they were taken.
    #[allow(clippy::cast_precision_loss)]
    fn publish_online(&self) -> DeliveryReport {
        let online = self.online_users();
        gauge!("chatline_online_users").set(online.len() as f64);
        fan_out(self.live.values(), &PushEvent::GetOnlineUsers(online))
    }
}

/// Identity → live connection table.
///
/// All mutations go through one lock, and the online-set broadcast that
/// follows each mutation is issued before it is released.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: Mutex<PresenceState>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` for `user`, superseding any previous one, then
    /// broadcasts the online set to every live connection.
    pub async fn connect(&self, user: UserId, connection: ConnectionHandle) -> DeliveryReport {
        let mut guard = self.inner.lock().await;
        guard.live.insert(connection.id(), connection.clone());
        if let Some(previous) = guard.by_user.insert(user, connection.clone()) {
            if previous.id() != connection.id() {
                debug!(
                    user_id = %user,
                    superseded = %previous.id(),
                    connection_id = %connection.id(),
                    "connection superseded"
                );
            }
        }

        info!(user_id = %user, connection_id = %connection.id(), "user connected");
        guard.publish_online()
    }

    /// Forgets `connection`. The identity mapping is removed only when it
    /// still points at this connection, so a late disconnect from an old tab
    /// never evicts a newer one.
    pub async fn disconnect(&self, user: UserId, connection: ConnectionId) -> DeliveryReport {
        let mut guard = self.inner.lock().await;
        guard.live.remove(&connection);
        let evicted = guard
            .by_user
            .get(&user)
            .is_some_and(|current| current.id() == connection);
        if evicted {
            guard.by_user.remove(&user);
            info!(user_id = %user, connection_id = %connection, "user disconnected");
        } else {
            debug!(
                user_id = %user,
                connection_id = %connection,
                "stale disconnect ignored for presence"
            );
        }
        guard.publish_online()
    }

    pub async fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.inner.lock().await.by_user.get(&user).cloned()
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.lock().await.online_users()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.live.len()
    }
}
