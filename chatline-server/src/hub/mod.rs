//! Live fan-out hub: who is online, which connections sit in which group room,
//! and how domain mutations become push events.

pub mod connection;
pub mod dispatcher;
pub mod presence;
pub mod rooms;

use std::sync::Arc;

use metrics::counter;
use shared::models::{GroupId, PushEvent, UserId};
use tokio::sync::mpsc;
use tracing::info;

pub use connection::{ConnectionHandle, ConnectionId, Delivery, DeliveryReport, MissReason};
pub use dispatcher::BroadcastDispatcher;
pub use presence::PresenceRegistry;
pub use rooms::RoomRouter;

/// Process-wide hub shared by every handler through `AppState`.
#[derive(Debug, Clone)]
pub struct Hub {
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRouter>,
    dispatcher: BroadcastDispatcher,
    channel_capacity: usize,
}

impl Hub {
    pub fn new(channel_capacity: usize) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRouter::new());
        let dispatcher = BroadcastDispatcher::new(Arc::clone(&presence), Arc::clone(&rooms));
        Self {
            presence,
            rooms,
            dispatcher,
            channel_capacity,
        }
    }

    /// Registers a fresh connection for `user` and returns the queue its
    /// transport must drain.
    pub async fn open(&self, user: UserId) -> (ConnectionHandle, mpsc::Receiver<PushEvent>) {
        let (handle, receiver) = ConnectionHandle::channel(self.channel_capacity);
        counter!("chatline_connections_opened_total").increment(1);
        self.presence.connect(user, handle.clone()).await;
        (handle, receiver)
    }

    /// Tears down a connection: leaves its rooms, then drops presence.
    pub async fn close(&self, user: UserId, connection: ConnectionId) {
        let rooms = self.rooms.leave_all(&connection).await;
        self.presence.disconnect(user, connection).await;
        counter!("chatline_connections_closed_total").increment(1);
        info!(user_id = %user, connection_id = %connection, rooms, "connection closed");
    }

    pub async fn join(&self, user: UserId, connection: &ConnectionHandle, group: GroupId) -> bool {
        self.rooms.join(user, connection, group).await
    }

    pub async fn leave(&self, connection: &ConnectionId, group: GroupId) -> bool {
        self.rooms.leave(connection, group).await
    }

    pub fn dispatcher(&self) -> &BroadcastDispatcher {
        &self.dispatcher
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomRouter {
        &self.rooms
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(64)
    }
}
