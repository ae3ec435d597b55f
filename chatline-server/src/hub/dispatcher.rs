use std::sync::Arc;

use shared::models::{Group, GroupDeleted, GroupUpdate, Message, MessageRoute, PushEvent, UserId};
use tracing::{debug, warn};

use super::connection::{ConnectionHandle, DeliveryReport, fan_out};
use super::presence::PresenceRegistry;
use super::rooms::RoomRouter;

/// Turns domain mutations into push events and routes them to connections.
///
/// Every method is best-effort: misses are counted in the returned report and
/// never surface as errors to the caller whose write already succeeded.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRouter>,
}

impl BroadcastDispatcher {
    pub fn new(presence: Arc<PresenceRegistry>, rooms: Arc<RoomRouter>) -> Self {
        Self { presence, rooms }
    }

    /// Direct messages go to the receiver's connection only; group messages
    /// go to every connection in the group room, the sender's included.
    pub async fn new_message(&self, message: &Message) -> DeliveryReport {
        match message.route() {
            Some(MessageRoute::Direct { receiver, .. }) => {
                let event = PushEvent::NewMessage(message.clone());
                self.to_users(&[receiver], &event).await
            }
            Some(MessageRoute::Group(group)) => {
                let event = PushEvent::NewGroupMessage(message.clone());
                fan_out(&self.rooms.members_of(group).await, &event)
            }
            None => unroutable(message, "newMessage"),
        }
    }

    /// Direct reactions reach both participants; group reactions reach the room.
    pub async fn reaction_changed(&self, message: &Message) -> DeliveryReport {
        let event = PushEvent::ReactionUpdate(message.clone());
        match message.route() {
            Some(MessageRoute::Direct { sender, receiver }) => {
                self.to_users(&[sender, receiver], &event).await
            }
            Some(MessageRoute::Group(group)) => {
                fan_out(&self.rooms.members_of(group).await, &event)
            }
            None => unroutable(message, event.name()),
        }
    }

    /// Direct receipts reach the original sender only; group receipts reach
    /// the room.
    pub async fn read_receipt(&self, message: &Message) -> DeliveryReport {
        let event = PushEvent::ReadReceiptUpdate(message.clone());
        match message.route() {
            Some(MessageRoute::Direct { sender, .. }) => self.to_users(&[sender], &event).await,
            Some(MessageRoute::Group(group)) => {
                fan_out(&self.rooms.members_of(group).await, &event)
            }
            None => unroutable(message, event.name()),
        }
    }

    /// Sends the current group snapshot to every member by identity. An
    /// `evicted` user instead gets a removal notice, and every connection it
    /// owns is taken out of the room.
    pub async fn group_updated(&self, group: &Group, evicted: Option<UserId>) -> DeliveryReport {
        let members: Vec<UserId> = group.members.iter().copied().collect();
        let mut report = self
            .to_users(&members, &PushEvent::GroupUpdate(GroupUpdate::Snapshot(group.clone())))
            .await;

        if let Some(user) = evicted {
            self.rooms.evict(group.id, user).await;
            if let Some(connection) = self.presence.lookup(user).await {
                let notice = PushEvent::GroupUpdate(GroupUpdate::removed(group.id));
                report.merge(fan_out([&connection], &notice));
            }
        }
        report
    }

    /// Notifies former members and empties the room.
    pub async fn group_deleted(&self, group: &Group) -> DeliveryReport {
        let members: Vec<UserId> = group.members.iter().copied().collect();
        let report = self
            .to_users(&members, &PushEvent::GroupDeleted(GroupDeleted { id: group.id }))
            .await;
        let closed = self.rooms.close_room(group.id).await;
        debug!(group_id = %group.id, connections = closed.len(), "room closed");
        report
    }

    async fn to_users(&self, users: &[UserId], event: &PushEvent) -> DeliveryReport {
        let mut targets: Vec<ConnectionHandle> = Vec::with_capacity(users.len());
        let mut offline = 0;
        for user in users {
            match self.presence.lookup(*user).await {
                Some(handle) if !targets.iter().any(|t| t.id() == handle.id()) => {
                    targets.push(handle);
                }
                Some(_) => {}
                None => offline += 1,
            }
        }
        if offline > 0 {
            debug!(event = event.name(), offline, "recipients offline");
        }
        fan_out(&targets, event)
    }
}

fn unroutable(message: &Message, event: &str) -> DeliveryReport {
    warn!(message_id = %message.id, event, "message has neither receiver nor group");
    DeliveryReport::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{GroupId, MessageBody};
    use tokio::sync::mpsc;

    struct Fixture {
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRouter>,
        dispatcher: BroadcastDispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let presence = Arc::new(PresenceRegistry::new());
            let rooms = Arc::new(RoomRouter::new());
            let dispatcher = BroadcastDispatcher::new(presence.clone(), rooms.clone());
            Self { presence, rooms, dispatcher }
        }

        async fn online(&self, user: UserId) -> (ConnectionHandle, mpsc::Receiver<PushEvent>) {
            let (handle, mut rx) = ConnectionHandle::channel(32);
            self.presence.connect(user, handle.clone()).await;
            // presence broadcasts are not under test here
            while rx.try_recv().is_ok() {}
            (handle, rx)
        }
    }

    fn drain(rx: &mut mpsc::Receiver<PushEvent>) -> Vec<PushEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if !matches!(event, PushEvent::GetOnlineUsers(_)) {
                events.push(event);
            }
        }
        events
    }

    #[tokio::test]
    async fn direct_message_reaches_receiver_only() {
        let fx = Fixture::new();
        let (alice, bob) = (UserId::new_v4(), UserId::new_v4());
        let (_a, mut alice_rx) = fx.online(alice).await;
        let (_b, mut bob_rx) = fx.online(bob).await;

        let message = Message::direct(alice, bob, MessageBody::text("hi"));
        let report = fx.dispatcher.new_message(&message).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(drain(&mut bob_rx), vec![PushEvent::NewMessage(message)]);
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn direct_message_to_offline_user_is_silent() {
        let fx = Fixture::new();
        let message = Message::direct(UserId::new_v4(), UserId::new_v4(), MessageBody::text("x"));
        assert_eq!(fx.dispatcher.new_message(&message).await, DeliveryReport::default());
    }

    #[tokio::test]
    async fn group_message_reaches_exactly_the_room() {
        let fx = Fixture::new();
        let group = GroupId::new_v4();
        let (alice, bob, carol) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
        let (a, mut alice_rx) = fx.online(alice).await;
        let (b, mut bob_rx) = fx.online(bob).await;
        let (_c, mut carol_rx) = fx.online(carol).await;
        fx.rooms.join(alice, &a, group).await;
        fx.rooms.join(bob, &b, group).await;

        let message = Message::group(alice, group, MessageBody::text("hello"));
        fx.dispatcher.new_message(&message).await;

        let expected = vec![PushEvent::NewGroupMessage(message)];
        assert_eq!(drain(&mut alice_rx), expected);
        assert_eq!(drain(&mut bob_rx), expected);
        assert!(drain(&mut carol_rx).is_empty());
    }

    #[tokio::test]
    async fn direct_reaction_reaches_both_participants() {
        let fx = Fixture::new();
        let (alice, bob) = (UserId::new_v4(), UserId::new_v4());
        let (_a, mut alice_rx) = fx.online(alice).await;
        let (_b, mut bob_rx) = fx.online(bob).await;

        let mut message = Message::direct(alice, bob, MessageBody::text("hi"));
        message.set_reaction(bob, "👍");
        let report = fx.dispatcher.reaction_changed(&message).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(drain(&mut alice_rx), vec![PushEvent::ReactionUpdate(message.clone())]);
        assert_eq!(drain(&mut bob_rx), vec![PushEvent::ReactionUpdate(message)]);
    }

    #[tokio::test]
    async fn self_addressed_reaction_is_delivered_once() {
        let fx = Fixture::new();
        let alice = UserId::new_v4();
        let (_a, mut alice_rx) = fx.online(alice).await;

        let message = Message::direct(alice, alice, MessageBody::text("note"));
        fx.dispatcher.reaction_changed(&message).await;

        assert_eq!(drain(&mut alice_rx).len(), 1);
    }

    #[tokio::test]
    async fn direct_read_receipt_reaches_original_sender_only() {
        let fx = Fixture::new();
        let (alice, bob) = (UserId::new_v4(), UserId::new_v4());
        let (_a, mut alice_rx) = fx.online(alice).await;
        let (_b, mut bob_rx) = fx.online(bob).await;

        let mut message = Message::direct(alice, bob, MessageBody::text("hi"));
        message.mark_read_by(bob);
        fx.dispatcher.read_receipt(&message).await;

        assert_eq!(drain(&mut alice_rx), vec![PushEvent::ReadReceiptUpdate(message)]);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn evicted_member_gets_removal_and_leaves_room() {
        let fx = Fixture::new();
        let (admin, member) = (UserId::new_v4(), UserId::new_v4());
        let (a, mut admin_rx) = fx.online(admin).await;
        let (m, mut member_rx) = fx.online(member).await;

        let mut group = Group::new(admin, "crew", [member]);
        fx.rooms.join(admin, &a, group.id).await;
        fx.rooms.join(member, &m, group.id).await;
        group.remove_member(member);

        fx.dispatcher.group_updated(&group, Some(member)).await;

        assert_eq!(
            drain(&mut admin_rx),
            vec![PushEvent::GroupUpdate(GroupUpdate::Snapshot(group.clone()))]
        );
        assert_eq!(
            drain(&mut member_rx),
            vec![PushEvent::GroupUpdate(GroupUpdate::removed(group.id))]
        );
        assert!(fx.rooms.rooms_of(&m.id()).await.is_empty());
    }

    #[tokio::test]
    async fn deleted_group_notifies_members_and_closes_room() {
        let fx = Fixture::new();
        let (admin, member) = (UserId::new_v4(), UserId::new_v4());
        let (a, mut admin_rx) = fx.online(admin).await;
        let (_m, mut member_rx) = fx.online(member).await;
        let group = Group::new(admin, "crew", [member]);
        fx.rooms.join(admin, &a, group.id).await;

        fx.dispatcher.group_deleted(&group).await;

        let expected = vec![PushEvent::GroupDeleted(GroupDeleted { id: group.id })];
        assert_eq!(drain(&mut admin_rx), expected);
        assert_eq!(drain(&mut member_rx), expected);
        assert!(fx.rooms.members_of(group.id).await.is_empty());
    }

    #[tokio::test]
    async fn superseded_tab_of_evicted_member_stops_hearing_the_room() {
        let fx = Fixture::new();
        let (admin, member) = (UserId::new_v4(), UserId::new_v4());
        let (a, mut admin_rx) = fx.online(admin).await;
        let (old_tab, mut old_rx) = fx.online(member).await;
        let (new_tab, mut new_rx) = fx.online(member).await;

        let mut group = Group::new(admin, "crew", [member]);
        fx.rooms.join(admin, &a, group.id).await;
        fx.rooms.join(member, &old_tab, group.id).await;
        fx.rooms.join(member, &new_tab, group.id).await;
        group.remove_member(member);
        fx.dispatcher.group_updated(&group, Some(member)).await;

        let secret = Message::group(admin, group.id, MessageBody::text("secret"));
        fx.dispatcher.new_message(&secret).await;

        assert!(drain(&mut old_rx).is_empty());
        assert_eq!(
            drain(&mut new_rx),
            vec![PushEvent::GroupUpdate(GroupUpdate::removed(group.id))]
        );
        assert_eq!(drain(&mut admin_rx).len(), 2);
        assert_eq!(fx.rooms.members_of(group.id).await.len(), 1);
    }
}
