use serde::{Deserialize, Serialize};

use super::{GroupDeleted, GroupId, GroupUpdate, Message, UserId};

/// Events pushed from the hub to a live connection.
///
/// On the wire every event is `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum PushEvent {
    /// A direct message, delivered to the receiver only.
    NewMessage(Message),
    NewGroupMessage(Message),
    /// Authoritative message snapshot after a reaction was added or removed.
    ReactionUpdate(Message),
    /// Authoritative message snapshot after a read receipt was recorded.
    ReadReceiptUpdate(Message),
    GroupUpdate(GroupUpdate),
    GroupDeleted(GroupDeleted),
    /// Every identity that currently has a live connection, sorted.
    GetOnlineUsers(Vec<UserId>),
}

impl PushEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "newMessage",
            Self::NewGroupMessage(_) => "newGroupMessage",
            Self::ReactionUpdate(_) => "reactionUpdate",
            Self::ReadReceiptUpdate(_) => "readReceiptUpdate",
            Self::GroupUpdate(_) => "groupUpdate",
            Self::GroupDeleted(_) => "groupDeleted",
            Self::GetOnlineUsers(_) => "getOnlineUsers",
        }
    }

    /// The message carried by the event, for the four message-bearing kinds.
    #[must_use]
    pub const fn message(&self) -> Option<&Message> {
        match self {
            Self::NewMessage(message)
            | Self::NewGroupMessage(message)
            | Self::ReactionUpdate(message)
            | Self::ReadReceiptUpdate(message) => Some(message),
            Self::GroupUpdate(_) | Self::GroupDeleted(_) | Self::GetOnlineUsers(_) => None,
        }
    }
}

/// Control events sent by a client over its push connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ControlEvent {
    JoinGroup(GroupId),
    LeaveGroup(GroupId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageBody;
    use serde_json::json;

    #[test]
    fn push_events_use_camel_case_names_on_the_wire() {
        let message = Message::direct(UserId::new_v4(), UserId::new_v4(), MessageBody::text("hi"));
        let event = PushEvent::NewMessage(message.clone());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["text"], "hi");

        let parsed: PushEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.message(), Some(&message));
    }

    #[test]
    fn online_users_payload_is_a_plain_array() {
        let user = UserId::new_v4();
        let json = serde_json::to_value(PushEvent::GetOnlineUsers(vec![user])).unwrap();
        assert_eq!(json, json!({ "event": "getOnlineUsers", "data": [user.to_string()] }));
    }

    #[test]
    fn control_events_parse_from_client_frames() {
        let group = GroupId::new_v4();
        let frame = json!({ "event": "joinGroup", "data": group.to_string() }).to_string();
        assert_eq!(
            serde_json::from_str::<ControlEvent>(&frame).unwrap(),
            ControlEvent::JoinGroup(group)
        );

        let frame = json!({ "event": "leaveGroup", "data": group.to_string() }).to_string();
        assert_eq!(
            serde_json::from_str::<ControlEvent>(&frame).unwrap(),
            ControlEvent::LeaveGroup(group)
        );
    }
}
