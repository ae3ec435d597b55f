use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::{GroupId, Message, UserId};

/// The conversation a client is looking at, seen from that client's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversationRef {
    /// Direct conversation with the given peer.
    Direct(UserId),
    Group(GroupId),
}

impl ConversationRef {
    /// Whether `message` belongs to this conversation.
    ///
    /// A direct message matches when the peer is either its sender or its
    /// receiver; the viewer is implicitly the other party because the push
    /// channel only ever carries messages addressed to them.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::Direct(peer) => {
                message.group_id.is_none()
                    && (message.sender_id == *peer || message.receiver_id == Some(*peer))
            }
            Self::Group(group) => message.group_id == Some(*group),
        }
    }

    #[must_use]
    pub const fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Group(group) => Some(*group),
            Self::Direct(_) => None,
        }
    }
}

impl Display for ConversationRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Direct(peer) => write!(f, "direct:{peer}"),
            Self::Group(group) => write!(f, "group:{group}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageBody;

    #[test]
    fn direct_matches_either_direction() {
        let me = UserId::new_v4();
        let peer = UserId::new_v4();
        let stranger = UserId::new_v4();
        let conversation = ConversationRef::Direct(peer);

        assert!(conversation.matches(&Message::direct(peer, me, MessageBody::text("a"))));
        assert!(conversation.matches(&Message::direct(me, peer, MessageBody::text("b"))));
        assert!(!conversation.matches(&Message::direct(stranger, me, MessageBody::text("c"))));
    }

    #[test]
    fn group_messages_never_match_direct_conversations() {
        let peer = UserId::new_v4();
        let group = GroupId::new_v4();
        let message = Message::group(peer, group, MessageBody::text("hello room"));

        assert!(!ConversationRef::Direct(peer).matches(&message));
        assert!(ConversationRef::Group(group).matches(&message));
        assert!(!ConversationRef::Group(GroupId::new_v4()).matches(&message));
    }
}
