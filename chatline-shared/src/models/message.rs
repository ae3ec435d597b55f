use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{GroupId, MessageId, UserId};

/// A stored chat message, direct or group.
///
/// Exactly one of `receiver_id` / `group_id` is set. `reactions` holds at
/// most one emoji per user; a newer reaction from the same user replaces the
/// older one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Reference to an image already stored by the media collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: BTreeMap<UserId, String>,
    #[serde(default)]
    pub read_by: BTreeSet<UserId>,
}

/// Where a message travels: a direct pair or a group room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRoute {
    Direct { sender: UserId, receiver: UserId },
    Group(GroupId),
}

impl Message {
    #[must_use]
    pub fn direct(sender_id: UserId, receiver_id: UserId, body: MessageBody) -> Self {
        Self {
            id: MessageId::new_v4(),
            sender_id,
            receiver_id: Some(receiver_id),
            group_id: None,
            text: body.text,
            image: body.image,
            created_at: Utc::now(),
            reactions: BTreeMap::new(),
            read_by: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn group(sender_id: UserId, group_id: GroupId, body: MessageBody) -> Self {
        Self {
            id: MessageId::new_v4(),
            sender_id,
            receiver_id: None,
            group_id: Some(group_id),
            text: body.text,
            image: body.image,
            created_at: Utc::now(),
            reactions: BTreeMap::new(),
            read_by: BTreeSet::new(),
        }
    }

    /// Returns the delivery route, or `None` for a malformed record that
    /// names neither a receiver nor a group.
    #[must_use]
    pub fn route(&self) -> Option<MessageRoute> {
        match (self.group_id, self.receiver_id) {
            (Some(group), _) => Some(MessageRoute::Group(group)),
            (None, Some(receiver)) => Some(MessageRoute::Direct {
                sender: self.sender_id,
                receiver,
            }),
            (None, None) => None,
        }
    }

    /// Sets `user`'s reaction, replacing any previous one.
    pub fn set_reaction(&mut self, user: UserId, emoji: impl Into<String>) {
        self.reactions.insert(user, emoji.into());
    }

    /// Removes `user`'s reaction. Returns whether one was present.
    pub fn clear_reaction(&mut self, user: UserId) -> bool {
        self.reactions.remove(&user).is_some()
    }

    /// Records that `user` has read the message. Returns `false` if the
    /// receipt was already present.
    pub fn mark_read_by(&mut self, user: UserId) -> bool {
        self.read_by.insert(user)
    }
}

/// Body shared by direct and group send requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl MessageBody {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    /// A body is empty when it carries neither non-blank text nor an image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let has_text = self.text.as_deref().is_some_and(|text| !text.trim().is_empty());
        let has_image = self.image.as_deref().is_some_and(|image| !image.is_empty());
        !has_text && !has_image
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ReactionRequest {
    pub emoji: String,
}
