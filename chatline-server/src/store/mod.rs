/// Durable conversation state behind the hub.
pub mod memory;

use async_trait::async_trait;
use shared::models::{Group, GroupId, Message, MessageId, UserId};
use thiserror::Error;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("group {0} does not exist")]
    GroupMissing(GroupId),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic per-message edits. Applying one returns whether anything changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMutation {
    SetReaction { user: UserId, emoji: String },
    ClearReaction { user: UserId },
    MarkRead { user: UserId },
}

impl MessageMutation {
    pub fn apply(&self, message: &mut Message) -> bool {
        match self {
            Self::SetReaction { user, emoji } => {
                let changed = message.reactions.get(user) != Some(emoji);
                message.set_reaction(*user, emoji.clone());
                changed
            }
            Self::ClearReaction { user } => message.clear_reaction(*user),
            Self::MarkRead { user } => message.mark_read_by(*user),
        }
    }
}

/// Post-mutation snapshot plus whether the mutation had any effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutated {
    pub message: Message,
    pub changed: bool,
}

/// Storage collaborator consumed by the chat service.
#[async_trait]
pub trait ConversationStore: Send + Sync + std::fmt::Debug {
    /// Persists a new message and returns the stored copy.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write.
    async fn insert_message(&self, message: Message) -> StoreResult<Message>;

    /// # Errors
    /// Returns an error if the backend is unavailable.
    async fn message(&self, id: MessageId) -> StoreResult<Option<Message>>;

    /// Applies `mutation` atomically; `None` when the message is gone.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write.
    async fn mutate_message(
        &self,
        id: MessageId,
        mutation: MessageMutation,
    ) -> StoreResult<Option<Mutated>>;

    /// Messages exchanged between `a` and `b` in either direction, oldest first.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    async fn direct_history(&self, a: UserId, b: UserId) -> StoreResult<Vec<Message>>;

    /// # Errors
    /// Returns an error if the backend is unavailable.
    async fn group_history(&self, group: GroupId) -> StoreResult<Vec<Message>>;

    /// # Errors
    /// Returns an error if the backend rejects the write.
    async fn insert_group(&self, group: Group) -> StoreResult<Group>;

    /// # Errors
    /// Returns an error if the backend is unavailable.
    async fn group(&self, id: GroupId) -> StoreResult<Option<Group>>;

    /// Groups `user` belongs to, newest first.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable.
    async fn groups_for(&self, user: UserId) -> StoreResult<Vec<Group>>;

    /// Replaces an existing group record.
    ///
    /// # Errors
    /// Returns [`StoreError::GroupMissing`] if the group was deleted meanwhile.
    async fn update_group(&self, group: Group) -> StoreResult<Group>;

    /// Removes the group and its messages, returning the last snapshot.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write.
    async fn delete_group(&self, id: GroupId) -> StoreResult<Option<Group>>;
}
