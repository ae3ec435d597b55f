use std::fmt;
use std::sync::Arc;

use shared::models::{
    CreateGroupRequest, Group, GroupId, Message, MessageBody, MessageId, MessageRoute, UserId,
};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::hub::Hub;
use crate::store::{ConversationStore, MessageMutation, StoreError};

#[derive(Debug, Error)]
pub enum ChatServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ChatServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::GroupMissing(id) => Self::NotFound(format!("group {id} not found")),
            other @ StoreError::Backend(_) => Self::Store(other),
        }
    }
}

pub type ChatServiceResult<T> = Result<T, ChatServiceError>;

/// Applies chat mutations to the store, then hands the authoritative result
/// to the hub for push delivery. A write never fails because a push missed.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    hub: Hub,
}

impl fmt::Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatService").finish_non_exhaustive()
    }
}

impl ChatService {
    pub fn new(store: Arc<dyn ConversationStore>, hub: Hub) -> Self {
        Self { store, hub }
    }

    #[instrument(name = "chat.direct_history", skip(self), err)]
    pub async fn direct_history(&self, actor: UserId, peer: UserId) -> ChatServiceResult<Vec<Message>> {
        Ok(self.store.direct_history(actor, peer).await?)
    }

    #[instrument(name = "chat.send_direct", skip(self, body), err)]
    pub async fn send_direct(
        &self,
        actor: UserId,
        peer: UserId,
        body: MessageBody,
    ) -> ChatServiceResult<Message> {
        validate_body(&body)?;
        let message = self
            .store
            .insert_message(Message::direct(actor, peer, body))
            .await?;
        let report = self.hub.dispatcher().new_message(&message).await;
        debug!(message_id = %message.id, delivered = report.delivered, "direct message sent");
        Ok(message)
    }

    #[instrument(name = "chat.group_history", skip(self), err)]
    pub async fn group_history(&self, actor: UserId, group: GroupId) -> ChatServiceResult<Vec<Message>> {
        self.member_group(actor, group).await?;
        Ok(self.store.group_history(group).await?)
    }

    #[instrument(name = "chat.send_group", skip(self, body), err)]
    pub async fn send_group(
        &self,
        actor: UserId,
        group: GroupId,
        body: MessageBody,
    ) -> ChatServiceResult<Message> {
        validate_body(&body)?;
        self.member_group(actor, group).await?;
        let message = self
            .store
            .insert_message(Message::group(actor, group, body))
            .await?;
        let report = self.hub.dispatcher().new_message(&message).await;
        debug!(message_id = %message.id, delivered = report.delivered, "group message sent");
        Ok(message)
    }

    /// Sets the actor's single reaction on a message, replacing any earlier one.
    #[instrument(name = "chat.add_reaction", skip(self), err)]
    pub async fn add_reaction(
        &self,
        actor: UserId,
        message: MessageId,
        emoji: &str,
    ) -> ChatServiceResult<Message> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(ChatServiceError::Validation("emoji is required".into()));
        }
        self.participant_message(actor, message).await?;
        let mutation = MessageMutation::SetReaction {
            user: actor,
            emoji: emoji.to_owned(),
        };
        let updated = self.mutate(message, mutation).await?;
        self.hub.dispatcher().reaction_changed(&updated).await;
        Ok(updated)
    }

    #[instrument(name = "chat.remove_reaction", skip(self), err)]
    pub async fn remove_reaction(&self, actor: UserId, message: MessageId) -> ChatServiceResult<Message> {
        self.participant_message(actor, message).await?;
        let updated = self
            .mutate(message, MessageMutation::ClearReaction { user: actor })
            .await?;
        self.hub.dispatcher().reaction_changed(&updated).await;
        Ok(updated)
    }

    /// Records a read receipt. Only a newly recorded receipt is pushed; the
    /// sender marking its own message is a no-op.
    #[instrument(name = "chat.mark_read", skip(self), err)]
    pub async fn mark_read(&self, actor: UserId, message: MessageId) -> ChatServiceResult<Message> {
        let current = self.participant_message(actor, message).await?;
        if current.sender_id == actor {
            return Ok(current);
        }
        let outcome = self
            .store
            .mutate_message(message, MessageMutation::MarkRead { user: actor })
            .await?
            .ok_or_else(|| message_not_found(message))?;
        if outcome.changed {
            self.hub.dispatcher().read_receipt(&outcome.message).await;
        }
        Ok(outcome.message)
    }

    #[instrument(name = "chat.create_group", skip(self, request), err)]
    pub async fn create_group(&self, actor: UserId, request: CreateGroupRequest) -> ChatServiceResult<Group> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ChatServiceError::Validation("group name is required".into()));
        }
        if request.member_ids.is_empty() {
            return Err(ChatServiceError::Validation(
                "at least one member is required".into(),
            ));
        }
        let group = self
            .store
            .insert_group(Group::new(actor, name, request.member_ids))
            .await?;
        self.hub.dispatcher().group_updated(&group, None).await;
        Ok(group)
    }

    #[instrument(name = "chat.list_groups", skip(self), err)]
    pub async fn list_groups(&self, actor: UserId) -> ChatServiceResult<Vec<Group>> {
        Ok(self.store.groups_for(actor).await?)
    }

    #[instrument(name = "chat.add_member", skip(self), err)]
    pub async fn add_member(
        &self,
        actor: UserId,
        group: GroupId,
        member: UserId,
    ) -> ChatServiceResult<Group> {
        let mut record = self.admin_group(actor, group).await?;
        if !record.members.insert(member) {
            return Err(ChatServiceError::Validation(format!(
                "user {member} is already a member"
            )));
        }
        let record = self.store.update_group(record).await?;
        self.hub.dispatcher().group_updated(&record, None).await;
        Ok(record)
    }

    #[instrument(name = "chat.remove_member", skip(self), err)]
    pub async fn remove_member(
        &self,
        actor: UserId,
        group: GroupId,
        member: UserId,
    ) -> ChatServiceResult<Group> {
        let mut record = self.admin_group(actor, group).await?;
        if !record.is_member(member) {
            return Err(ChatServiceError::Validation(format!(
                "user {member} is not a member of group {group}"
            )));
        }
        if record.admins.len() == 1 && record.is_admin(member) {
            return Err(ChatServiceError::Validation(
                "cannot remove the last admin; delete the group instead".into(),
            ));
        }
        record.remove_member(member);
        let record = self.store.update_group(record).await?;
        self.hub.dispatcher().group_updated(&record, Some(member)).await;
        Ok(record)
    }

    #[instrument(name = "chat.delete_group", skip(self), err)]
    pub async fn delete_group(&self, actor: UserId, group: GroupId) -> ChatServiceResult<()> {
        self.admin_group(actor, group).await?;
        let removed = self
            .store
            .delete_group(group)
            .await?
            .ok_or_else(|| group_not_found(group))?;
        self.hub.dispatcher().group_deleted(&removed).await;
        Ok(())
    }

    /// Checks that `actor` may join the live room of `group`.
    ///
    /// # Errors
    /// `NotFound` for an unknown group, `Forbidden` for a non-member.
    pub async fn authorize_join(&self, actor: UserId, group: GroupId) -> ChatServiceResult<()> {
        self.member_group(actor, group).await.map(|_| ())
    }

    async fn member_group(&self, actor: UserId, group: GroupId) -> ChatServiceResult<Group> {
        let record = self
            .store
            .group(group)
            .await?
            .ok_or_else(|| group_not_found(group))?;
        if !record.is_member(actor) {
            return Err(ChatServiceError::Forbidden(format!(
                "not a member of group {group}"
            )));
        }
        Ok(record)
    }

    async fn admin_group(&self, actor: UserId, group: GroupId) -> ChatServiceResult<Group> {
        let record = self
            .store
            .group(group)
            .await?
            .ok_or_else(|| group_not_found(group))?;
        if !record.is_admin(actor) {
            return Err(ChatServiceError::Forbidden(format!(
                "admin rights on group {group} required"
            )));
        }
        Ok(record)
    }

    /// Loads a message the actor takes part in: its sender or receiver for
    /// direct messages, a member of its group otherwise.
    async fn participant_message(&self, actor: UserId, id: MessageId) -> ChatServiceResult<Message> {
        let message = self
            .store
            .message(id)
            .await?
            .ok_or_else(|| message_not_found(id))?;
        match message.route() {
            Some(MessageRoute::Direct { sender, receiver }) if actor == sender || actor == receiver => {
                Ok(message)
            }
            Some(MessageRoute::Group(group)) => {
                self.member_group(actor, group).await?;
                Ok(message)
            }
            _ => Err(ChatServiceError::Forbidden(format!(
                "not a participant of message {id}"
            ))),
        }
    }

    async fn mutate(&self, id: MessageId, mutation: MessageMutation) -> ChatServiceResult<Message> {
        self.store
            .mutate_message(id, mutation)
            .await?
            .map(|outcome| outcome.message)
            .ok_or_else(|| message_not_found(id))
    }
}

fn validate_body(body: &MessageBody) -> ChatServiceResult<()> {
    if body.is_empty() {
        return Err(ChatServiceError::Validation(
            "message needs text or an image".into(),
        ));
    }
    Ok(())
}

fn message_not_found(id: MessageId) -> ChatServiceError {
    ChatServiceError::NotFound(format!("message {id} not found"))
}

fn group_not_found(id: GroupId) -> ChatServiceError {
    ChatServiceError::NotFound(format!("group {id} not found"))
}
