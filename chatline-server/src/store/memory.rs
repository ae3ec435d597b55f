use std::collections::HashMap;

use async_trait::async_trait;
use shared::models::{Group, GroupId, Message, MessageId, UserId};
use tokio::sync::RwLock;

use super::{ConversationStore, MessageMutation, Mutated, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    messages: HashMap<MessageId, Message>,
    /// Insertion order, which is also `created_at` order for one process.
    order: Vec<MessageId>,
    groups: HashMap<GroupId, Group>,
}

impl Tables {
    fn history_where(&self, predicate: impl Fn(&Message) -> bool) -> Vec<Message> {
        self.order
            .iter()
            .filter_map(|id| self.messages.get(id))
            .filter(|message| predicate(message))
            .cloned()
            .collect()
    }
}

/// Process-local store used by `serve` and the test suites.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        if let Some(group) = message.group_id {
            if !tables.groups.contains_key(&group) {
                return Err(StoreError::GroupMissing(group));
            }
        }
        tables.order.push(message.id);
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn mutate_message(
        &self,
        id: MessageId,
        mutation: MessageMutation,
    ) -> StoreResult<Option<Mutated>> {
        let mut tables = self.tables.write().await;
        Ok(tables.messages.get_mut(&id).map(|message| {
            let changed = mutation.apply(message);
            Mutated {
                message: message.clone(),
                changed,
            }
        }))
    }

    async fn direct_history(&self, a: UserId, b: UserId) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables.history_where(|message| {
            message.group_id.is_none()
                && matches!(
                    (message.sender_id, message.receiver_id),
                    (s, Some(r)) if (s == a && r == b) || (s == b && r == a)
                )
        }))
    }

    async fn group_history(&self, group: GroupId) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables.history_where(|message| message.group_id == Some(group)))
    }

    async fn insert_group(&self, group: Group) -> StoreResult<Group> {
        self.tables
            .write()
            .await
            .groups
            .insert(group.id, group.clone());
        Ok(group)
    }

    async fn group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        Ok(self.tables.read().await.groups.get(&id).cloned())
    }

    async fn groups_for(&self, user: UserId) -> StoreResult<Vec<Group>> {
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> = tables
            .groups
            .values()
            .filter(|group| group.is_member(user))
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn update_group(&self, group: Group) -> StoreResult<Group> {
        let mut tables = self.tables.write().await;
        match tables.groups.get_mut(&group.id) {
            Some(slot) => {
                *slot = group.clone();
                Ok(group)
            }
            None => Err(StoreError::GroupMissing(group.id)),
        }
    }

    async fn delete_group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        let mut tables = self.tables.write().await;
        let removed = tables.groups.remove(&id);
        if removed.is_some() {
            let Tables {
                messages, order, ..
            } = &mut *tables;
            messages.retain(|_, message| message.group_id != Some(id));
            order.retain(|message_id| messages.contains_key(message_id));
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::MessageBody;

    #[tokio::test]
    async fn direct_history_covers_both_directions_in_order() {
        let store = MemoryStore::new();
        let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());

        let first = store
            .insert_message(Message::direct(a, b, MessageBody::text("one")))
            .await
            .unwrap();
        store
            .insert_message(Message::direct(a, c, MessageBody::text("elsewhere")))
            .await
            .unwrap();
        let second = store
            .insert_message(Message::direct(b, a, MessageBody::text("two")))
            .await
            .unwrap();

        let history = store.direct_history(b, a).await.unwrap();
        let ids: Vec<_> = history.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn reaction_replaces_instead_of_accumulating() {
        let store = MemoryStore::new();
        let (a, b) = (UserId::new_v4(), UserId::new_v4());
        let message = store
            .insert_message(Message::direct(a, b, MessageBody::text("hi")))
            .await
            .unwrap();

        for emoji in ["👍", "🎉", "🎉"] {
            let mutation = MessageMutation::SetReaction {
                user: b,
                emoji: emoji.into(),
            };
            store.mutate_message(message.id, mutation).await.unwrap();
        }

        let stored = store.message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.reactions.len(), 1);
        assert_eq!(stored.reactions.get(&b).map(String::as_str), Some("🎉"));
    }

    #[tokio::test]
    async fn repeated_mark_read_reports_no_change() {
        let store = MemoryStore::new();
        let (a, b) = (UserId::new_v4(), UserId::new_v4());
        let message = store
            .insert_message(Message::direct(a, b, MessageBody::text("hi")))
            .await
            .unwrap();

        let first = store
            .mutate_message(message.id, MessageMutation::MarkRead { user: b })
            .await
            .unwrap()
            .unwrap();
        let second = store
            .mutate_message(message.id, MessageMutation::MarkRead { user: b })
            .await
            .unwrap()
            .unwrap();

        assert!(first.changed);
        assert!(!second.changed);
    }

    #[tokio::test]
    async fn mutating_missing_message_returns_none() {
        let store = MemoryStore::new();
        let outcome = store
            .mutate_message(
                MessageId::new_v4(),
                MessageMutation::ClearReaction {
                    user: UserId::new_v4(),
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn deleting_group_drops_its_messages() {
        let store = MemoryStore::new();
        let admin = UserId::new_v4();
        let group = store
            .insert_group(Group::new(admin, "ops", [UserId::new_v4()]))
            .await
            .unwrap();
        store
            .insert_message(Message::group(admin, group.id, MessageBody::text("hey")))
            .await
            .unwrap();

        assert!(store.delete_group(group.id).await.unwrap().is_some());
        assert!(store.group_history(group.id).await.unwrap().is_empty());
        assert!(store.groups_for(admin).await.unwrap().is_empty());
        assert!(matches!(
            store
                .insert_message(Message::group(admin, group.id, MessageBody::text("late")))
                .await,
            Err(StoreError::GroupMissing(_))
        ));
    }
}
