use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{GroupId, UserId};

/// A group conversation. `admins` is always a non-empty subset of `members`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: BTreeSet<UserId>,
    pub admins: BTreeSet<UserId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Builds a group whose creator is both a member and the sole admin.
    #[must_use]
    pub fn new(
        creator: UserId,
        name: impl Into<String>,
        member_ids: impl IntoIterator<Item = UserId>,
    ) -> Self {
        let mut members: BTreeSet<UserId> = member_ids.into_iter().collect();
        members.insert(creator);
        Self {
            id: GroupId::new_v4(),
            name: name.into(),
            members,
            admins: BTreeSet::from([creator]),
            created_by: creator,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Removes `user` from members and admins alike.
    pub fn remove_member(&mut self, user: UserId) -> bool {
        self.admins.remove(&user);
        self.members.remove(&user)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AddMemberRequest {
    pub member_id: UserId,
}

/// Payload of the `groupUpdate` push event.
///
/// Members still in the group receive the full snapshot; a member who was
/// just removed receives the eviction marker instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(untagged)]
pub enum GroupUpdate {
    Snapshot(Group),
    Removed(GroupRemoved),
}

impl GroupUpdate {
    #[must_use]
    pub fn removed(id: GroupId) -> Self {
        Self::Removed(GroupRemoved { id, removed: true })
    }

    #[must_use]
    pub fn group_id(&self) -> GroupId {
        match self {
            Self::Snapshot(group) => group.id,
            Self::Removed(marker) => marker.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct GroupRemoved {
    pub id: GroupId,
    pub removed: bool,
}

/// Payload of the `groupDeleted` push event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct GroupDeleted {
    pub id: GroupId,
}
