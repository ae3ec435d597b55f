//! Lifecycle of locally applied mutations awaiting the server's verdict.

use shared::models::{Message, MessageId, UserId};

use crate::{
    epoch::Epoch,
    error::{ClientError, ClientResult},
};

/// A mutation the client applies to its own copy of a message before the
/// server confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// Set the actor's reaction, replacing any earlier one.
    React(String),
    Unreact,
    MarkRead,
}

impl MutationKind {
    /// Applies the mutation for `actor`. Returns whether `message` changed.
    pub fn apply(&self, actor: UserId, message: &mut Message) -> bool {
        match self {
            Self::React(emoji) => {
                if message.reactions.get(&actor) == Some(emoji) {
                    return false;
                }
                message.set_reaction(actor, emoji.clone());
                true
            }
            Self::Unreact => message.clear_reaction(actor),
            Self::MarkRead => message.mark_read_by(actor),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::React(_) => "react",
            Self::Unreact => "unreact",
            Self::MarkRead => "mark_read",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub(crate) u64);

/// Handle for an in-flight mutation; pass it back to settle the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTicket {
    pub id: MutationId,
    pub epoch: Epoch,
    pub message_id: MessageId,
    pub kind: MutationKind,
}

/// How a rejected mutation was undone locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// The message no longer exists server-side and was dropped.
    Removed,
    /// The pre-mutation snapshot was put back.
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Committed,
    RolledBack(Rollback),
}

/// A pending mutation together with the snapshot taken before it was applied.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    ticket: MutationTicket,
    before: Message,
}

/// What settling a mutation did and what, if anything, to show the user.
#[derive(Debug)]
pub struct Settlement {
    pub state: MutationState,
    pub surfaced: Option<ClientError>,
    pub(crate) effect: LocalEffect,
}

/// Change to make to the local copy of the mutated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LocalEffect {
    Replace(Message),
    Remove,
    Keep,
}

impl PendingMutation {
    #[must_use]
    pub fn new(ticket: MutationTicket, before: Message) -> Self {
        Self { ticket, before }
    }

    #[must_use]
    pub const fn ticket(&self) -> &MutationTicket {
        &self.ticket
    }

    /// Resolves the mutation against the server's answer.
    ///
    /// NotFound drops the message silently. Forbidden and validation
    /// rejections put the snapshot back and surface the error. Any other
    /// failure keeps the optimistic value and surfaces the error.
    #[must_use]
    pub fn settle(self, outcome: ClientResult<Message>) -> Settlement {
        let (state, surfaced, effect) = match outcome {
            Ok(authoritative) => (
                MutationState::Committed,
                None,
                LocalEffect::Replace(authoritative),
            ),
            Err(err) if err.is_not_found() => (
                MutationState::RolledBack(Rollback::Removed),
                None,
                LocalEffect::Remove,
            ),
            Err(err @ (ClientError::Forbidden(_) | ClientError::Validation(_))) => (
                MutationState::RolledBack(Rollback::Restored),
                Some(err),
                LocalEffect::Replace(self.before),
            ),
            Err(err) => (MutationState::Committed, Some(err), LocalEffect::Keep),
        };

        Settlement {
            state,
            surfaced,
            effect,
        }
    }
}
