//! Client-side view of the active conversation.
//!
//! [`ClientReconciler`] merges fetched history with pushed events for the one
//! conversation the user is looking at. It performs no I/O: callers feed it
//! fetch results, push events and mutation outcomes, and it tells them which
//! control events to send.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use shared::models::{
    ControlEvent, ConversationRef, Group, GroupId, GroupUpdate, Message, MessageId, PushEvent,
    UserId,
};
use tracing::{debug, warn};

use crate::{
    epoch::{Epoch, EpochClock, Tagged},
    error::ClientError,
    optimistic::{
        LocalEffect, MutationId, MutationKind, MutationState, MutationTicket, PendingMutation,
        Settlement,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No active conversation.
    Idle,
    /// History fetch in flight; pushed events are buffered.
    Loading,
    /// History applied; pushed events merge directly.
    Live,
}

/// Work the caller must perform after a selection change.
///
/// `controls` must be sent in order: the previous room is always released
/// before the next one is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub controls: Vec<ControlEvent>,
    /// History to fetch, tagged with the epoch it belongs to.
    pub fetch: Option<Tagged<ConversationRef>>,
}

impl Transition {
    fn none() -> Self {
        Self {
            controls: Vec::new(),
            fetch: None,
        }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.controls.is_empty() && self.fetch.is_none()
    }
}

/// Effect of one pushed event on local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Appended,
    Replaced,
    /// Held until the in-flight history lands.
    Buffered,
    /// Already present; nothing changed.
    Duplicate,
    /// Update for a message outside the loaded window.
    NotLoaded,
    /// Belongs to a conversation other than the active one.
    Unrelated,
    GroupsChanged,
    /// The active group went away; the reconciler is idle again.
    ActiveClosed(GroupId),
    OnlineChanged,
}

/// Reconciles history and live events for a single active conversation.
#[derive(Debug)]
pub struct ClientReconciler {
    me: UserId,
    clock: EpochClock,
    active: Option<ConversationRef>,
    phase: Phase,
    messages: Vec<Message>,
    buffered: Vec<Tagged<PushEvent>>,
    pending: HashMap<MutationId, PendingMutation>,
    next_mutation: u64,
    groups: BTreeMap<GroupId, Group>,
    online: BTreeSet<UserId>,
}

impl ClientReconciler {
    #[must_use]
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            clock: EpochClock::new(),
            active: None,
            phase: Phase::Idle,
            messages: Vec::new(),
            buffered: Vec::new(),
            pending: HashMap::new(),
            next_mutation: 0,
            groups: BTreeMap::new(),
            online: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn me(&self) -> UserId {
        self.me
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn active(&self) -> Option<ConversationRef> {
        self.active
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.clock.current()
    }

    /// Displayed messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    #[must_use]
    pub fn online_users(&self) -> &BTreeSet<UserId> {
        &self.online
    }

    #[must_use]
    pub fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    /// Makes `target` the active conversation.
    ///
    /// Re-selecting the conversation that is already loading or live does
    /// nothing. Otherwise the epoch advances, the displayed list is cleared
    /// and in-flight work for the previous selection becomes stale.
    pub fn select(&mut self, target: ConversationRef) -> Transition {
        if self.active == Some(target) && self.phase != Phase::Idle {
            debug!(conversation = %target, "already selected");
            return Transition::none();
        }

        let mut controls = self.release();
        let epoch = self.clock.advance();
        self.active = Some(target);
        self.phase = Phase::Loading;
        if let Some(group) = target.group_id() {
            controls.push(ControlEvent::JoinGroup(group));
        }
        debug!(conversation = %target, %epoch, "conversation selected");

        Transition {
            controls,
            fetch: Some(Tagged::new(epoch, target)),
        }
    }

    /// Leaves the active conversation, if any.
    pub fn deselect(&mut self) -> Transition {
        if self.active.is_none() {
            return Transition::none();
        }
        let controls = self.release();
        self.clock.advance();
        Transition {
            controls,
            fetch: None,
        }
    }

    /// Control events that restore room membership on a fresh push connection.
    #[must_use]
    pub fn resubscribe(&self) -> Vec<ControlEvent> {
        match (self.phase, self.active.and_then(|active| active.group_id())) {
            (Phase::Loading | Phase::Live, Some(group)) => vec![ControlEvent::JoinGroup(group)],
            _ => Vec::new(),
        }
    }

    /// Applies fetched history. Returns `false` if it arrived for a stale epoch.
    pub fn apply_history(&mut self, history: Tagged<Vec<Message>>) -> bool {
        let Some(history) = self.clock.accept(history) else {
            debug!("discarding stale history");
            return false;
        };
        if self.phase != Phase::Loading {
            return false;
        }

        self.messages = history;
        self.phase = Phase::Live;
        for event in std::mem::take(&mut self.buffered) {
            if let Some(event) = self.clock.accept(event) {
                self.merge(event);
            }
        }
        true
    }

    /// Records a failed history fetch. The error is returned only if it
    /// belongs to the current selection.
    pub fn history_failed(&mut self, error: Tagged<ClientError>) -> Option<ClientError> {
        let error = self.clock.accept(error)?;
        if self.phase == Phase::Loading {
            // Back to idle so that selecting the same target fetches again.
            self.phase = Phase::Idle;
            self.buffered.clear();
        }
        Some(error)
    }

    /// Merges the message returned by a successful send.
    pub fn confirm_sent(&mut self, sent: Tagged<Message>) -> PushOutcome {
        match self.clock.accept(sent) {
            Some(message) if self.is_active(&message) => match self.phase {
                Phase::Live => self.append(message),
                Phase::Loading => {
                    let event = if message.group_id.is_some() {
                        PushEvent::NewGroupMessage(message)
                    } else {
                        PushEvent::NewMessage(message)
                    };
                    self.buffered.push(self.clock.tag(event));
                    PushOutcome::Buffered
                }
                Phase::Idle => PushOutcome::Unrelated,
            },
            _ => PushOutcome::Unrelated,
        }
    }

    /// Applies one event from the push channel.
    pub fn handle_push(&mut self, event: PushEvent) -> PushOutcome {
        match event {
            PushEvent::GetOnlineUsers(users) => {
                self.online = users.into_iter().collect();
                PushOutcome::OnlineChanged
            }
            PushEvent::GroupUpdate(GroupUpdate::Snapshot(group)) => {
                if group.is_member(self.me) {
                    self.groups.insert(group.id, group);
                    PushOutcome::GroupsChanged
                } else {
                    self.drop_group(group.id)
                }
            }
            PushEvent::GroupUpdate(GroupUpdate::Removed(marker)) => self.drop_group(marker.id),
            PushEvent::GroupDeleted(deleted) => self.drop_group(deleted.id),
            message_event => {
                let Some(message) = message_event.message() else {
                    return PushOutcome::Unrelated;
                };
                if !self.is_active(message) {
                    return PushOutcome::Unrelated;
                }
                match self.phase {
                    Phase::Idle => PushOutcome::Unrelated,
                    Phase::Loading => {
                        self.buffered.push(self.clock.tag(message_event));
                        PushOutcome::Buffered
                    }
                    Phase::Live => self.merge(message_event),
                }
            }
        }
    }

    /// Replaces the group sidebar with a fetched list.
    pub fn load_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups.into_iter().map(|group| (group.id, group)).collect();
    }

    /// Applies `kind` to a loaded message ahead of the server round-trip.
    ///
    /// Returns `None` when there is nothing to send: the message is not
    /// loaded, the mutation would not change it, or it is a read receipt on
    /// the user's own message.
    pub fn begin(&mut self, message_id: MessageId, kind: MutationKind) -> Option<MutationTicket> {
        if self.phase != Phase::Live {
            return None;
        }
        let me = self.me;
        let message = self.messages.iter_mut().find(|m| m.id == message_id)?;
        if matches!(kind, MutationKind::MarkRead) && message.sender_id == me {
            return None;
        }

        let before = message.clone();
        if !kind.apply(me, message) {
            return None;
        }

        self.next_mutation += 1;
        let ticket = MutationTicket {
            id: MutationId(self.next_mutation),
            epoch: self.clock.current(),
            message_id,
            kind,
        };
        self.pending
            .insert(ticket.id, PendingMutation::new(ticket.clone(), before));
        debug!(message_id = %message_id, mutation = ticket.kind.name(), "optimistic mutation applied");
        Some(ticket)
    }

    /// Resolves a mutation started by [`begin`](Self::begin).
    ///
    /// Returns `None` if the ticket is unknown or from a previous selection;
    /// its effect is discarded either way.
    pub fn settle(
        &mut self,
        ticket: &MutationTicket,
        outcome: Result<Message, ClientError>,
    ) -> Option<Settlement> {
        if !self.clock.is_current(ticket.epoch) {
            return None;
        }
        let mutation = self.pending.remove(&ticket.id)?;
        let settlement = mutation.settle(outcome);

        match &settlement.effect {
            LocalEffect::Replace(message) => {
                self.replace(message.clone());
            }
            LocalEffect::Remove => {
                self.messages.retain(|m| m.id != ticket.message_id);
                debug!(message_id = %ticket.message_id, "message vanished; rolled back");
            }
            LocalEffect::Keep => {}
        }
        if let Some(err) = &settlement.surfaced {
            warn!(message_id = %ticket.message_id, error = %err, "mutation failed");
        }
        Some(settlement)
    }

    /// Lifecycle state of a mutation; `None` once it has been settled.
    #[must_use]
    pub fn mutation_state(&self, id: MutationId) -> Option<MutationState> {
        self.pending.contains_key(&id).then_some(MutationState::Pending)
    }

    fn release(&mut self) -> Vec<ControlEvent> {
        let controls = self
            .active
            .take()
            .and_then(|previous| previous.group_id())
            .map(ControlEvent::LeaveGroup)
            .into_iter()
            .collect();
        self.phase = Phase::Idle;
        self.messages.clear();
        self.buffered.clear();
        self.pending.clear();
        controls
    }

    fn drop_group(&mut self, id: GroupId) -> PushOutcome {
        self.groups.remove(&id);
        if self.active == Some(ConversationRef::Group(id)) {
            // The server has already dropped this connection from the room.
            self.active = None;
            self.phase = Phase::Idle;
            self.messages.clear();
            self.buffered.clear();
            self.pending.clear();
            self.clock.advance();
            return PushOutcome::ActiveClosed(id);
        }
        PushOutcome::GroupsChanged
    }

    fn is_active(&self, message: &Message) -> bool {
        self.active.is_some_and(|active| active.matches(message))
    }

    fn merge(&mut self, event: PushEvent) -> PushOutcome {
        match event {
            PushEvent::NewMessage(message) | PushEvent::NewGroupMessage(message) => {
                self.append(message)
            }
            PushEvent::ReactionUpdate(message) | PushEvent::ReadReceiptUpdate(message) => {
                self.replace(message)
            }
            PushEvent::GroupUpdate(_) | PushEvent::GroupDeleted(_) | PushEvent::GetOnlineUsers(_) => {
                PushOutcome::Unrelated
            }
        }
    }

    fn append(&mut self, message: Message) -> PushOutcome {
        if self.messages.iter().any(|m| m.id == message.id) {
            return PushOutcome::Duplicate;
        }
        self.messages.push(message);
        PushOutcome::Appended
    }

    fn replace(&mut self, message: Message) -> PushOutcome {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message;
                PushOutcome::Replaced
            }
            None => PushOutcome::NotLoaded,
        }
    }
}
