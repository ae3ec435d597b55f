//! Drives a [`ClientReconciler`] against the HTTP API and the push channel.

use std::{fmt, sync::Arc};

use shared::models::{
    ControlEvent, ConversationRef, Message, MessageBody, MessageId, PushEvent, UserId,
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::ChatApi,
    epoch::Tagged,
    error::{ClientError, ClientResult},
    optimistic::{MutationKind, MutationState, Settlement},
    push::{PushReceiver, PushSender},
    reconciler::{ClientReconciler, PushOutcome},
};

/// Resolves to the history error for the current selection, if any.
pub type FetchHandle = JoinHandle<Option<ClientError>>;

/// One signed-in user's chat session.
///
/// All state lives in a single [`ClientReconciler`] behind a mutex; push
/// events are applied one at a time and history fetches run on spawned
/// tasks that resolve through the epoch check.
pub struct ChatSession<A> {
    api: Arc<A>,
    state: Arc<Mutex<ClientReconciler>>,
    controls: Mutex<mpsc::Sender<ControlEvent>>,
}

impl<A> fmt::Debug for ChatSession<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession").finish_non_exhaustive()
    }
}

impl<A: ChatApi + 'static> ChatSession<A> {
    /// `controls` feeds the push channel writer, see [`forward_controls`].
    pub fn new(api: Arc<A>, me: UserId, controls: mpsc::Sender<ControlEvent>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(ClientReconciler::new(me))),
            controls: Mutex::new(controls),
        }
    }

    /// Switches to `target` and starts its history fetch.
    ///
    /// Returns `None` when `target` is already loading or live.
    ///
    /// # Errors
    /// Returns an error if the push channel writer is gone. The selection is
    /// then left idle so that selecting it again retries.
    pub async fn select(&self, target: ConversationRef) -> ClientResult<Option<FetchHandle>> {
        let mut reconciler = self.state.lock().await;
        let transition = reconciler.select(target);
        // Sent under the lock so a concurrent switch cannot reorder leave/join.
        if let Err(err) = self.send_controls(&transition.controls).await {
            if let Some(fetch) = transition.fetch {
                reconciler.history_failed(fetch.map(|_| ClientError::Closed));
            }
            return Err(err);
        }
        drop(reconciler);

        Ok(transition.fetch.map(|tagged| self.spawn_fetch(tagged)))
    }

    /// Leaves the active conversation.
    ///
    /// # Errors
    /// Returns an error if the push channel writer is gone.
    pub async fn deselect(&self) -> ClientResult<()> {
        let mut reconciler = self.state.lock().await;
        let transition = reconciler.deselect();
        self.send_controls(&transition.controls).await
    }

    /// Switches control events to a fresh push channel and re-joins the
    /// active room on it. Rooms are per connection, so a reconnect starts
    /// with none.
    ///
    /// # Errors
    /// Returns an error if the new push channel writer is already gone.
    pub async fn rejoin(&self, controls: mpsc::Sender<ControlEvent>) -> ClientResult<()> {
        let reconciler = self.state.lock().await;
        *self.controls.lock().await = controls;
        let resubscribe = reconciler.resubscribe();
        debug!(controls = resubscribe.len(), "rejoining after reconnect");
        self.send_controls(&resubscribe).await
    }

    /// Sends to the active conversation and merges the stored message.
    ///
    /// # Errors
    /// Returns [`ClientError::NoConversation`] if nothing is selected, or
    /// the API error.
    pub async fn send(&self, body: MessageBody) -> ClientResult<Message> {
        let (conversation, epoch) = {
            let reconciler = self.state.lock().await;
            let conversation = reconciler.active().ok_or(ClientError::NoConversation)?;
            (conversation, reconciler.epoch())
        };

        let message = self.api.send(conversation, body).await?;
        self.state
            .lock()
            .await
            .confirm_sent(Tagged::new(epoch, message.clone()));
        Ok(message)
    }

    /// # Errors
    /// Returns the surfaced error of a rejected mutation.
    pub async fn react(&self, message: MessageId, emoji: &str) -> ClientResult<Option<MutationState>> {
        self.mutate(message, MutationKind::React(emoji.to_owned())).await
    }

    /// # Errors
    /// Returns the surfaced error of a rejected mutation.
    pub async fn unreact(&self, message: MessageId) -> ClientResult<Option<MutationState>> {
        self.mutate(message, MutationKind::Unreact).await
    }

    /// # Errors
    /// Returns the surfaced error of a rejected mutation.
    pub async fn mark_read(&self, message: MessageId) -> ClientResult<Option<MutationState>> {
        self.mutate(message, MutationKind::MarkRead).await
    }

    /// Applies `kind` locally, then confirms it with the server.
    ///
    /// Returns `None` if there was nothing to do or the selection changed
    /// while the call was in flight. A NotFound answer removes the message
    /// without surfacing an error.
    ///
    /// # Errors
    /// Returns any other failure reported by the server.
    pub async fn mutate(&self, message: MessageId, kind: MutationKind) -> ClientResult<Option<MutationState>> {
        let Some(ticket) = self.state.lock().await.begin(message, kind) else {
            return Ok(None);
        };

        let outcome = self.api.mutate(ticket.message_id, &ticket.kind).await;
        match self.state.lock().await.settle(&ticket, outcome) {
            None => Ok(None),
            Some(Settlement {
                surfaced: Some(err),
                ..
            }) => Err(err),
            Some(settlement) => Ok(Some(settlement.state)),
        }
    }

    /// Reloads the group sidebar.
    ///
    /// # Errors
    /// Returns the API error.
    pub async fn refresh_groups(&self) -> ClientResult<()> {
        let groups = self.api.list_groups().await?;
        self.state.lock().await.load_groups(groups);
        Ok(())
    }

    /// Applies one push event.
    pub async fn apply_push(&self, event: PushEvent) -> PushOutcome {
        let name = event.name();
        let outcome = self.state.lock().await.handle_push(event);
        debug!(event = name, ?outcome, "push event applied");
        outcome
    }

    /// Applies push events until the channel closes. `on_event` sees each
    /// event together with the updated state.
    ///
    /// # Errors
    /// Returns the transport error that ended the channel.
    pub async fn pump<F>(&self, mut receiver: PushReceiver, mut on_event: F) -> ClientResult<()>
    where
        F: FnMut(&PushEvent, PushOutcome, &ClientReconciler) + Send,
    {
        while let Some(event) = receiver.next().await {
            let event = event?;
            let mut reconciler = self.state.lock().await;
            let outcome = reconciler.handle_push(event.clone());
            on_event(&event, outcome, &reconciler);
        }
        info!("push channel ended");
        Ok(())
    }

    /// Runs `f` against the current state.
    pub async fn view<R>(&self, f: impl FnOnce(&ClientReconciler) -> R) -> R {
        f(&*self.state.lock().await)
    }

    async fn send_controls(&self, controls: &[ControlEvent]) -> ClientResult<()> {
        let sender = self.controls.lock().await.clone();
        for control in controls {
            sender
                .send(*control)
                .await
                .map_err(|_| ClientError::Closed)?;
        }
        Ok(())
    }

    fn spawn_fetch(&self, tagged: Tagged<ConversationRef>) -> FetchHandle {
        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let Tagged {
                epoch,
                value: conversation,
            } = tagged;
            let result = api.history(conversation).await;

            let mut reconciler = state.lock().await;
            match result {
                Ok(history) => {
                    let count = history.len();
                    if reconciler.apply_history(Tagged::new(epoch, history)) {
                        debug!(%conversation, count, "history applied");
                    }
                    None
                }
                Err(err) => {
                    let surfaced = reconciler.history_failed(Tagged::new(epoch, err));
                    if let Some(err) = &surfaced {
                        warn!(%conversation, error = %err, "history fetch failed");
                    }
                    surfaced
                }
            }
        })
    }
}

/// Writes queued control events to the push channel until the queue closes.
pub async fn forward_controls(mut controls: mpsc::Receiver<ControlEvent>, mut sender: PushSender) {
    while let Some(control) = controls.recv().await {
        if let Err(err) = sender.send(control).await {
            warn!(error = %err, "failed to send control event");
            return;
        }
    }
    if let Err(err) = sender.close().await {
        debug!(error = %err, "push channel close failed");
    }
}
