use std::sync::Arc;

use shared::config::server::Config;

use crate::{
    hub::Hub,
    services::chat_service::ChatService,
    store::{ConversationStore, MemoryStore},
};

/// Application state shared across all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) config: Arc<Config>,
    pub(crate) hub: Hub,
    pub(crate) chat: ChatService,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn ConversationStore>) -> Self {
        let hub = Hub::new(config.hub.channel_capacity);
        let chat = ChatService::new(store, hub.clone());
        Self { config, hub, chat }
    }

    /// State backed by a fresh in-memory store.
    pub fn in_memory(config: Arc<Config>) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(Arc::new(Config::default()))
    }
}
