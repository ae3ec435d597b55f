/// Chat operations over the store and the hub
pub mod chat_service;

pub use chat_service::{ChatService, ChatServiceError};
