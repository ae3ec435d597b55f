#![cfg_attr(not(test), forbid(unsafe_code))]

//! Chatline client: keeps one active conversation consistent while history
//! fetches and pushed events race each other.

pub mod api;
pub mod epoch;
pub mod error;
pub mod optimistic;
pub mod push;
pub mod reconciler;
pub mod session;

pub use api::{ChatApi, HttpChatApi};
pub use epoch::{Epoch, EpochClock, Tagged};
pub use error::{ClientError, ClientResult};
pub use optimistic::{MutationKind, MutationState, Rollback};
pub use reconciler::{ClientReconciler, Phase, PushOutcome, Transition};
pub use session::ChatSession;
