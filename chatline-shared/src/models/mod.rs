pub mod conversation;
pub mod errors;
pub mod events;
pub mod group;
pub mod ids;
pub mod message;

pub use conversation::ConversationRef;
pub use errors::{ErrorClass, ErrorResponse};
pub use events::{ControlEvent, PushEvent};
pub use group::{AddMemberRequest, CreateGroupRequest, Group, GroupDeleted, GroupRemoved, GroupUpdate};
pub use ids::{GroupId, MessageId, UserId};
pub use message::{Message, MessageBody, MessageRoute, ReactionRequest};
