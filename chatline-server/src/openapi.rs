#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    AddMemberRequest, CreateGroupRequest, ErrorResponse, Group, GroupDeleted, GroupRemoved,
    GroupUpdate, Message, MessageBody, ReactionRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chatline API",
        version = "1.0.0",
        description = "Direct and group messaging with live push delivery"
    ),
    paths(
        crate::handlers::messages::direct_history,
        crate::handlers::messages::send_direct,
        crate::handlers::messages::add_reaction,
        crate::handlers::messages::remove_reaction,
        crate::handlers::messages::mark_read,
        crate::handlers::groups::create_group,
        crate::handlers::groups::list_groups,
        crate::handlers::groups::add_member,
        crate::handlers::groups::remove_member,
        crate::handlers::groups::delete_group,
        crate::handlers::groups::send_group,
        crate::handlers::groups::group_history,
    ),
    components(
        schemas(
            Message,
            MessageBody,
            ReactionRequest,
            Group,
            CreateGroupRequest,
            AddMemberRequest,
            GroupUpdate,
            GroupRemoved,
            GroupDeleted,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Messages", description = "Direct messages, reactions and read receipts"),
        (name = "Groups", description = "Group lifecycle and group messages")
    )
)]
pub struct ApiDoc;
