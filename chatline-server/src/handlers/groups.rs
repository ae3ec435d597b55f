use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};
use shared::models::{
    AddMemberRequest, CreateGroupRequest, ErrorResponse, Group, GroupId, Message, MessageBody,
    UserId,
};
use tracing::instrument;

use crate::{app_state::AppState, http::error::AppResult, middleware::request_context::RequestContext};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/groups", post(create_group).get(list_groups))
        .route("/api/groups/{group_id}", delete(delete_group))
        .route("/api/groups/{group_id}/members", post(add_member))
        .route(
            "/api/groups/{group_id}/members/{user_id}",
            delete(remove_member),
        )
        .route(
            "/api/groups/{group_id}/messages",
            post(send_group).get(group_history),
        )
}

#[utoipa::path(
    post,
    path = "/api/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created; caller is admin", body = Group),
        (status = 400, description = "Missing name or members", body = ErrorResponse)
    ),
    tag = "Groups"
)]
#[instrument(skip(state, context, payload))]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let actor = context.require_user()?;
    let Json(request) = payload?;
    let group = state.chat().create_group(actor, request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/api/groups",
    responses((status = 200, description = "Groups the caller belongs to", body = [Group])),
    tag = "Groups"
)]
#[instrument(skip(state, context))]
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<Vec<Group>>> {
    let actor = context.require_user()?;
    Ok(Json(state.chat().list_groups(actor).await?))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group_id}/members",
    params(("group_id" = GroupId, Path, description = "Group")),
    request_body = AddMemberRequest,
    responses(
        (status = 200, description = "Updated group", body = Group),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Unknown group", body = ErrorResponse)
    ),
    tag = "Groups"
)]
#[instrument(skip(state, context, payload))]
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(group_id): Path<GroupId>,
    payload: Result<Json<AddMemberRequest>, JsonRejection>,
) -> AppResult<Json<Group>> {
    let actor = context.require_user()?;
    let Json(request) = payload?;
    let group = state
        .chat()
        .add_member(actor, group_id, request.member_id)
        .await?;
    Ok(Json(group))
}

#[utoipa::path(
    delete,
    path = "/api/groups/{group_id}/members/{user_id}",
    params(
        ("group_id" = GroupId, Path, description = "Group"),
        ("user_id" = UserId, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "Updated group", body = Group),
        (status = 400, description = "Not a member, or the last admin", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Unknown group", body = ErrorResponse)
    ),
    tag = "Groups"
)]
#[instrument(skip(state, context))]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> AppResult<Json<Group>> {
    let actor = context.require_user()?;
    Ok(Json(state.chat().remove_member(actor, group_id, user_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/groups/{group_id}",
    params(("group_id" = GroupId, Path, description = "Group")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    tag = "Groups"
)]
#[instrument(skip(state, context))]
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(group_id): Path<GroupId>,
) -> AppResult<StatusCode> {
    let actor = context.require_user()?;
    state.chat().delete_group(actor, group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/groups/{group_id}/messages",
    params(("group_id" = GroupId, Path, description = "Group")),
    request_body = MessageBody,
    responses(
        (status = 201, description = "Message stored and pushed to the room", body = Message),
        (status = 403, description = "Caller is not a member", body = ErrorResponse)
    ),
    tag = "Groups"
)]
#[instrument(skip(state, context, payload))]
pub async fn send_group(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(group_id): Path<GroupId>,
    payload: Result<Json<MessageBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let actor = context.require_user()?;
    let Json(body) = payload?;
    let message = state.chat().send_group(actor, group_id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/messages",
    params(("group_id" = GroupId, Path, description = "Group")),
    responses(
        (status = 200, description = "Group history", body = [Message]),
        (status = 403, description = "Caller is not a member", body = ErrorResponse)
    ),
    tag = "Groups"
)]
#[instrument(skip(state, context))]
pub async fn group_history(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(group_id): Path<GroupId>,
) -> AppResult<Json<Vec<Message>>> {
    let actor = context.require_user()?;
    Ok(Json(state.chat().group_history(actor, group_id).await?))
}
