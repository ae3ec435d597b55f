use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use shared::models::{ErrorResponse, Message, MessageBody, MessageId, ReactionRequest, UserId};
use tracing::instrument;

use crate::{app_state::AppState, http::error::AppResult, middleware::request_context::RequestContext};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages/{peer_id}", get(direct_history))
        .route("/api/messages/send/{peer_id}", post(send_direct))
        .route(
            "/api/messages/{message_id}/reactions",
            post(add_reaction).delete(remove_reaction),
        )
        .route("/api/messages/{message_id}/read", post(mark_read))
}

/// Direct history between the caller and `peer_id`, oldest first.
#[utoipa::path(
    get,
    path = "/api/messages/{peer_id}",
    params(("peer_id" = UserId, Path, description = "Other participant")),
    responses(
        (status = 200, description = "Conversation history", body = [Message]),
        (status = 401, description = "Missing caller identity", body = ErrorResponse)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, context))]
pub async fn direct_history(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(peer_id): Path<UserId>,
) -> AppResult<Json<Vec<Message>>> {
    let actor = context.require_user()?;
    let history = state.chat().direct_history(actor, peer_id).await?;
    Ok(Json(history))
}

#[utoipa::path(
    post,
    path = "/api/messages/send/{peer_id}",
    params(("peer_id" = UserId, Path, description = "Receiver")),
    request_body = MessageBody,
    responses(
        (status = 201, description = "Message stored and pushed", body = Message),
        (status = 400, description = "Empty message", body = ErrorResponse)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, context, payload))]
pub async fn send_direct(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(peer_id): Path<UserId>,
    payload: Result<Json<MessageBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let actor = context.require_user()?;
    let Json(body) = payload?;
    let message = state.chat().send_direct(actor, peer_id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/reactions",
    params(("message_id" = MessageId, Path, description = "Reacted message")),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Authoritative message", body = Message),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Message no longer exists", body = ErrorResponse)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, context, payload))]
pub async fn add_reaction(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(message_id): Path<MessageId>,
    payload: Result<Json<ReactionRequest>, JsonRejection>,
) -> AppResult<Json<Message>> {
    let actor = context.require_user()?;
    let Json(request) = payload?;
    let message = state
        .chat()
        .add_reaction(actor, message_id, &request.emoji)
        .await?;
    Ok(Json(message))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}/reactions",
    params(("message_id" = MessageId, Path, description = "Reacted message")),
    responses(
        (status = 200, description = "Authoritative message", body = Message),
        (status = 404, description = "Message no longer exists", body = ErrorResponse)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, context))]
pub async fn remove_reaction(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(message_id): Path<MessageId>,
) -> AppResult<Json<Message>> {
    let actor = context.require_user()?;
    Ok(Json(state.chat().remove_reaction(actor, message_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/read",
    params(("message_id" = MessageId, Path, description = "Read message")),
    responses(
        (status = 200, description = "Authoritative message", body = Message),
        (status = 404, description = "Message no longer exists", body = ErrorResponse)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, context))]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(message_id): Path<MessageId>,
) -> AppResult<Json<Message>> {
    let actor = context.require_user()?;
    Ok(Json(state.chat().mark_read(actor, message_id).await?))
}
