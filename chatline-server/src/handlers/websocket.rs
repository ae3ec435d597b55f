//! Push channel: one WebSocket per client tab.
//!
//! The writer drains the connection's hub queue in order and keeps the socket
//! alive with pings; the reader applies `joinGroup` / `leaveGroup` control
//! events. Whichever side ends first tears the connection down.

use std::{sync::Arc, time::Duration};

use axum::{
    Extension, Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use shared::models::{ControlEvent, PushEvent, UserId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    hub::ConnectionHandle,
    middleware::request_context::RequestContext,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(push_socket))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushQuery {
    user_id: Option<UserId>,
}

/// Upgrades to the push channel. The identity comes from `?userId=`, falling
/// back to the identity header.
pub async fn push_socket(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<PushQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user = query
        .user_id
        .or(context.user_id)
        .ok_or_else(|| ApiError::unauthorized("userId is required for the push channel"))?;

    Ok(ws.on_upgrade(move |socket| serve_connection(socket, state, user)))
}

async fn serve_connection(socket: WebSocket, state: Arc<AppState>, user: UserId) {
    let (handle, queue) = state.hub().open(user).await;
    let connection_id = handle.id();
    info!(user_id = %user, connection_id = %connection_id, "push channel opened");

    let (sink, stream) = socket.split();
    let heartbeat = Duration::from_secs(state.config.hub.heartbeat_seconds.max(1));

    tokio::select! {
        () = write_events(sink, queue, heartbeat) => debug!(connection_id = %connection_id, "writer ended"),
        () = read_controls(stream, &state, user, &handle) => debug!(connection_id = %connection_id, "reader ended"),
    }

    state.hub().close(user, connection_id).await;
}

async fn write_events(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut queue: mpsc::Receiver<PushEvent>,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;

    loop {
        let frame = tokio::select! {
            event = queue.recv() => match event {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(json) => WsMessage::Text(json.into()),
                    Err(err) => {
                        error!(error = %err, event = event.name(), "failed to serialize push event");
                        continue;
                    }
                },
                None => break,
            },
            _ = ticker.tick() => WsMessage::Ping(Vec::new().into()),
        };
        if sink.send(frame).await.is_err() {
            break;
        }
    }
}

async fn read_controls(
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    user: UserId,
    handle: &ConnectionHandle,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ControlEvent>(&text) {
                Ok(control) => apply_control(state, user, handle, control).await,
                Err(err) => warn!(user_id = %user, error = %err, "ignoring malformed control event"),
            },
            Ok(WsMessage::Close(_)) => {
                debug!(user_id = %user, "client closed push channel");
                break;
            }
            Err(err) => {
                warn!(user_id = %user, error = %err, "push channel error");
                break;
            }
            Ok(_) => {}
        }
    }
}

async fn apply_control(state: &AppState, user: UserId, handle: &ConnectionHandle, control: ControlEvent) {
    match control {
        ControlEvent::JoinGroup(group) => match state.chat().authorize_join(user, group).await {
            Ok(()) => {
                state.hub().join(user, handle, group).await;
            }
            Err(err) => {
                warn!(user_id = %user, group_id = %group, error = %err, "join refused");
            }
        },
        ControlEvent::LeaveGroup(group) => {
            state.hub().leave(&handle.id(), group).await;
        }
    }
}
