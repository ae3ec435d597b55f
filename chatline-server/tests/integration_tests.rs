//! End-to-end tests: REST calls through the full router and push delivery
//! over real WebSocket connections.

use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use axum_test::TestServer;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use server::{app_state::AppState, server::create_app_router, server::metrics_handle};
use shared::config::server::{Config, Profile};
use shared::models::{ControlEvent, Group, GroupId, GroupUpdate, Message, PushEvent, UserId};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    state: Arc<AppState>,
    http: TestServer,
    ws_base: String,
}

impl Harness {
    async fn start() -> Self {
        let config = Arc::new(Config::default_for_profile(Profile::Test));
        let state = Arc::new(AppState::in_memory(config));
        let app = create_app_router(Arc::clone(&state), metrics_handle());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let live = app.clone();
        tokio::spawn(async move {
            axum::serve(listener, live).await.unwrap();
        });

        Self {
            state,
            http: TestServer::new(app).expect("test server"),
            ws_base: format!("ws://{addr}/ws"),
        }
    }

    /// Opens a push channel and waits until the hub has registered it.
    async fn connect(&self, user: UserId) -> Socket {
        let (mut socket, _) = connect_async(format!("{}?userId={user}", self.ws_base))
            .await
            .unwrap();
        match next_event(&mut socket).await {
            Some(PushEvent::GetOnlineUsers(online)) => assert!(online.contains(&user)),
            other => panic!("expected online set first, got {other:?}"),
        }
        socket
    }

    async fn join(&self, socket: &mut Socket, user: UserId, group: GroupId) {
        let frame = serde_json::to_string(&ControlEvent::JoinGroup(group)).unwrap();
        socket
            .send(tungstenite::Message::Text(frame.into()))
            .await
            .unwrap();
        let connection = self.state.hub().presence().lookup(user).await.unwrap();
        for _ in 0..100 {
            if self.state.hub().rooms().rooms_of(&connection.id()).await.contains(&group) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("join for {group} was not applied");
    }

    async fn create_group(&self, admin: UserId, members: &[UserId]) -> Group {
        let response = self
            .http
            .post("/api/groups")
            .add_header("x-user-id", admin.to_string())
            .json(&json!({ "name": "launch", "member_ids": members }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Group>()
    }
}

/// Next push event of any kind, or `None` after a quiet period.
async fn next_event(socket: &mut Socket) -> Option<PushEvent> {
    next_matching(socket, |_| true).await
}

/// Like [`next_event`] but skips online-set refreshes.
async fn next_chat_event(socket: &mut Socket) -> Option<PushEvent> {
    next_matching(socket, |event| !matches!(event, PushEvent::GetOnlineUsers(_))).await
}

async fn next_matching(socket: &mut Socket, keep: impl Fn(&PushEvent) -> bool) -> Option<PushEvent> {
    loop {
        let frame = tokio::time::timeout(Duration::from_millis(500), socket.next())
            .await
            .ok()??
            .ok()?;
        if let tungstenite::Message::Text(text) = frame {
            let event: PushEvent = serde_json::from_str(text.as_str()).unwrap();
            if keep(&event) {
                return Some(event);
            }
        }
    }
}

#[tokio::test]
async fn direct_message_reaches_receiver_once_and_never_echoes() {
    let harness = Harness::start().await;
    let (alice, bob) = (UserId::new_v4(), UserId::new_v4());
    let mut alice_ws = harness.connect(alice).await;
    let mut bob_ws = harness.connect(bob).await;

    let response = harness
        .http
        .post(&format!("/api/messages/send/{bob}"))
        .add_header("x-user-id", alice.to_string())
        .json(&json!({ "text": "hi" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let sent = response.json::<Message>();

    assert_eq!(
        next_chat_event(&mut bob_ws).await,
        Some(PushEvent::NewMessage(sent.clone()))
    );
    assert_eq!(next_chat_event(&mut bob_ws).await, None);
    assert_eq!(next_chat_event(&mut alice_ws).await, None);

    let history = harness
        .http
        .get(&format!("/api/messages/{alice}"))
        .add_header("x-user-id", bob.to_string())
        .await
        .json::<Vec<Message>>();
    assert_eq!(history.iter().filter(|m| m.id == sent.id).count(), 1);
}

#[tokio::test]
async fn offline_receiver_sees_message_after_connecting() {
    let harness = Harness::start().await;
    let (alice, bob) = (UserId::new_v4(), UserId::new_v4());
    let _alice_ws = harness.connect(alice).await;

    let response = harness
        .http
        .post(&format!("/api/messages/send/{bob}"))
        .add_header("x-user-id", alice.to_string())
        .json(&json!({ "text": "hi" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let _bob_ws = harness.connect(bob).await;
    let history = harness
        .http
        .get(&format!("/api/messages/{alice}"))
        .add_header("x-user-id", bob.to_string())
        .await
        .json::<Vec<Message>>();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text.as_deref(), Some("hi"));
}

#[tokio::test]
async fn group_reaction_reaches_each_room_member_exactly_once() {
    let harness = Harness::start().await;
    let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
    let mut a_ws = harness.connect(a).await;
    let mut b_ws = harness.connect(b).await;
    let mut c_ws = harness.connect(c).await;

    let group = harness.create_group(a, &[b, c]).await;
    for socket in [&mut a_ws, &mut b_ws, &mut c_ws] {
        assert!(matches!(
            next_chat_event(socket).await,
            Some(PushEvent::GroupUpdate(GroupUpdate::Snapshot(_)))
        ));
    }
    harness.join(&mut a_ws, a, group.id).await;
    harness.join(&mut b_ws, b, group.id).await;
    harness.join(&mut c_ws, c, group.id).await;

    let message = harness
        .http
        .post(&format!("/api/groups/{}/messages", group.id))
        .add_header("x-user-id", b.to_string())
        .json(&json!({ "text": "ready?" }))
        .await
        .json::<Message>();
    for socket in [&mut a_ws, &mut b_ws, &mut c_ws] {
        assert_eq!(
            next_chat_event(socket).await,
            Some(PushEvent::NewGroupMessage(message.clone()))
        );
    }

    let response = harness
        .http
        .post(&format!("/api/messages/{}/reactions", message.id))
        .add_header("x-user-id", a.to_string())
        .json(&json!({ "emoji": "👍" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    for socket in [&mut b_ws, &mut c_ws] {
        let Some(PushEvent::ReactionUpdate(update)) = next_chat_event(socket).await else {
            panic!("expected a reaction update");
        };
        assert_eq!(update.reactions.len(), 1);
        assert_eq!(update.reactions.get(&a).map(String::as_str), Some("👍"));
        assert_eq!(next_chat_event(socket).await, None);
    }
}

#[tokio::test]
async fn non_member_join_is_ignored() {
    let harness = Harness::start().await;
    let (admin, member, outsider) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
    let group = harness.create_group(admin, &[member]).await;
    let mut outsider_ws = harness.connect(outsider).await;

    let frame = serde_json::to_string(&ControlEvent::JoinGroup(group.id)).unwrap();
    outsider_ws
        .send(tungstenite::Message::Text(frame.into()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(harness.state.hub().rooms().members_of(group.id).await.is_empty());
}

#[tokio::test]
async fn closing_the_socket_clears_presence_and_rooms() {
    let harness = Harness::start().await;
    let (admin, member) = (UserId::new_v4(), UserId::new_v4());
    let group = harness.create_group(admin, &[member]).await;
    let mut member_ws = harness.connect(member).await;
    harness.join(&mut member_ws, member, group.id).await;

    member_ws.close(None).await.unwrap();
    for _ in 0..100 {
        if harness.state.hub().presence().lookup(member).await.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(harness.state.hub().presence().lookup(member).await.is_none());
    assert!(harness.state.hub().rooms().members_of(group.id).await.is_empty());
}

#[tokio::test]
async fn push_channel_requires_identity() {
    let harness = Harness::start().await;
    let result = connect_async(harness.ws_base.clone()).await;
    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED.as_u16());
        }
        other => panic!("expected HTTP 401 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn error_classes_render_as_problem_details() {
    let harness = Harness::start().await;
    let (admin, member) = (UserId::new_v4(), UserId::new_v4());

    let missing_identity = harness.http.get("/api/groups").await;
    assert_eq!(missing_identity.status_code(), StatusCode::UNAUTHORIZED);

    let invalid = harness
        .http
        .post("/api/groups")
        .add_header("x-user-id", admin.to_string())
        .json(&json!({ "name": "", "member_ids": [member] }))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(invalid.header("content-type"), "application/problem+json");
    assert_eq!(invalid.json::<serde_json::Value>()["code"], "validation_failed");

    let group = harness.create_group(admin, &[member]).await;
    let forbidden = harness
        .http
        .delete(&format!("/api/groups/{}", group.id))
        .add_header("x-user-id", member.to_string())
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

    let missing = harness
        .http
        .post(&format!("/api/messages/{}/read", shared::models::MessageId::new_v4()))
        .add_header("x-user-id", member.to_string())
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    let deleted = harness
        .http
        .delete(&format!("/api/groups/{}", group.id))
        .add_header("x-user-id", admin.to_string())
        .await;
    assert_eq!(deleted.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn removed_member_is_notified_and_evicted() {
    let harness = Harness::start().await;
    let (admin, member) = (UserId::new_v4(), UserId::new_v4());
    let mut member_ws = harness.connect(member).await;
    let group = harness.create_group(admin, &[member]).await;
    assert!(matches!(
        next_chat_event(&mut member_ws).await,
        Some(PushEvent::GroupUpdate(GroupUpdate::Snapshot(_)))
    ));
    harness.join(&mut member_ws, member, group.id).await;

    let response = harness
        .http
        .delete(&format!("/api/groups/{}/members/{member}", group.id))
        .add_header("x-user-id", admin.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(!response.json::<Group>().is_member(member));

    assert_eq!(
        next_chat_event(&mut member_ws).await,
        Some(PushEvent::GroupUpdate(GroupUpdate::removed(group.id)))
    );
    assert!(harness.state.hub().rooms().members_of(group.id).await.is_empty());
}

#[tokio::test]
async fn removed_member_hears_nothing_on_an_older_tab() {
    let harness = Harness::start().await;
    let (admin, member) = (UserId::new_v4(), UserId::new_v4());
    let group = harness.create_group(admin, &[member]).await;

    let mut old_tab = harness.connect(member).await;
    harness.join(&mut old_tab, member, group.id).await;
    let mut new_tab = harness.connect(member).await;
    harness.join(&mut new_tab, member, group.id).await;
    assert_eq!(harness.state.hub().rooms().members_of(group.id).await.len(), 2);

    let response = harness
        .http
        .delete(&format!("/api/groups/{}/members/{member}", group.id))
        .add_header("x-user-id", admin.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        next_chat_event(&mut new_tab).await,
        Some(PushEvent::GroupUpdate(GroupUpdate::removed(group.id)))
    );

    let posted = harness
        .http
        .post(&format!("/api/groups/{}/messages", group.id))
        .add_header("x-user-id", admin.to_string())
        .json(&json!({ "text": "secret" }))
        .await;
    assert_eq!(posted.status_code(), StatusCode::CREATED);

    assert_eq!(next_chat_event(&mut old_tab).await, None);
    assert_eq!(next_chat_event(&mut new_tab).await, None);
    assert!(harness.state.hub().rooms().members_of(group.id).await.is_empty());
}
