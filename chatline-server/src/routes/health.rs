use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    online_users: usize,
    connections: usize,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    metrics::counter!("health_checks_total", "endpoint" => "healthz", "status" => "ok")
        .increment(1);
    let presence = state.hub().presence();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            online_users: presence.online_users().await.len(),
            connections: presence.connection_count().await,
        }),
    )
}

pub fn create_health_router() -> Router<Arc<AppState>> {
    Router::new().route("/healthz", get(healthz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use shared::models::UserId;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_reports_live_connections() {
        let _ = crate::server::metrics_handle();
        let state = Arc::new(AppState::default());
        let (_handle, _queue) = state.hub().open(UserId::new_v4()).await;

        let app = create_health_router().with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["online_users"], 1);
        assert_eq!(json["connections"], 1);
    }
}
