use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use shared::config::server::Config;
use shared::models::UserId;
use uuid::Uuid;

use crate::http::error::{ApiError, AppResult};

/// Per-request data attached by [`assign_request_context`].
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub request_id: String,
    /// Caller identity asserted by the upstream authentication layer.
    pub user_id: Option<UserId>,
}

impl RequestContext {
    /// # Errors
    /// Returns 401 when the request carried no identity.
    pub fn require_user(&self) -> AppResult<UserId> {
        self.user_id
            .ok_or_else(|| ApiError::unauthorized("caller identity is required"))
    }
}

#[derive(Clone, Debug)]
pub struct RequestContextState {
    request_id_header: HeaderName,
    identity_header: HeaderName,
}

impl RequestContextState {
    pub fn from_config(config: &Config) -> Self {
        let request_id_header = HeaderName::from_str(&config.server.request_id_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        let identity_header = HeaderName::from_str(&config.server.identity_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-user-id"));
        Self {
            request_id_header,
            identity_header,
        }
    }
}

pub async fn assign_request_context(
    State(state): State<RequestContextState>,
    mut request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let header_name = state.request_id_header.clone();
    let request_id = header_text(request.headers(), &header_name)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let user_id = match header_text(request.headers(), &state.identity_header) {
        Some(raw) => Some(
            raw.parse::<UserId>()
                .map_err(|_| ApiError::unauthorized("identity header is not a valid user id"))?,
        ),
        None => None,
    };

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
        user_id,
    });

    request.headers_mut().insert(
        header_name.clone(),
        HeaderValue::from_str(&request_id)
            .map_err(|_| ApiError::internal_server_error("failed to encode request id"))?,
    );

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header_name,
        HeaderValue::from_str(&request_id)
            .map_err(|_| ApiError::internal_server_error("failed to encode request id"))?,
    );

    Ok(response)
}

fn header_text(headers: &HeaderMap, header: &HeaderName) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Extension, Router, middleware::from_fn_with_state, routing::get};
    use axum_test::TestServer;

    async fn whoami(Extension(ctx): Extension<RequestContext>) -> AppResult<String> {
        Ok(ctx.require_user()?.to_string())
    }

    fn server() -> TestServer {
        let state = RequestContextState::from_config(&Config::default());
        let app = Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn_with_state(state, assign_request_context));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn identity_header_becomes_request_user() {
        let server = server();
        let user = UserId::new_v4();

        let response = server
            .get("/whoami")
            .add_header("x-user-id", user.to_string())
            .await;

        response.assert_status_ok();
        response.assert_text(user.to_string());
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_unauthorized() {
        let server = server();

        server
            .get("/whoami")
            .await
            .assert_status(axum::http::StatusCode::UNAUTHORIZED);
        server
            .get("/whoami")
            .add_header("x-user-id", "not-a-uuid")
            .await
            .assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn incoming_request_id_is_echoed() {
        let response = server()
            .get("/whoami")
            .add_header("x-request-id", "req-42")
            .add_header("x-user-id", UserId::new_v4().to_string())
            .await;

        assert_eq!(response.header("x-request-id"), "req-42");
    }
}
