use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use thiserror::Error;

use super::problem::ProblemDetails;
use crate::services::chat_service::ChatServiceError;

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let details = self.details;

        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = details {
            problem = problem.with_details(details);
        }

        problem.into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal_server_error(value.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
            .with_details(json!({ "rejection_status": rejection.status().as_u16() }))
    }
}

impl From<ChatServiceError> for ApiError {
    fn from(err: ChatServiceError) -> Self {
        match err {
            ChatServiceError::Validation(message) => Self::bad_request(message),
            ChatServiceError::NotFound(message) => Self::not_found(message),
            ChatServiceError::Forbidden(message) => Self::forbidden(message),
            ChatServiceError::Store(store_err) => {
                tracing::error!(error = %store_err, "storage failure");
                Self::internal_server_error("storage unavailable")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use http::header::CONTENT_TYPE;
    use serde_json::Value;

    #[test]
    fn new_sets_fields_and_allows_details() {
        let error = ApiError::forbidden("nope").with_details(json!({ "reason": "admin" }));
        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(error.code, "forbidden");
        assert!(
            error
                .details
                .as_ref()
                .is_some_and(|details| details["reason"] == Value::from("admin"))
        );
    }

    #[tokio::test]
    async fn into_response_serializes_problem_details() {
        let response = ApiError::not_found("message gone")
            .with_details(json!({ "resource": "message" }))
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body to bytes");
        let json: Value =
            serde_json::from_slice(&bytes).expect("problem details deserializes to json");
        assert_eq!(json["code"], "not_found");
        assert_eq!(json["message"], "message gone");
        assert_eq!(json["details"]["resource"], "message");
    }

    #[test]
    fn chat_service_errors_map_to_matching_status_codes() {
        let validation = ApiError::from(ChatServiceError::Validation("bad".into()));
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);

        let not_found = ApiError::from(ChatServiceError::NotFound("missing".into()));
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let forbidden = ApiError::from(ChatServiceError::Forbidden("nope".into()));
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

        let store = ApiError::from(ChatServiceError::Store(StoreError::Backend("down".into())));
        assert_eq!(store.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.message, "storage unavailable");
    }
}
