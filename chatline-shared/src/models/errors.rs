use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Client-relevant classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Target message or group no longer exists.
    NotFound,
    /// Actor lacks admin rights or is not a conversation member.
    Forbidden,
    /// A required field was missing or malformed; nothing was mutated.
    Validation,
    Internal,
}

impl ErrorClass {
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            401 | 403 => Self::Forbidden,
            404 | 410 => Self::NotFound,
            _ => Self::Internal,
        }
    }
}

/// Error body returned by the HTTP API (the `application/problem+json`
/// fields clients care about).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_onto_the_taxonomy() {
        assert_eq!(ErrorClass::from_status(404), ErrorClass::NotFound);
        assert_eq!(ErrorClass::from_status(403), ErrorClass::Forbidden);
        assert_eq!(ErrorClass::from_status(400), ErrorClass::Validation);
        assert_eq!(ErrorClass::from_status(502), ErrorClass::Internal);
    }

    #[test]
    fn error_response_ignores_extra_problem_fields() {
        let body = r#"{"type":"https://chatline.dev/problems/not_found","title":"Not Found","status":404,"code":"not_found","message":"Message not found"}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.code, "not_found");
        assert_eq!(parsed.to_string(), "not_found: Message not found");
    }
}
