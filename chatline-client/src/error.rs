use shared::models::{ErrorClass, ErrorResponse};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures surfaced by the HTTP API client and the push channel.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The target message or group no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other non-success response.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push channel error: {0}")]
    Push(Box<tungstenite::Error>),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The push channel writer has shut down.
    #[error("push channel is closed")]
    Closed,

    /// An operation that needs an active conversation was called without one.
    #[error("no conversation selected")]
    NoConversation,
}

/// Convenience alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Builds the error for a non-success response from its status and
    /// problem body.
    #[must_use]
    pub fn from_problem(status: u16, problem: ErrorResponse) -> Self {
        match ErrorClass::from_status(status) {
            ErrorClass::NotFound => Self::NotFound(problem.message),
            ErrorClass::Forbidden => Self::Forbidden(problem.message),
            ErrorClass::Validation => Self::Validation(problem.message),
            ErrorClass::Internal => Self::Status {
                status,
                message: problem.message,
            },
        }
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Forbidden(_) => ErrorClass::Forbidden,
            Self::Validation(_) => ErrorClass::Validation,
            Self::Status { .. }
            | Self::Transport(_)
            | Self::Push(_)
            | Self::Url(_)
            | Self::Decode(_)
            | Self::Closed => ErrorClass::Internal,
            Self::NoConversation => ErrorClass::Validation,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Push(Box::new(err))
    }
}
