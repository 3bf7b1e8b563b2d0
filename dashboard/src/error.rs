use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("http {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("client storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid device command: {0:?}")]
    InvalidCommand(String),

    #[error("invalid api url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Whether repeating the same idempotent request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(e) => !e.is_decode() && !e.is_builder(),
            ApiError::Http { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Message suitable for showing to an operator.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Http { message, .. } => Some(message.as_str()),
            ApiError::Auth(message) => Some(message.as_str()),
            _ => None,
        }
    }
}
