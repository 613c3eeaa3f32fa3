use std::time::Duration;

use thiserror::Error;

/// Failures of a storage backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Incorrect password")]
    WrongPassword,

    #[error("Rejected by storage: {0}")]
    InvalidInput(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Why a join attempt was refused. Shown to the user, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Incorrect password")]
    WrongPassword,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Poll failed; the next tick retries.
    #[error("Fetch failed: {0}")]
    TransientFetch(#[source] BackendError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("Send failed: {0}")]
    Send(#[source] BackendError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Room session is closed")]
    SessionClosed,

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for ClientError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::RoomNotFound => Self::Authorization(AuthorizationError::RoomNotFound),
            BackendError::WrongPassword => Self::Authorization(AuthorizationError::WrongPassword),
            BackendError::InvalidInput(reason) => Self::InvalidInput(reason),
            other => Self::Backend(other),
        }
    }
}

/// A platform side-effect capability (haptics, notifications) is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} not available on this platform")]
pub struct CapabilityUnavailable(pub &'static str);
