//! Error types for the checkers client.

use thiserror::Error;

/// Transport (event stream) errors.
///
/// All of them are recovered by reconnecting; none is fatal to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The stream could not be opened
    #[error("Connection error: {0}")]
    Connect(String),

    /// The server answered the subscription with a non-success status
    #[error("Subscription rejected with status {0}")]
    Rejected(u16),

    /// The open stream failed while reading
    #[error("Stream error: {0}")]
    Stream(String),
}

/// HTTP API errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Offline queue persistence errors.
#[derive(Debug, Error)]
pub enum QueueStoreError {
    #[error("Queue file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors surfaced by `GameSync`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No authoritative state has been fetched yet
    #[error("Game {0} has not been synchronized yet")]
    NotSynced(uuid::Uuid),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] QueueStoreError),
}
