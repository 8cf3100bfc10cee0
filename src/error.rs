use thiserror::Error;

/// Errors raised while starting or finishing an upload session
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    /// The dropped or selected file is not an image
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Another upload is still transferring
    #[error("An upload is already in progress")]
    ConcurrentStartRejected,

    /// The previous session reached a terminal state but was not reset
    #[error("Previous upload has not been reset")]
    NotIdle,

    /// The transport reported an error
    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] TransportError),
}

/// Errors reported by an upload transport
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The transfer was aborted through its cancel handle
    #[error("Transfer aborted")]
    Aborted,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

/// Errors from the durable key-value storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
