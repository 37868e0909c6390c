//! Protocol error types.

/// Errors from parsing wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("Malformed handshake frame: {0}")]
    MalformedHandshake(String),

    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
