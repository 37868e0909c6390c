//! Client error types.

use hushroom_crypto::CryptoError;
use hushroom_proto::ProtoError;
use tokio_tungstenite::tungstenite;

/// Errors that can occur in the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credentials not set")]
    NoCredentials,

    #[error("Not connected to a relay")]
    NotConnected,

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Peer not secured: {0}")]
    PeerNotSecured(String),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),
}
