//! Relay error types.

use hushroom_crypto::CryptoError;
use hushroom_proto::ProtoError;
use tokio_tungstenite::tungstenite;

use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
