//! Crypto error types.

/// Errors from cryptographic operations.
///
/// Decryption-side variants are expected during normal operation (a peer
/// with a different room password, a truncated frame); callers log them at
/// debug level and drop the message.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Relay signature verification failed")]
    SignatureInvalid,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
