//! Message codec for both encryption layers.
//!
//! Payloads are serialized as compact JSON, zero-padded to a 16-byte
//! boundary and encrypted. On the way back trailing NUL bytes are stripped
//! before parsing. The wire bytes depend only on the definitions here, not
//! on which crate implements the cipher.

mod peer;
mod server;

use serde::Serialize;
use serde::de::DeserializeOwned;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub use peer::{COUNTER_SEED_SIZE, PEER_NONCE_SIZE};
pub use server::IV_SIZE;

/// Symmetric key size for both layers.
pub const KEY_SIZE: usize = 32;

/// Padding boundary for both layers.
const PAD_BLOCK: usize = 16;

/// Server-layer key shared by one client and the relay.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ServerKey([u8; KEY_SIZE]);

/// Peer-layer key shared by two channel members. The relay never holds one.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PairwiseKey([u8; KEY_SIZE]);

macro_rules! key_common {
    ($ty:ident) => {
        impl $ty {
            pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; KEY_SIZE] =
                    bytes
                        .try_into()
                        .map_err(|_| CryptoError::InvalidKeyLength {
                            expected: KEY_SIZE,
                            actual: bytes.len(),
                        })?;
                Ok(Self(arr))
            }

            pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($ty), "([REDACTED])"))
            }
        }
    };
}

key_common!(ServerKey);
key_common!(PairwiseKey);

/// Serialize to compact JSON and append zero bytes up to the next multiple
/// of 16. Aligned input gets no extra block.
fn serialize_padded<T: Serialize>(payload: &T) -> Result<Vec<u8>, CryptoError> {
    let mut buf =
        serde_json::to_vec(payload).map_err(|e| CryptoError::SerializationError(e.to_string()))?;
    let rem = buf.len() % PAD_BLOCK;
    if rem != 0 {
        buf.resize(buf.len() + PAD_BLOCK - rem, 0);
    }
    Ok(buf)
}

/// Strip trailing NUL bytes and parse the JSON payload.
fn parse_padded<T: DeserializeOwned>(plaintext: &[u8]) -> Result<T, CryptoError> {
    let end = plaintext
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    serde_json::from_slice(&plaintext[..end])
        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid payload: {e}")))
}

pub(crate) fn decode_b64(field: &str, what: &str) -> Result<Vec<u8>, CryptoError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(field)
        .map_err(|e| CryptoError::MalformedFrame(format!("{what}: {e}")))
}

pub(crate) fn encode_b64(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
