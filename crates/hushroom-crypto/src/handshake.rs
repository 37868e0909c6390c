//! Client/relay key agreement for the server layer.
//!
//! The client sends an ephemeral P-384 public key (SEC1 uncompressed, hex).
//! The relay answers with its own ephemeral key plus an RSA signature over
//! the raw key bytes, so the client knows it is talking to the relay whose
//! signing key it trusts. Both sides take bytes 8..40 of the 48-byte ECDH
//! secret as the AES-256 key.

use std::ops::Range;

use p384::ecdh::EphemeralSecret;
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::PublicKey;
use rand::rngs::OsRng;

use crate::codec::{ServerKey, decode_b64, encode_b64};
use crate::error::CryptoError;
use crate::signing::{RelaySigningKey, RelayVerifyingKey};

/// Window of the raw ECDH secret used as the server-layer key.
const SHARED_KEY_WINDOW: Range<usize> = 8..40;

fn encode_public(public: &PublicKey) -> Vec<u8> {
    public.to_encoded_point(false).as_bytes().to_vec()
}

fn parse_public_hex(public_hex: &str) -> Result<(Vec<u8>, PublicKey), CryptoError> {
    let bytes = hex::decode(public_hex.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("handshake public key is not hex: {e}")))?;
    let key = PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| CryptoError::InvalidKey("handshake public key is not a P-384 point".into()))?;
    Ok((bytes, key))
}

fn shared_key(secret: &EphemeralSecret, peer: &PublicKey) -> Result<ServerKey, CryptoError> {
    let shared = secret.diffie_hellman(peer);
    let raw = shared.raw_secret_bytes();
    let window = raw
        .get(SHARED_KEY_WINDOW)
        .ok_or_else(|| CryptoError::KeyDerivationFailed("ECDH secret too short".into()))?;
    ServerKey::from_slice(window)
}

/// Client half of the handshake. Consumed by [`Self::complete`].
pub struct ClientKeyAgreement {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl std::fmt::Debug for ClientKeyAgreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKeyAgreement")
            .field("public", &self.public_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Default for ClientKeyAgreement {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientKeyAgreement {
    pub fn new() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// First frame of the handshake.
    pub fn public_hex(&self) -> String {
        hex::encode(encode_public(&self.public))
    }

    /// Verify the relay's reply and derive the server-layer key.
    pub fn complete(
        self,
        relay_public_hex: &str,
        signature_b64: &str,
        relay_key: &RelayVerifyingKey,
    ) -> Result<ServerKey, CryptoError> {
        let (raw_public, relay_public) = parse_public_hex(relay_public_hex)?;
        let signature = decode_b64(signature_b64.trim(), "signature")?;
        relay_key.verify(&raw_public, &signature)?;
        shared_key(&self.secret, &relay_public)
    }
}

/// Relay half of a finished handshake.
pub struct RelayHandshake {
    pub public_key_hex: String,
    pub signature_b64: String,
    pub server_key: ServerKey,
}

impl std::fmt::Debug for RelayHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandshake")
            .field("public_key_hex", &self.public_key_hex)
            .field("server_key", &self.server_key)
            .finish_non_exhaustive()
    }
}

/// Answer a client's public key: fresh ephemeral key, signature, shared key.
pub fn respond_to_client(
    client_public_hex: &str,
    signing_key: &RelaySigningKey,
) -> Result<RelayHandshake, CryptoError> {
    let (_, client_public) = parse_public_hex(client_public_hex)?;

    let secret = EphemeralSecret::random(&mut OsRng);
    let raw_public = encode_public(&secret.public_key());
    let signature = signing_key.sign(&raw_public);
    let server_key = shared_key(&secret, &client_public)?;

    Ok(RelayHandshake {
        public_key_hex: hex::encode(&raw_public),
        signature_b64: encode_b64(&signature),
        server_key,
    })
}
