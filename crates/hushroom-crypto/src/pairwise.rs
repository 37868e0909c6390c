//! Pairwise (peer-layer) key agreement.
//!
//! Each member generates one ephemeral X25519 keypair per peer. Public keys
//! travel through the relay as big-endian hex. The agreed secret is bound to
//! the room password by a hex XOR with the password's SHA-256:
//!
//! ```text
//! key = hex_decode(xor_hex(pad_right(hex_be(secret), '8', 64), sha256(password)))
//! ```
//!
//! This is not a KDF. It is kept because every existing client derives the
//! key this way; switching to HKDF needs a protocol version bump.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::codec::{KEY_SIZE, PairwiseKey};
use crate::error::CryptoError;
use crate::hashing::xor_hex;

const KEY_HEX_LEN: usize = KEY_SIZE * 2;

/// Filler for agreed secrets whose hex is shorter than 64 characters.
const SECRET_PAD: char = '8';

/// One side of a pairwise agreement.
pub struct PeerKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for PeerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerKeyPair")
            .field("public", &self.public_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl PeerKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key as 64 hex characters, most significant byte first.
    pub fn public_hex(&self) -> String {
        let mut be = *self.public.as_bytes();
        be.reverse();
        hex::encode(be)
    }
}

fn parse_peer_public(peer_public_hex: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(peer_public_hex.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("peer public key is not hex: {e}")))?;
    let mut le: [u8; KEY_SIZE] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            })?;
    le.reverse();
    Ok(PublicKey::from(le))
}

/// Big-endian hex of the secret with leading zeros dropped, right-padded with
/// `8` to 64 characters.
fn secret_hex(shared_le: &[u8; KEY_SIZE]) -> String {
    let mut be = *shared_le;
    be.reverse();
    let mut full = hex::encode(be);
    be.zeroize();

    let trimmed = full.trim_start_matches('0');
    let mut out = String::with_capacity(KEY_HEX_LEN);
    out.push_str(trimmed);
    while out.len() < KEY_HEX_LEN {
        out.push(SECRET_PAD);
    }
    full.zeroize();
    out
}

/// Derive the key shared with one peer.
///
/// `password_hash_hex` is [`sha256_hex`](crate::hashing::sha256_hex) of the
/// room password. Two members only agree on a key when they used the same
/// password.
pub fn derive_pairwise_key(
    local: &PeerKeyPair,
    peer_public_hex: &str,
    password_hash_hex: &str,
) -> Result<PairwiseKey, CryptoError> {
    if password_hash_hex.len() != KEY_HEX_LEN {
        return Err(CryptoError::KeyDerivationFailed(format!(
            "password hash must be {KEY_HEX_LEN} hex characters"
        )));
    }

    let peer = parse_peer_public(peer_public_hex)?;
    let shared = local.secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey(
            "peer public key gives an all-zero secret".into(),
        ));
    }

    let mut padded = secret_hex(shared.as_bytes());
    let mut combined = xor_hex(&padded, password_hash_hex);
    padded.zeroize();

    let mut bytes = hex::decode(&combined)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    combined.zeroize();
    let key = PairwiseKey::from_slice(&bytes);
    bytes.zeroize();
    key
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::hashing::sha256_hex;

    #[test]
    fn same_password_agrees() {
        let alice = PeerKeyPair::generate();
        let bob = PeerKeyPair::generate();
        let pw = sha256_hex("hunter2");
        let ab = derive_pairwise_key(&alice, &bob.public_hex(), &pw).unwrap();
        let ba = derive_pairwise_key(&bob, &alice.public_hex(), &pw).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn different_password_disagrees() {
        let alice = PeerKeyPair::generate();
        let bob = PeerKeyPair::generate();
        let ab = derive_pairwise_key(&alice, &bob.public_hex(), &sha256_hex("one")).unwrap();
        let ba = derive_pairwise_key(&bob, &alice.public_hex(), &sha256_hex("two")).unwrap();
        assert_ne!(ab, ba);

        let frame = ab
            .encrypt(&serde_json::json!({"a": "u", "p": "alice"}))
            .unwrap();
        assert!(ba.decrypt::<serde_json::Value>(&frame).is_err());
    }

    #[test]
    fn public_hex_is_big_endian() {
        let pair = PeerKeyPair::generate();
        let hex = pair.public_hex();
        assert_eq!(hex.len(), 64);
        let mut le = hex::decode(&hex).unwrap();
        le.reverse();
        assert_eq!(le.as_slice(), pair.public.as_bytes());
    }

    #[test]
    fn short_secret_is_padded_with_eights() {
        // Secret whose big-endian form starts with two zero bytes.
        let mut le = [0x11u8; KEY_SIZE];
        le[KEY_SIZE - 1] = 0;
        le[KEY_SIZE - 2] = 0;
        let hex = secret_hex(&le);
        assert_eq!(hex.len(), 64);
        assert_eq!(&hex[..60], "11".repeat(30));
        assert_eq!(&hex[60..], "8888");
    }

    #[test]
    fn full_length_secret_is_unchanged() {
        let le = [0xabu8; KEY_SIZE];
        assert_eq!(secret_hex(&le), "ab".repeat(32));
    }

    #[test]
    fn rejects_bad_peer_keys() {
        let pair = PeerKeyPair::generate();
        let pw = sha256_hex("pw");
        assert!(matches!(
            derive_pairwise_key(&pair, "abcd", &pw),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
        assert!(matches!(
            derive_pairwise_key(&pair, "not hex at all", &pw),
            Err(CryptoError::InvalidKey(_))
        ));
        // Low-order point: u = 0
        assert!(matches!(
            derive_pairwise_key(&pair, &"00".repeat(32), &pw),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_malformed_password_hash() {
        let alice = PeerKeyPair::generate();
        let bob = PeerKeyPair::generate();
        assert!(matches!(
            derive_pairwise_key(&alice, &bob.public_hex(), "abc"),
            Err(CryptoError::KeyDerivationFailed(_))
        ));
    }
}
