//! Peer layer: ChaCha20 (IETF, 96-bit nonce) with zero padding.
//!
//! Wire form: `base64(nonce) | base64(counter_seed) | base64(ciphertext)`.
//! The initial block counter is the product of the four seed bytes.

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{PAD_BLOCK, PairwiseKey, decode_b64, encode_b64, parse_padded, serialize_padded};
use crate::error::CryptoError;

/// ChaCha20 nonce size.
pub const PEER_NONCE_SIZE: usize = 12;

/// Number of random bytes whose product is the initial block counter.
pub const COUNTER_SEED_SIZE: usize = 4;

const CHACHA_BLOCK: u64 = 64;

/// Seeds whose counter would run past the 32-bit block space are redrawn.
const MAX_SEED_DRAWS: usize = 8;

fn counter_from_seed(seed: &[u8]) -> u32 {
    seed.iter().fold(1u32, |acc, &b| acc.wrapping_mul(u32::from(b)))
}

fn apply_keystream(
    key: &PairwiseKey,
    nonce: &[u8],
    counter: u32,
    buf: &mut [u8],
) -> Result<(), String> {
    let mut cipher = ChaCha20::new_from_slices(key.as_bytes(), nonce).map_err(|e| e.to_string())?;
    cipher
        .try_seek(u64::from(counter) * CHACHA_BLOCK)
        .map_err(|e| e.to_string())?;
    cipher.try_apply_keystream(buf).map_err(|e| e.to_string())
}

fn fits_block_space(counter: u32, len: usize) -> bool {
    let blocks = u64::try_from(len).unwrap_or(u64::MAX).div_ceil(CHACHA_BLOCK);
    u64::from(counter).saturating_add(blocks) <= u64::from(u32::MAX) + 1
}

impl PairwiseKey {
    /// Encrypt a payload for the peer sharing this key.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<String, CryptoError> {
        let mut buf = serialize_padded(payload)?;
        debug_assert_eq!(buf.len() % PAD_BLOCK, 0);

        let mut nonce = [0u8; PEER_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut seed = [0u8; COUNTER_SEED_SIZE];
        let mut draws = 0;
        loop {
            OsRng.fill_bytes(&mut seed);
            draws += 1;
            if fits_block_space(counter_from_seed(&seed), buf.len()) {
                break;
            }
            if draws >= MAX_SEED_DRAWS {
                return Err(CryptoError::EncryptionFailed(
                    "no usable counter seed".into(),
                ));
            }
        }

        apply_keystream(self, &nonce, counter_from_seed(&seed), &mut buf)
            .map_err(CryptoError::EncryptionFailed)?;

        Ok(format!(
            "{}|{}|{}",
            encode_b64(&nonce),
            encode_b64(&seed),
            encode_b64(&buf)
        ))
    }

    /// Decrypt and parse a peer-layer frame.
    pub fn decrypt<T: DeserializeOwned>(&self, frame: &str) -> Result<T, CryptoError> {
        let mut parts = frame.split('|');
        let (Some(nonce_b64), Some(seed_b64), Some(ct_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::MalformedFrame(
                "expected nonce|counter|ciphertext".into(),
            ));
        };

        let nonce = decode_b64(nonce_b64, "nonce")?;
        if nonce.len() != PEER_NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: PEER_NONCE_SIZE,
                actual: nonce.len(),
            });
        }
        let seed = decode_b64(seed_b64, "counter")?;
        if seed.len() != COUNTER_SEED_SIZE {
            return Err(CryptoError::MalformedFrame(format!(
                "counter seed must be {COUNTER_SEED_SIZE} bytes, got {}",
                seed.len()
            )));
        }

        let mut buf = decode_b64(ct_b64, "ciphertext")?;
        apply_keystream(self, &nonce, counter_from_seed(&seed), &mut buf)
            .map_err(CryptoError::DecryptionFailed)?;

        parse_padded(&buf)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(byte: u8) -> PairwiseKey {
        PairwiseKey::from_bytes([byte; 32])
    }

    #[test]
    fn counter_is_product_of_seed_bytes() {
        assert_eq!(counter_from_seed(&[1, 2, 3, 4]), 24);
        assert_eq!(counter_from_seed(&[0, 200, 200, 200]), 0);
        assert_eq!(counter_from_seed(&[255, 255, 255, 255]), 4_228_250_625);
    }

    #[test]
    fn roundtrip_content_message() {
        let k = key(9);
        let msg = json!({"a": "m", "t": "text", "d": "hi"});
        let frame = k.encrypt(&msg).unwrap();
        assert_eq!(frame.split('|').count(), 3);
        assert_eq!(k.decrypt::<serde_json::Value>(&frame).unwrap(), msg);
    }

    #[test]
    fn roundtrip_payload_spanning_many_blocks() {
        let k = key(10);
        let data = "x".repeat(10_000);
        let frame = k.encrypt(&json!({"a": "m", "t": "file", "d": data})).unwrap();
        let back: serde_json::Value = k.decrypt(&frame).unwrap();
        assert_eq!(back["d"].as_str().map(str::len), Some(10_000));
    }

    #[test]
    fn explicit_high_counter_decrypts() {
        // Build a frame by hand with the largest possible seed.
        let k = key(11);
        let mut buf = serialize_padded(&"edge").unwrap();
        let nonce = [3u8; PEER_NONCE_SIZE];
        let seed = [255u8; COUNTER_SEED_SIZE];
        apply_keystream(&k, &nonce, counter_from_seed(&seed), &mut buf).unwrap();
        let frame = format!("{}|{}|{}", encode_b64(&nonce), encode_b64(&seed), encode_b64(&buf));
        assert_eq!(k.decrypt::<String>(&frame).unwrap(), "edge");
    }

    #[test]
    fn other_key_does_not_yield_payload() {
        let frame = key(12).encrypt(&json!({"a": "u", "p": "alice"})).unwrap();
        assert!(key(13).decrypt::<serde_json::Value>(&frame).is_err());
    }

    #[test]
    fn malformed_frames_are_errors() {
        let k = key(14);
        assert!(matches!(
            k.decrypt::<String>("only|two"),
            Err(CryptoError::MalformedFrame(_))
        ));
        assert!(matches!(
            k.decrypt::<String>("a|b|c|d"),
            Err(CryptoError::MalformedFrame(_))
        ));
        assert!(matches!(
            k.decrypt::<String>("AAAA|AAAAAA==|AAAA"),
            Err(CryptoError::InvalidNonceLength { .. })
        ));
        assert!(matches!(
            k.decrypt::<String>("AAAAAAAAAAAAAAAA|AAAA|AAAA"),
            Err(CryptoError::MalformedFrame(_))
        ));
    }
}
