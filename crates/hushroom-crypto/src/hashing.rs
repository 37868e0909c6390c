//! Hashing and hex helpers shared by both protocol sides.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Lower-case hex SHA-256 of a UTF-8 string.
///
/// Used for the channel identity (room name) and the password key material;
/// the relay only ever sees the former.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Nibble-wise XOR of two hex strings.
///
/// The result is as long as the shorter input. Non-hex characters count as
/// zero nibbles.
pub fn xor_hex(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .map(|(x, y)| {
            let n = x.to_digit(16).unwrap_or(0) ^ y.to_digit(16).unwrap_or(0);
            char::from_digit(n, 16).unwrap_or('0')
        })
        .collect()
}

/// Compare two strings without leaking the position of the first mismatch.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Colon-separated hex SHA-256 fingerprint of arbitrary key bytes.
pub fn fingerprint_of(key_bytes: &[u8]) -> String {
    Sha256::digest(key_bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn channel_hash_is_deterministic() {
        assert_eq!(sha256_hex("lobby"), sha256_hex("lobby"));
        assert_eq!(sha256_hex("lobby").len(), 64);
    }

    #[test]
    fn distinct_rooms_hash_differently() {
        assert_ne!(sha256_hex("lobby"), sha256_hex("Lobby"));
        assert_ne!(sha256_hex("lobby"), sha256_hex("lobby "));
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn xor_hex_nibblewise() {
        assert_eq!(xor_hex("ff00", "0f0f"), "f00f");
        assert_eq!(xor_hex("abc", "abc"), "000");
    }

    #[test]
    fn xor_hex_truncates_to_shorter() {
        assert_eq!(xor_hex("ffff", "0f"), "f0");
        assert_eq!(xor_hex("", "abcd"), "");
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_str_eq("aa:bb", "aa:bb"));
        assert!(!constant_time_str_eq("aa:bb", "aa:bc"));
        assert!(!constant_time_str_eq("aa", "aa:bb"));
    }

    #[test]
    fn fingerprint_shape() {
        let fp = fingerprint_of(b"key");
        // 32 hex pairs + 31 colons
        assert_eq!(fp.len(), 95);
        assert!(fp.split(':').all(|s| s.len() == 2));
    }
}
