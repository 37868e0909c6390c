//! `Hushroom` crypto library
//!
//! Two independent symmetric layers protect every chat message:
//!
//! - **Server layer**: client <-> relay. Key from an ephemeral P-384 ECDH
//!   whose relay half is signed with the relay's long-lived RSA-2048 key.
//!   AES-256-CBC with zero padding.
//! - **Peer layer**: member <-> member, opaque to the relay. Key from an
//!   ephemeral X25519 ECDH combined with the SHA-256 of the room password.
//!   ChaCha20 with a random nonce and counter seed.
//!
//! The two key types are distinct ([`ServerKey`], [`PairwiseKey`]) so a
//! payload can never be encrypted under the wrong layer by accident.

pub mod codec;
pub mod error;
pub mod fingerprint_store;
pub mod handshake;
pub mod hashing;
pub mod pairwise;
pub mod signing;

pub use codec::{PairwiseKey, ServerKey};
pub use error::CryptoError;
pub use fingerprint_store::{FingerprintCheck, FingerprintStore, KnownRelay};
pub use handshake::{ClientKeyAgreement, RelayHandshake, respond_to_client};
pub use hashing::{constant_time_str_eq, fingerprint_of, sha256_hex, xor_hex};
pub use pairwise::{PeerKeyPair, derive_pairwise_key};
pub use signing::{RelaySigningKey, RelayVerifyingKey};
#[cfg(any(test, feature = "test-utils"))]
pub use signing::test_signing_key;
