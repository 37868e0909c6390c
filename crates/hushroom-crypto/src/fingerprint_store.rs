//! Trust-on-first-use (TOFU) store of relay signing-key fingerprints.
//!
//! Only consulted when a client opts out of pinning the relay key. The
//! first key seen for a relay address is remembered; a later connection
//! announcing a different key is reported as a mismatch.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::hashing::constant_time_str_eq;

/// A remembered relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownRelay {
    /// Relay address as configured by the user (e.g. `wss://chat.example`).
    pub address: String,
    /// Colon-separated SHA-256 of the relay's SPKI DER public key.
    pub fingerprint: String,
    /// Base64 SPKI of the accepted key, so it can be pinned later.
    pub public_key: String,
    /// Unix timestamp of the first connection.
    pub first_seen: i64,
    /// Unix timestamp of the last successful verification.
    pub last_seen: i64,
}

/// Persistent map of relay address to accepted key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FingerprintStore {
    pub relays: HashMap<String, KnownRelay>,
}

/// Result of checking a relay's key against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintCheck {
    /// Never seen this relay before.
    TrustOnFirstUse,
    /// Same key as last time.
    Matched,
    /// Different key than last time. Treat as an attack.
    Mismatch { expected: String, actual: String },
}

impl FingerprintStore {
    /// Load the store from a JSON file. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            CryptoError::SerializationError(format!("Failed to parse known relays: {e}"))
        })
    }

    /// Save the store as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            CryptoError::SerializationError(format!("Failed to serialize known relays: {e}"))
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Compare a relay's fingerprint with the remembered one in constant time.
    pub fn check(&self, address: &str, fingerprint: &str) -> FingerprintCheck {
        match self.relays.get(address) {
            None => FingerprintCheck::TrustOnFirstUse,
            Some(known) if constant_time_str_eq(&known.fingerprint, fingerprint) => {
                FingerprintCheck::Matched
            }
            Some(known) => FingerprintCheck::Mismatch {
                expected: known.fingerprint.clone(),
                actual: fingerprint.to_string(),
            },
        }
    }

    /// Remember a relay key, or refresh `last_seen` for a known one.
    ///
    /// Never overwrites a stored fingerprint; use [`Self::forget`] first to
    /// accept a rotated key.
    pub fn record(&mut self, address: &str, fingerprint: &str, public_key: &str, now: i64) {
        let entry = self
            .relays
            .entry(address.to_string())
            .or_insert_with(|| KnownRelay {
                address: address.to_string(),
                fingerprint: fingerprint.to_string(),
                public_key: public_key.to_string(),
                first_seen: now,
                last_seen: now,
            });
        entry.last_seen = now;
    }

    /// Drop a relay from the store.
    pub fn forget(&mut self, address: &str) -> bool {
        self.relays.remove(address).is_some()
    }
}
