//! Handshake frames exchanged before the server-layer key exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::frames::FIELD_SEPARATOR;

/// Tag value of the server key announcement.
pub const SERVER_KEY_TYPE: &str = "server-key";

/// First frame the relay sends after accepting a connection: its long-lived
/// signing public key (base64 SPKI DER). Clients that pin the key ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerKeyAnnouncement {
    #[serde(rename = "type")]
    kind: String,
    pub key: String,
}

impl ServerKeyAnnouncement {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            kind: SERVER_KEY_TYPE.to_string(),
            key: key.into(),
        }
    }

    pub fn to_frame(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a frame as an announcement. Returns `None` for anything else,
    /// including JSON objects with a different `type`.
    pub fn parse(frame: &str) -> Option<Self> {
        if !frame.starts_with('{') {
            return None;
        }
        serde_json::from_str::<Self>(frame)
            .ok()
            .filter(|a| a.kind == SERVER_KEY_TYPE && !a.key.is_empty())
    }
}

/// The relay's signed reply: `hexPublicKey|base64Signature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReply {
    pub public_key_hex: String,
    pub signature_b64: String,
}

impl FromStr for HandshakeReply {
    type Err = ProtoError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        let mut parts = frame.split(FIELD_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(sig), None) if !key.is_empty() && !sig.is_empty() => Ok(Self {
                public_key_hex: key.to_string(),
                signature_b64: sig.to_string(),
            }),
            _ => Err(ProtoError::MalformedHandshake(
                "expected `hexPublicKey|base64Signature`".into(),
            )),
        }
    }
}

impl fmt::Display for HandshakeReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_SEPARATOR}{}",
            self.public_key_hex, self.signature_b64
        )
    }
}
