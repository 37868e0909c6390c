//! Decrypted action payloads.
//!
//! Both layers use compact JSON objects discriminated by a one-letter `a`
//! field. The short field names are part of the wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Plaintext of a server-layer frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "a")]
pub enum ServerAction {
    /// Client -> relay: join the channel identified by its hash.
    #[serde(rename = "j")]
    Join {
        #[serde(rename = "p")]
        channel_hash: String,
    },

    /// Relay -> client: the other members of the channel.
    #[serde(rename = "l")]
    Members {
        #[serde(rename = "p")]
        members: Vec<String>,
    },

    /// Opaque payload for one peer. `peer` is the target when sent by a
    /// client and the source when delivered by the relay.
    #[serde(rename = "c")]
    Direct {
        #[serde(rename = "p")]
        payload: String,
        #[serde(rename = "c")]
        peer: String,
    },

    /// Client -> relay: one opaque payload per target id.
    #[serde(rename = "w")]
    Fanout {
        #[serde(rename = "p")]
        payloads: BTreeMap<String, String>,
    },
}

/// Plaintext of a peer-layer frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "a")]
pub enum PeerMessage {
    /// Display-name announcement, sent once right after key agreement.
    #[serde(rename = "u")]
    Username {
        #[serde(rename = "p")]
        name: String,
    },

    /// Application content with an opaque type tag.
    #[serde(rename = "m")]
    Content {
        #[serde(rename = "t")]
        kind: String,
        #[serde(rename = "d")]
        data: String,
    },
}
