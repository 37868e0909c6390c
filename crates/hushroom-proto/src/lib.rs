//! Hushroom wire protocol
//!
//! Every frame exchanged between a client and the relay is text:
//!
//! - control frames (`ping` / `pong`) that never touch the encrypted path
//! - handshake frames (client public key, signed relay reply)
//! - server-layer ciphertext whose plaintext is a [`ServerAction`]
//!
//! A [`PeerMessage`] is the plaintext of the peer layer, carried opaquely
//! inside `c`/`w` actions.

pub mod action;
pub mod error;
pub mod frames;
pub mod handshake;

pub use action::{PeerMessage, ServerAction};
pub use error::ProtoError;
pub use frames::{InboundFrame, classify};
pub use handshake::{HandshakeReply, ServerKeyAnnouncement};
