//! Hushroom Client Library
//!
//! Client side of the Hushroom protocol:
//! - Signed P-384 handshake with the relay, pinned or trust-on-first-use
//! - Per-peer X25519 sessions bound to the room password
//! - Reconnecting connection lifecycle with keepalive pings
//! - A typed event stream for the user interface

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod handshake;
pub mod heartbeat;
pub mod peers;

pub use client::ChatClient;
pub use config::{ClientOptions, ReconnectPolicy};
pub use credentials::Credentials;
pub use error::ClientError;
pub use events::{ClientEvent, Peer};
pub use handshake::{HandshakeState, RelayTrust};
