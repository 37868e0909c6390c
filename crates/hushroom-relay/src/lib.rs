//! Hushroom Relay Server Library
//!
//! Core functionality for the Hushroom relay:
//! - WebSocket listener and per-connection tasks
//! - Signed P-384 handshake establishing the server-layer key
//! - Connection registry with channel membership and stale-client reaping
//! - Routing of opaque peer payloads between members of a channel
//!
//! The relay never holds a peer-layer key. What it forwards inside `c` and
//! `w` actions is ciphertext it cannot read.

pub mod error;
pub mod registry;
pub mod router;
pub mod server;

pub use error::RelayError;
