//! Named constants and classification for raw text frames.
//!
//! Shared between the relay and the client so that control strings and size
//! limits stay in sync without duplicating literals.

// ---------------------------------------------------------------------------
// Control frames
// ---------------------------------------------------------------------------

/// Heartbeat request sent by the client.
pub const PING: &str = "ping";

/// Heartbeat reply sent by the relay.
pub const PONG: &str = "pong";

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// A frame shorter than this, received before the server-layer key exists,
/// is the client's hex public key.
pub const MAX_HANDSHAKE_FRAME_LEN: usize = 2048;

/// Largest encrypted server-layer frame (8 MiB).
pub const MAX_ENCRYPTED_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Separator between the base64/hex fields of every multi-part frame.
pub const FIELD_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A text frame as seen by the relay, before any decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame<'a> {
    /// `ping`; answered with `pong`.
    Ping,
    /// `pong`; ignored.
    Pong,
    /// Client public key, only meaningful before the handshake completed.
    Handshake(&'a str),
    /// Server-layer ciphertext, only meaningful after the handshake.
    Encrypted(&'a str),
    /// Anything that fits neither phase (e.g. oversize). Dropped.
    Oversize,
}

/// Classify a frame received by the relay.
///
/// `secured` tells whether the connection already holds a server-layer key;
/// the same text means different things before and after the handshake.
pub fn classify(frame: &str, secured: bool, max_encrypted_len: usize) -> InboundFrame<'_> {
    match frame {
        PING => InboundFrame::Ping,
        PONG => InboundFrame::Pong,
        _ if !secured && frame.len() < MAX_HANDSHAKE_FRAME_LEN => InboundFrame::Handshake(frame),
        _ if secured && frame.len() <= max_encrypted_len => InboundFrame::Encrypted(frame),
        _ => InboundFrame::Oversize,
    }
}
