//! Per-connection state held by the relay.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use hushroom_crypto::ServerKey;
use hushroom_proto::ServerAction;

/// Item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame to write as-is.
    Text(String),
    /// Close the socket. Nothing queued after this is written.
    Close,
}

/// Sender half of a connection's outbound queue.
pub type OutboundTx = mpsc::UnboundedSender<Outbound>;

/// One connected client as seen by the relay.
///
/// The relay only ever knows the server-layer key. Peer-layer payloads pass
/// through as opaque strings.
#[derive(Debug)]
pub struct RelayClient {
    pub id: String,
    tx: OutboundTx,
    pub last_seen: Instant,
    shared_key: Option<ServerKey>,
    pub channel: Option<String>,
}

impl RelayClient {
    pub const fn new(id: String, tx: OutboundTx, now: Instant) -> Self {
        Self {
            id,
            tx,
            last_seen: now,
            shared_key: None,
            channel: None,
        }
    }

    pub const fn shared_key(&self) -> Option<&ServerKey> {
        self.shared_key.as_ref()
    }

    /// Install the server-layer key. Returns `false` if one is already set.
    pub fn set_shared_key(&mut self, key: ServerKey) -> bool {
        if self.shared_key.is_some() {
            return false;
        }
        self.shared_key = Some(key);
        true
    }

    /// Secured and a member of `channel`.
    pub fn is_in_channel(&self, channel: &str) -> bool {
        self.shared_key.is_some() && self.channel.as_deref() == Some(channel)
    }

    /// Queue a raw frame. A closed queue means the connection is going away;
    /// the frame is dropped.
    pub fn send_text(&self, frame: String) {
        if self.tx.send(Outbound::Text(frame)).is_err() {
            debug!(client_id = %self.id, "Outbound queue closed, frame dropped");
        }
    }

    /// Encrypt an action under this client's key and queue it.
    pub fn send_action(&self, action: &ServerAction) {
        let Some(key) = &self.shared_key else {
            debug!(client_id = %self.id, "No server key yet, action dropped");
            return;
        };
        match key.encrypt(action) {
            Ok(frame) => self.send_text(frame),
            Err(e) => warn!(client_id = %self.id, error = %e, "Failed to encrypt action"),
        }
    }

    /// Ask the writer task to close the socket.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}
