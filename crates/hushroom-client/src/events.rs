//! Events surfaced to the user interface.

use tokio::sync::mpsc;
use tracing::trace;

/// A member whose username announcement was decrypted and accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Relay handshake verified, join sent.
    ServerSecured,
    /// Transport closed. A reconnect follows while credentials are set.
    ServerClosed,
    PeerSecured(Peer),
    /// The secured members after a membership change.
    MembershipUpdated(Vec<Peer>),
    PeerLeft { id: String, name: Option<String> },
    MessageReceived {
        peer: String,
        name: String,
        kind: String,
        data: String,
    },
}

/// Sending half of the event stream. A dropped receiver is not an error.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!(event = ?e.0, "No event receiver, event dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(ClientEvent::ServerClosed);
    }

    #[test]
    fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(ClientEvent::ServerSecured);
        sink.emit(ClientEvent::ServerClosed);
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::ServerSecured);
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::ServerClosed);
    }
}
