//! Relay session and channel registry.
//!
//! Clients and channels live behind one async mutex so a membership change
//! and the list broadcast it triggers happen as a single step. Sends are
//! pushes onto unbounded per-connection queues and never await while the
//! lock is held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use hushroom_crypto::ServerKey;
use hushroom_proto::ServerAction;

use super::channel::ChannelTable;
use super::connection::{OutboundTx, RelayClient};

/// Random bytes in a client id.
pub const CLIENT_ID_BYTES: usize = 8;

/// Id draws before a connection is rejected.
pub const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No unique client id after {0} attempts")]
    IdCollision(usize),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Server key already set for client {0}")]
    KeyAlreadySet(String),
}

/// Fresh random client id, lower-case hex.
pub fn generate_client_id() -> String {
    let mut bytes = [0u8; CLIENT_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Default)]
struct RegistryState {
    clients: HashMap<String, RelayClient>,
    channels: ChannelTable,
}

impl RegistryState {
    /// Send every secured member the list of the other members.
    fn broadcast_members(&self, channel: &str) {
        let members = self.channels.members(channel);
        for member in members {
            let Some(client) = self.clients.get(member) else {
                continue;
            };
            if !client.is_in_channel(channel) {
                continue;
            }
            let others = members.iter().filter(|m| *m != member).cloned().collect();
            client.send_action(&ServerAction::Members { members: others });
        }
    }

    /// Re-wrap one opaque payload for `target` if it shares the sender's
    /// channel.
    fn forward(&self, from: &str, channel: &str, target: &str, payload: String) -> bool {
        match self.clients.get(target) {
            Some(client) if client.is_in_channel(channel) => {
                client.send_action(&ServerAction::Direct {
                    payload,
                    peer: from.to_string(),
                });
                true
            }
            _ => {
                debug!(from = %from, target = %target, "Target not in sender's channel, dropped");
                false
            }
        }
    }

    fn sender_channel(&self, from: &str) -> Option<String> {
        let channel = self.clients.get(from)?.channel.clone();
        if channel.is_none() {
            debug!(client_id = %from, "Sender has not joined a channel, dropped");
        }
        channel
    }

    fn disconnect(&mut self, id: &str) -> bool {
        let Some(client) = self.clients.remove(id) else {
            return false;
        };
        if let Some(channel) = client.channel.as_deref() {
            self.channels.remove(channel, id);
            if self.channels.contains(channel) {
                self.broadcast_members(channel);
            } else {
                debug!(channel = %channel, "Channel empty, removed");
            }
        }
        info!(client_id = %id, "Client disconnected");
        true
    }

    fn reap_stale(&mut self, now: Instant, seen_timeout: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .clients
            .values()
            .filter(|c| now.saturating_duration_since(c.last_seen) > seen_timeout)
            .map(|c| c.id.clone())
            .collect();

        for id in &stale {
            if let Some(client) = self.clients.get(id) {
                info!(client_id = %id, "Reaping stale client");
                client.close();
            }
            self.disconnect(id);
        }
        stale
    }
}

/// Thread-safe registry of connected clients and their channels.
#[derive(Clone)]
pub struct ConnectionRegistry {
    state: Arc<Mutex<RegistryState>>,
    seen_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(seen_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            seen_timeout,
        }
    }

    pub const fn seen_timeout(&self) -> Duration {
        self.seen_timeout
    }

    /// Register a new connection. Stale clients are reaped first.
    pub async fn accept(&self, tx: OutboundTx, now: Instant) -> Result<String, RegistryError> {
        self.accept_with_ids(tx, now, generate_client_id).await
    }

    pub(crate) async fn accept_with_ids(
        &self,
        tx: OutboundTx,
        now: Instant,
        mut next_id: impl FnMut() -> String,
    ) -> Result<String, RegistryError> {
        let mut state = self.state.lock().await;
        state.reap_stale(now, self.seen_timeout);

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = next_id();
            if state.clients.contains_key(&id) {
                debug!(client_id = %id, "Client id collision, drawing again");
                continue;
            }
            state
                .clients
                .insert(id.clone(), RelayClient::new(id.clone(), tx, now));
            info!(client_id = %id, clients = state.clients.len(), "Client connected");
            return Ok(id);
        }

        warn!(attempts = MAX_ID_ATTEMPTS, "Rejecting connection, no free client id");
        Err(RegistryError::IdCollision(MAX_ID_ATTEMPTS))
    }

    /// Refresh a client's `last_seen`.
    pub async fn touch(&self, id: &str, now: Instant) -> bool {
        let mut state = self.state.lock().await;
        match state.clients.get_mut(id) {
            Some(client) => {
                client.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Install the server-layer key from a completed handshake.
    pub async fn set_shared_key(&self, id: &str, key: ServerKey) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        let client = state
            .clients
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownClient(id.to_string()))?;
        if client.set_shared_key(key) {
            debug!(client_id = %id, "Server key established");
            Ok(())
        } else {
            Err(RegistryError::KeyAlreadySet(id.to_string()))
        }
    }

    pub async fn shared_key(&self, id: &str) -> Option<ServerKey> {
        let state = self.state.lock().await;
        state.clients.get(id)?.shared_key().cloned()
    }

    /// Put a secured client into a channel and broadcast the new list.
    ///
    /// Ignored when the client is unknown, unsecured or already joined.
    pub async fn join(&self, id: &str, channel_hash: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(client) = state.clients.get_mut(id) else {
            return false;
        };
        if client.shared_key().is_none() || client.channel.is_some() || channel_hash.is_empty() {
            debug!(client_id = %id, "Join ignored");
            return false;
        }
        client.channel = Some(channel_hash.to_string());

        state.channels.insert(channel_hash, id);
        info!(
            client_id = %id,
            members = state.channels.members(channel_hash).len(),
            "Client joined channel"
        );
        state.broadcast_members(channel_hash);
        true
    }

    /// Forward an opaque payload to one member of the sender's channel.
    pub async fn relay_direct(&self, from: &str, target: &str, payload: String) -> bool {
        let state = self.state.lock().await;
        let Some(channel) = state.sender_channel(from) else {
            return false;
        };
        state.forward(from, &channel, target, payload)
    }

    /// Forward one opaque payload per target. Returns how many were sent.
    pub async fn relay_fanout(&self, from: &str, payloads: BTreeMap<String, String>) -> usize {
        let state = self.state.lock().await;
        let Some(channel) = state.sender_channel(from) else {
            return 0;
        };
        payloads
            .into_iter()
            .map(|(target, payload)| state.forward(from, &channel, &target, payload))
            .filter(|sent| *sent)
            .count()
    }

    /// Remove a client and update its channel. Safe to call more than once.
    pub async fn disconnect(&self, id: &str) -> bool {
        self.state.lock().await.disconnect(id)
    }

    /// Close and remove every client not seen within the timeout.
    pub async fn reap_stale(&self, now: Instant) -> Vec<String> {
        self.state.lock().await.reap_stale(now, self.seen_timeout)
    }

    pub async fn client_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.state.lock().await.channels.len()
    }

    pub async fn channel_members(&self, channel_hash: &str) -> Vec<String> {
        self.state.lock().await.channels.members(channel_hash).to_vec()
    }
}
