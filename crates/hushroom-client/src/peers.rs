//! Peer session table.
//!
//! One entry per remote member of the channel, each with its own X25519
//! keypair and, once agreed, a pairwise key bound to the room password.
//! Methods never touch the transport; they return the actions to send
//! under the server key and the events to surface.

use std::collections::HashMap;

use tracing::{debug, info};

use hushroom_crypto::{PairwiseKey, PeerKeyPair, derive_pairwise_key};
use hushroom_proto::{PeerMessage, ServerAction};

use crate::credentials::Credentials;
use crate::error::ClientError;
use crate::events::{ClientEvent, Peer};

/// Result of feeding one relay action into the table.
#[derive(Debug, Default)]
pub struct PeerUpdate {
    pub outgoing: Vec<ServerAction>,
    pub events: Vec<ClientEvent>,
}

struct PeerSession {
    keys: PeerKeyPair,
    pairwise: Option<PairwiseKey>,
    name: Option<String>,
}

impl PeerSession {
    fn new() -> Self {
        Self {
            keys: PeerKeyPair::generate(),
            pairwise: None,
            name: None,
        }
    }

    /// Key agreed and username accepted.
    fn secured(&self) -> Option<(&PairwiseKey, &str)> {
        Some((self.pairwise.as_ref()?, self.name.as_deref()?))
    }
}

pub struct PeerTable {
    credentials: Credentials,
    peers: HashMap<String, PeerSession>,
}

impl std::fmt::Debug for PeerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTable")
            .field("username", &self.credentials.username)
            .field("peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}

impl PeerTable {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            peers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers whose username has been accepted, sorted by id.
    pub fn secured_peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self
            .peers
            .iter()
            .filter_map(|(id, session)| {
                let (_, name) = session.secured()?;
                Some(Peer {
                    id: id.clone(),
                    name: name.to_string(),
                })
            })
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Apply a membership list from the relay.
    pub fn on_members(&mut self, members: &[String]) -> PeerUpdate {
        let mut update = PeerUpdate::default();

        let gone: Vec<String> = self
            .peers
            .keys()
            .filter(|id| !members.contains(id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(session) = self.peers.remove(&id) {
                info!(peer = %id, "Peer left");
                update.events.push(ClientEvent::PeerLeft {
                    id,
                    name: session.name,
                });
            }
        }

        let mut payloads = std::collections::BTreeMap::new();
        for id in members {
            if !self.peers.contains_key(id) {
                let session = PeerSession::new();
                payloads.insert(id.clone(), session.keys.public_hex());
                self.peers.insert(id.clone(), session);
            }
        }
        if !payloads.is_empty() {
            debug!(count = payloads.len(), "Sending public keys to new peers");
            update.outgoing.push(ServerAction::Fanout { payloads });
        }

        update
            .events
            .push(ClientEvent::MembershipUpdated(self.secured_peers()));
        update
    }

    /// Apply a direct payload relayed from `from`.
    pub fn on_direct(&mut self, from: &str, payload: &str) -> PeerUpdate {
        let has_key = self
            .peers
            .get(from)
            .is_some_and(|session| session.pairwise.is_some());
        if has_key {
            self.on_peer_message(from, payload)
        } else {
            self.on_peer_key(from, payload)
        }
    }

    /// `payload` is the peer's public key.
    fn on_peer_key(&mut self, from: &str, payload: &str) -> PeerUpdate {
        let mut update = PeerUpdate::default();
        let session = self.peers.entry(from.to_string()).or_insert_with(|| {
            let session = PeerSession::new();
            update.outgoing.push(ServerAction::Direct {
                payload: session.keys.public_hex(),
                peer: from.to_string(),
            });
            session
        });

        let key = match derive_pairwise_key(&session.keys, payload, &self.credentials.password_hash) {
            Ok(key) => key,
            Err(e) => {
                debug!(peer = %from, error = %e, "Pairwise key derivation failed");
                return update;
            }
        };

        let announcement = PeerMessage::Username {
            name: self.credentials.username.clone(),
        };
        match key.encrypt(&announcement) {
            Ok(frame) => update.outgoing.push(ServerAction::Direct {
                payload: frame,
                peer: from.to_string(),
            }),
            Err(e) => debug!(peer = %from, error = %e, "Failed to encrypt username"),
        }
        session.pairwise = Some(key);
        debug!(peer = %from, "Pairwise key established");
        update
    }

    fn on_peer_message(&mut self, from: &str, payload: &str) -> PeerUpdate {
        let mut update = PeerUpdate::default();
        let Some(session) = self.peers.get_mut(from) else {
            return update;
        };
        let Some(key) = &session.pairwise else {
            return update;
        };
        let message: PeerMessage = match key.decrypt(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(peer = %from, error = %e, "Undecryptable peer message dropped");
                return update;
            }
        };

        match (message, &session.name) {
            (PeerMessage::Username { name }, None) => {
                let name = name.trim();
                if name.is_empty() {
                    debug!(peer = %from, "Blank username ignored");
                    return update;
                }
                session.name = Some(name.to_string());
                info!(peer = %from, name = %name, "Peer secured");
                update.events.push(ClientEvent::PeerSecured(Peer {
                    id: from.to_string(),
                    name: name.to_string(),
                }));
            }
            (PeerMessage::Content { kind, data }, Some(name)) => {
                update.events.push(ClientEvent::MessageReceived {
                    peer: from.to_string(),
                    name: name.clone(),
                    kind,
                    data,
                });
            }
            (PeerMessage::Username { .. }, Some(_)) => {
                debug!(peer = %from, "Repeated username ignored");
            }
            (PeerMessage::Content { .. }, None) => {
                debug!(peer = %from, "Message from unnamed peer dropped");
            }
        }
        update
    }

    /// Fan-out of one content message to every secured peer. `None` when
    /// no peer is secured yet.
    pub fn channel_message(&self, kind: &str, data: &str) -> Result<Option<ServerAction>, ClientError> {
        let message = PeerMessage::Content {
            kind: kind.to_string(),
            data: data.to_string(),
        };
        let mut payloads = std::collections::BTreeMap::new();
        for (id, session) in &self.peers {
            if let Some((key, _)) = session.secured() {
                payloads.insert(id.clone(), key.encrypt(&message)?);
            }
        }
        if payloads.is_empty() {
            return Ok(None);
        }
        Ok(Some(ServerAction::Fanout { payloads }))
    }

    /// A content message for one secured peer.
    pub fn peer_message(&self, peer: &str, kind: &str, data: &str) -> Result<ServerAction, ClientError> {
        let session = self
            .peers
            .get(peer)
            .ok_or_else(|| ClientError::UnknownPeer(peer.to_string()))?;
        let (key, _) = session
            .secured()
            .ok_or_else(|| ClientError::PeerNotSecured(peer.to_string()))?;
        let payload = key.encrypt(&PeerMessage::Content {
            kind: kind.to_string(),
            data: data.to_string(),
        })?;
        Ok(ServerAction::Direct {
            payload,
            peer: peer.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "peers_tests.rs"]
mod peers_tests;
