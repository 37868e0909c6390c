//! Client side of the relay handshake.
//!
//! `Disconnected -> KeyExchanging -> ServerSecured -> Joined`. The relay's
//! ephemeral P-384 key is only accepted when signed by a trusted relay
//! signing key; how that key becomes trusted is [`RelayTrust`].

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use hushroom_crypto::{
    ClientKeyAgreement, FingerprintCheck, FingerprintStore, RelayVerifyingKey, ServerKey,
};
use hushroom_proto::{HandshakeReply, ServerAction, ServerKeyAnnouncement};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    /// Our public key is sent, waiting for the signed reply.
    KeyExchanging,
    /// Server key derived, join sent.
    ServerSecured,
    /// The relay answered under the server key.
    Joined,
}

/// How the relay's long-lived signing key is trusted.
#[derive(Debug, Clone)]
pub enum RelayTrust {
    /// Key configured out of band. Announcements never replace it.
    Pinned(RelayVerifyingKey),
    /// Learn the key from the relay's announcement and remember its
    /// fingerprint per relay address. A changed key aborts the handshake.
    TrustOnFirstUse { store_path: PathBuf },
}

#[derive(Debug)]
pub struct HandshakeManager {
    state: HandshakeState,
    trust: RelayTrust,
    relay_address: String,
    relay_key: Option<RelayVerifyingKey>,
    agreement: Option<ClientKeyAgreement>,
    server_key: Option<ServerKey>,
}

impl HandshakeManager {
    pub fn new(trust: RelayTrust, relay_address: impl Into<String>) -> Self {
        let relay_key = match &trust {
            RelayTrust::Pinned(key) => Some(key.clone()),
            RelayTrust::TrustOnFirstUse { .. } => None,
        };
        Self {
            state: HandshakeState::Disconnected,
            trust,
            relay_address: relay_address.into(),
            relay_key,
            agreement: None,
            server_key: None,
        }
    }

    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    pub const fn server_key(&self) -> Option<&ServerKey> {
        self.server_key.as_ref()
    }

    /// Start a fresh key exchange. Returns the first frame to send.
    pub fn begin(&mut self) -> String {
        let agreement = ClientKeyAgreement::new();
        let frame = agreement.public_hex();
        self.agreement = Some(agreement);
        self.server_key = None;
        self.state = HandshakeState::KeyExchanging;
        frame
    }

    /// Handle the relay's `server-key` announcement.
    pub fn handle_announcement(
        &mut self,
        announcement: &ServerKeyAnnouncement,
    ) -> Result<(), ClientError> {
        match &self.trust {
            RelayTrust::Pinned(pinned) => {
                match RelayVerifyingKey::from_spki_base64(&announcement.key) {
                    Ok(key) if key == *pinned => debug!("Announced relay key matches pin"),
                    _ => warn!(
                        relay = %self.relay_address,
                        "Relay announced a key different from the pinned one, ignoring"
                    ),
                }
                Ok(())
            }
            RelayTrust::TrustOnFirstUse { store_path } => {
                let key = RelayVerifyingKey::from_spki_base64(&announcement.key)?;
                let fingerprint = key.fingerprint();
                let mut store = FingerprintStore::load(store_path)?;
                match store.check(&self.relay_address, &fingerprint) {
                    FingerprintCheck::Matched => {
                        debug!(relay = %self.relay_address, "Relay key matches known fingerprint");
                    }
                    FingerprintCheck::TrustOnFirstUse => {
                        warn!(
                            relay = %self.relay_address,
                            fingerprint = %fingerprint,
                            "Trusting relay key on first use"
                        );
                    }
                    FingerprintCheck::Mismatch { expected, actual } => {
                        self.state = HandshakeState::Disconnected;
                        return Err(ClientError::Handshake(format!(
                            "relay key fingerprint changed: expected {expected}, got {actual}"
                        )));
                    }
                }
                store.record(&self.relay_address, &fingerprint, &announcement.key, unix_now());
                store.save(store_path)?;
                self.relay_key = Some(key);
                Ok(())
            }
        }
    }

    /// Handle a pre-key frame that may be the signed reply.
    ///
    /// Frames that are not `hex|signature` are ignored. A reply that fails
    /// verification is an error; the caller closes the connection. On
    /// success returns the join action to send under the new key.
    pub fn handle_reply(
        &mut self,
        frame: &str,
        channel_hash: &str,
    ) -> Result<Option<ServerAction>, ClientError> {
        let Ok(reply) = frame.parse::<HandshakeReply>() else {
            debug!(len = frame.len(), "Ignoring non-handshake frame before server key");
            return Ok(None);
        };
        let Some(relay_key) = &self.relay_key else {
            self.state = HandshakeState::Disconnected;
            return Err(ClientError::Handshake(
                "relay reply arrived before a trusted relay key".into(),
            ));
        };
        let agreement = self
            .agreement
            .take()
            .ok_or_else(|| ClientError::Handshake("no key exchange in progress".into()))?;

        let key = agreement
            .complete(&reply.public_key_hex, &reply.signature_b64, relay_key)
            .map_err(|e| {
                self.state = HandshakeState::Disconnected;
                ClientError::Handshake(e.to_string())
            })?;
        self.server_key = Some(key);
        self.state = HandshakeState::ServerSecured;
        info!(relay = %self.relay_address, "Relay handshake verified");

        Ok(Some(ServerAction::Join {
            channel_hash: channel_hash.to_string(),
        }))
    }

    /// First decrypted relay frame after the join.
    pub fn mark_joined(&mut self) {
        if self.state == HandshakeState::ServerSecured {
            self.state = HandshakeState::Joined;
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
