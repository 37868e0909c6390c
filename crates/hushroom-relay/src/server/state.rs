//! State shared by every connection task.

use std::time::Duration;

use hushroom_core::RelayConfig;
use hushroom_crypto::RelaySigningKey;
use hushroom_proto::ServerKeyAnnouncement;

use crate::error::RelayError;
use crate::registry::ConnectionRegistry;
use crate::router::ActionRouter;

pub struct RelayState {
    pub registry: ConnectionRegistry,
    pub router: ActionRouter,
    signing_key: RelaySigningKey,
    announcement: String,
    fingerprint: String,
    max_frame_bytes: usize,
}

impl RelayState {
    pub fn new(config: &RelayConfig, signing_key: RelaySigningKey) -> Result<Self, RelayError> {
        let verifying = signing_key.verifying_key();
        let announcement = ServerKeyAnnouncement::new(verifying.to_spki_base64()?).to_frame()?;
        let registry = ConnectionRegistry::new(Duration::from_secs(config.seen_timeout_secs));
        Ok(Self {
            router: ActionRouter::new(registry.clone()),
            registry,
            signing_key,
            announcement,
            fingerprint: verifying.fingerprint(),
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    pub const fn signing_key(&self) -> &RelaySigningKey {
        &self.signing_key
    }

    /// The `server-key` frame sent to every new connection.
    pub fn announcement(&self) -> &str {
        &self.announcement
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub const fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl std::fmt::Debug for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayState")
            .field("fingerprint", &self.fingerprint)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish_non_exhaustive()
    }
}
