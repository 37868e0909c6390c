//! Client connection options.

use std::time::Duration;

use hushroom_core::config::default_known_relays_path;
use hushroom_core::{ClientConfig, ReconnectConfig};
use hushroom_crypto::RelayVerifyingKey;

use crate::error::ClientError;
use crate::handshake::RelayTrust;
use crate::heartbeat::DEFAULT_PING_INTERVAL;

/// Everything the client needs to reach and trust a relay.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Relay WebSocket URL (e.g., "ws://127.0.0.1:8088").
    pub relay_url: String,

    /// How the relay's signing key is trusted.
    pub trust: RelayTrust,

    /// Interval between `ping` frames.
    pub ping_interval: Duration,

    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,

    /// A connection that stayed up this long resets the backoff.
    pub stable_after: Duration,
}

impl ClientOptions {
    /// Create options with required fields and defaults.
    pub fn new(relay_url: impl Into<String>, trust: RelayTrust) -> Self {
        Self {
            relay_url: relay_url.into(),
            trust,
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            stable_after: Duration::from_secs(60),
        }
    }

    /// Build options from the `[client]` config section.
    ///
    /// A pinned key wins over TOFU. With neither configured there is no way
    /// to authenticate the relay and this fails.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let trust = if let Some(key) = &config.relay_public_key {
            RelayTrust::Pinned(RelayVerifyingKey::from_spki_base64(key)?)
        } else if config.trust_on_first_use {
            let store_path = config
                .known_relays_path
                .clone()
                .or_else(default_known_relays_path)
                .ok_or_else(|| {
                    ClientError::Config("Cannot determine known relays path".into())
                })?;
            RelayTrust::TrustOnFirstUse { store_path }
        } else {
            return Err(ClientError::Config(
                "No relay public key pinned and trust-on-first-use disabled".into(),
            ));
        };

        if config.ping_interval_secs == 0 {
            return Err(ClientError::Config(
                "ping_interval_secs must be greater than zero".into(),
            ));
        }

        Ok(Self {
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            reconnect: ReconnectPolicy::from(&config.reconnect),
            ..Self::new(config.relay_url.clone(), trust)
        })
    }
}

/// Exponential backoff reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier applied to delay after each failed attempt.
    pub multiplier: f64,
    /// Maximum number of reconnect attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Calculate the delay for a given attempt number (0-indexed).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.min(64) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Whether another attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use hushroom_crypto::test_signing_key;

    #[test]
    fn default_reconnect_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(3));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert_eq!(policy.multiplier, 2.0);
        assert!(policy.max_attempts.is_none());
    }

    #[test]
    fn exponential_backoff_delays() {
        let policy = ReconnectPolicy::default();

        // 3s, 6s, 12s, 24s, 48s, 60s (capped), 60s
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(6));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(12));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(24));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(48));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn fixed_delay_with_unit_multiplier() {
        let policy = ReconnectPolicy {
            multiplier: 1.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(3));
    }

    #[test]
    fn retry_with_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn retry_unlimited() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(u32::MAX));
    }

    #[test]
    fn pinned_key_wins_over_tofu() {
        let spki = test_signing_key().verifying_key().to_spki_base64().unwrap();
        let config = ClientConfig {
            relay_public_key: Some(spki),
            trust_on_first_use: true,
            ..ClientConfig::default()
        };
        let options = ClientOptions::from_config(&config).unwrap();
        assert!(matches!(options.trust, RelayTrust::Pinned(_)));
        assert_eq!(options.ping_interval, Duration::from_secs(20));
    }

    #[test]
    fn tofu_uses_configured_store() {
        let config = ClientConfig {
            trust_on_first_use: true,
            known_relays_path: Some("/tmp/known.json".into()),
            ..ClientConfig::default()
        };
        let options = ClientOptions::from_config(&config).unwrap();
        let RelayTrust::TrustOnFirstUse { store_path } = options.trust else {
            panic!("expected TOFU");
        };
        assert_eq!(store_path, std::path::PathBuf::from("/tmp/known.json"));
    }

    #[test]
    fn zero_ping_interval_is_rejected() {
        let spki = test_signing_key().verifying_key().to_spki_base64().unwrap();
        let config = ClientConfig {
            relay_public_key: Some(spki),
            ping_interval_secs: 0,
            ..ClientConfig::default()
        };
        let result = ClientOptions::from_config(&config);
        assert!(matches!(result, Err(ClientError::Config(msg)) if msg.contains("ping_interval")));
    }

    #[test]
    fn no_trust_source_is_rejected() {
        let result = ClientOptions::from_config(&ClientConfig::default());
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn malformed_pinned_key_is_rejected() {
        let config = ClientConfig {
            relay_public_key: Some("not base64 !!".into()),
            ..ClientConfig::default()
        };
        assert!(matches!(
            ClientOptions::from_config(&config),
            Err(ClientError::Crypto(_))
        ));
    }
}
