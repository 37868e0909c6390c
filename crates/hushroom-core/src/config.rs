//! Configuration resolution for Hushroom.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults
//! 2. Global config (`~/.config/hushroom/config.toml`)
//! 3. Explicit config file passed on the command line
//! 4. Environment variables
//!
//! CLI flags are applied on top by the binaries themselves.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum size of an encrypted server-layer frame (8 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Complete Hushroom configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    pub addr: SocketAddr,
    /// Clients not seen for this long are reaped on the next accept.
    pub seen_timeout_secs: u64,
    /// Largest encrypted frame accepted from a client.
    pub max_frame_bytes: usize,
    /// File holding the base64 PKCS#8 DER signing key. When unset an
    /// ephemeral key is generated at startup.
    pub signing_key_path: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            seen_timeout_secs: 60,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            signing_key_path: None,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Pinned relay signing key (base64 SPKI DER).
    pub relay_public_key: Option<String>,
    /// Learn the relay key on first contact instead of pinning it.
    pub trust_on_first_use: bool,
    /// Where TOFU fingerprints are persisted.
    pub known_relays_path: Option<PathBuf>,
    pub ping_interval_secs: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8088".to_string(),
            relay_public_key: None,
            trust_on_first_use: false,
            known_relays_path: None,
            ping_interval_secs: 20,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect backoff settings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// None = retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` is a path given on the command line; unlike the global file it
/// must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path)?,
        _ => Config::default(),
    };

    if let Some(path) = explicit {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hushroom").join("config.toml"))
}

/// Default location of the TOFU relay fingerprint store.
pub fn default_known_relays_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hushroom").join("known_relays.json"))
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Parse a TOML document into a [`Config`], filling gaps with defaults.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("HUSHROOM_RELAY_ADDR") {
        if let Ok(addr) = val.parse() {
            config.relay.addr = addr;
        } else {
            tracing::warn!(value = %val, "Ignoring invalid HUSHROOM_RELAY_ADDR");
        }
    }
    if let Ok(val) = std::env::var("HUSHROOM_SEEN_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.relay.seen_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("HUSHROOM_RELAY_URL") {
        config.client.relay_url = val;
    }
    if let Ok(val) = std::env::var("HUSHROOM_RELAY_PUBLIC_KEY") {
        config.client.relay_public_key = Some(val);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.relay.seen_timeout_secs, 60);
        assert_eq!(config.relay.max_frame_bytes, 8 * 1024 * 1024);
        assert_eq!(config.client.ping_interval_secs, 20);
        assert_eq!(config.client.reconnect.initial_delay_ms, 3000);
        assert!(!config.client.trust_on_first_use);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [relay]
            addr = "0.0.0.0:9000"

            [client]
            trust_on_first_use = true
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.addr.port(), 9000);
        assert_eq!(config.relay.seen_timeout_secs, 60);
        assert!(config.client.trust_on_first_use);
        assert_eq!(config.client.relay_url, "ws://127.0.0.1:8088");
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(parse_config("").unwrap(), Config::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(matches!(parse_config("[relay"), Err(Error::Toml(_))));
    }

    #[test]
    fn load_config_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[relay]\nseen_timeout_secs = 5\n").unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.relay.seen_timeout_secs, 5);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = load_config_file(Path::new("/nonexistent/hushroom.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
