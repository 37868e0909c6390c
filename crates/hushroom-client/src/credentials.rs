//! Room credentials.

use hushroom_crypto::sha256_hex;

/// Username plus the hashed room name and password.
///
/// Only `channel_hash` ever reaches the relay. The username travels inside
/// the peer layer and the password hash never leaves the client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub channel_hash: String,
    pub password_hash: String,
}

impl Credentials {
    pub fn new(username: &str, room: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            channel_hash: sha256_hex(room),
            password_hash: sha256_hex(password),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("channel_hash", &self.channel_hash)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn room_and_password_are_hashed() {
        let creds = Credentials::new("alice", "lobby", "hunter2");
        assert_eq!(creds.channel_hash, sha256_hex("lobby"));
        assert_eq!(creds.password_hash.len(), 64);
        assert_ne!(creds.channel_hash, creds.password_hash);
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("alice", "lobby", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&creds.password_hash));
    }
}
