//! Relay signing key (RSA-2048, PKCS#1 v1.5 over SHA-256).
//!
//! The relay signs its ephemeral handshake public key with a long-lived
//! key. Clients hold the public half (base64 SPKI DER) out of band, or
//! learn it on first use.

use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::codec::{decode_b64, encode_b64};
use crate::error::CryptoError;
use crate::hashing::fingerprint_of;

/// Modulus size of freshly generated relay keys.
pub const RSA_BITS: usize = 2048;

/// Long-lived relay private key.
#[derive(Clone)]
pub struct RelaySigningKey {
    key: RsaPrivateKey,
}

impl std::fmt::Debug for RelaySigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySigningKey")
            .field("fingerprint", &self.verifying_key().fingerprint())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl RelaySigningKey {
    /// Generate a fresh key. Takes noticeable time (RSA prime search).
    pub fn generate() -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        Ok(Self::from_private(key))
    }

    const fn from_private(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Parse a PKCS#8 DER private key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("relay private key: {e}")))?;
        Ok(Self::from_private(key))
    }

    /// Parse a base64 PKCS#8 DER private key.
    pub fn from_pkcs8_base64(b64: &str) -> Result<Self, CryptoError> {
        let mut der = decode_b64(b64.trim(), "relay private key")?;
        let result = Self::from_pkcs8_der(&der);
        der.zeroize();
        result
    }

    /// Base64 PKCS#8 DER encoding of the private key.
    pub fn to_pkcs8_base64(&self) -> Result<String, CryptoError> {
        let doc = self
            .key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        Ok(encode_b64(doc.as_bytes()))
    }

    /// Public half.
    pub fn verifying_key(&self) -> RelayVerifyingKey {
        RelayVerifyingKey::from_public(self.key.to_public_key())
    }

    /// Sign arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        SigningKey::<Sha256>::new(self.key.clone())
            .sign(message)
            .to_vec()
    }

    /// Save the private key as base64 PKCS#8 with owner-only permissions.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let mut encoded = self.to_pkcs8_base64()?;
        std::fs::write(path, encoded.as_bytes())?;
        encoded.zeroize();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Load a key written by [`Self::save_to_file`].
    ///
    /// On Unix, refuses files readable by group or others.
    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                return Err(CryptoError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("Relay key file has insecure permissions: {mode:o} (expected 600)"),
                )));
            }
        }

        let mut contents = std::fs::read_to_string(path)?;
        let result = Self::from_pkcs8_base64(&contents);
        contents.zeroize();
        result
    }

    /// Load from file, or generate a new key and save it.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let key = Self::generate()?;
            key.save_to_file(path)?;
            Ok(key)
        }
    }
}

/// Relay public key as held by clients.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayVerifyingKey {
    key: RsaPublicKey,
}

impl std::fmt::Debug for RelayVerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RelayVerifyingKey")
            .field(&self.fingerprint())
            .finish()
    }
}

impl RelayVerifyingKey {
    const fn from_public(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Parse base64 SPKI DER, the form relays announce and users configure.
    pub fn from_spki_base64(b64: &str) -> Result<Self, CryptoError> {
        let der = decode_b64(b64.trim(), "relay public key")?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::InvalidKey(format!("relay public key: {e}")))?;
        Ok(Self::from_public(key))
    }

    fn spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::SerializationError(e.to_string()))
    }

    /// Base64 SPKI DER encoding.
    pub fn to_spki_base64(&self) -> Result<String, CryptoError> {
        Ok(encode_b64(&self.spki_der()?))
    }

    /// Colon-separated SHA-256 of the SPKI DER bytes.
    pub fn fingerprint(&self) -> String {
        self.spki_der()
            .map_or_else(|_| String::from("<unencodable>"), |der| fingerprint_of(&der))
    }

    /// Verify a PKCS#1 v1.5 / SHA-256 signature.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let signature = Signature::try_from(signature).map_err(|_| CryptoError::SignatureInvalid)?;
        VerifyingKey::<Sha256>::new(self.key.clone())
            .verify(message, &signature)
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

/// Process-wide signing key for tests. RSA generation is slow, so it is
/// generated once and shared.
#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub fn test_signing_key() -> &'static RelaySigningKey {
    static KEY: std::sync::OnceLock<RelaySigningKey> = std::sync::OnceLock::new();
    KEY.get_or_init(|| RelaySigningKey::generate().expect("generate test relay key"))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = test_signing_key();
        let sig = key.sign(b"ephemeral public key");
        assert_eq!(sig.len(), RSA_BITS / 8);
        key.verifying_key()
            .verify(b"ephemeral public key", &sig)
            .unwrap();
    }

    #[test]
    fn verify_rejects_other_message_and_garbage() {
        let key = test_signing_key();
        let vk = key.verifying_key();
        let sig = key.sign(b"one");
        assert!(matches!(
            vk.verify(b"two", &sig),
            Err(CryptoError::SignatureInvalid)
        ));
        assert!(matches!(
            vk.verify(b"one", &[0u8; 7]),
            Err(CryptoError::SignatureInvalid)
        ));
    }

    #[test]
    fn spki_base64_roundtrip_keeps_fingerprint() {
        let vk = test_signing_key().verifying_key();
        let b64 = vk.to_spki_base64().unwrap();
        let parsed = RelayVerifyingKey::from_spki_base64(&b64).unwrap();
        assert_eq!(parsed, vk);
        assert_eq!(parsed.fingerprint(), vk.fingerprint());
    }

    #[test]
    fn invalid_spki_is_rejected() {
        assert!(matches!(
            RelayVerifyingKey::from_spki_base64("bm90IGEga2V5"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            RelayVerifyingKey::from_spki_base64("***"),
            Err(CryptoError::MalformedFrame(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let dbg = format!("{:?}", test_signing_key());
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains(&test_signing_key().to_pkcs8_base64().unwrap()));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("relay.key");
        let key = test_signing_key();
        key.save_to_file(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        let loaded = RelaySigningKey::load_from_file(&path).unwrap();
        assert_eq!(loaded.verifying_key(), key.verifying_key());
        // load_or_generate must reuse the existing file
        let again = RelaySigningKey::load_or_generate(&path).unwrap();
        assert_eq!(again.verifying_key(), key.verifying_key());
    }

    #[cfg(unix)]
    #[test]
    fn load_rejects_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.key");
        test_signing_key().save_to_file(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            RelaySigningKey::load_from_file(&path),
            Err(CryptoError::IoError(_))
        ));
    }
}
