//! Server layer: AES-256-CBC with zero padding.
//!
//! Wire form: `base64(iv) | base64(ciphertext)`.

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ServerKey, decode_b64, encode_b64, parse_padded, serialize_padded};
use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// CBC initialisation vector size.
pub const IV_SIZE: usize = 16;

impl ServerKey {
    /// Encrypt a payload for the other end of this client/relay link.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<String, CryptoError> {
        let plaintext = serialize_padded(payload)?;

        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let cipher = Aes256CbcEnc::new_from_slices(self.as_bytes(), &iv)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&plaintext);

        Ok(format!("{}|{}", encode_b64(&iv), encode_b64(&ciphertext)))
    }

    /// Decrypt and parse a server-layer frame.
    pub fn decrypt<T: DeserializeOwned>(&self, frame: &str) -> Result<T, CryptoError> {
        let (iv_b64, ct_b64) = frame
            .split_once('|')
            .ok_or_else(|| CryptoError::MalformedFrame("missing separator".into()))?;

        let iv = decode_b64(iv_b64, "iv")?;
        if iv.len() != IV_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: IV_SIZE,
                actual: iv.len(),
            });
        }

        let ciphertext = decode_b64(ct_b64, "ciphertext")?;
        if ciphertext.is_empty() || ciphertext.len() % IV_SIZE != 0 {
            return Err(CryptoError::MalformedFrame(format!(
                "ciphertext length {} is not a positive multiple of {IV_SIZE}",
                ciphertext.len()
            )));
        }

        let cipher = Aes256CbcDec::new_from_slices(self.as_bytes(), &iv)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        parse_padded(&plaintext)
    }
}
