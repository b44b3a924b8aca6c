//! At-rest credential encryption.
//!
//! Credentials inside the appliance record (the SMTP password) are stored
//! encrypted. The codec decrypts them on demand during resolution; the
//! plaintext lives only inside the returned [`SecretString`] and is never
//! written back to the record.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::SecretString;

use crate::error::ResolveError;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// AES-256 key length in bytes.
const KEY_LEN: usize = 32;

/// Decrypts at-rest-encrypted credentials on demand.
pub trait SecretCodec: Send + Sync {
    /// Decrypt a stored ciphertext.
    ///
    /// # Errors
    /// Returns [`ResolveError::Decryption`] on malformed or tampered input.
    /// Implementations never log the plaintext.
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, ResolveError>;
}

/// AES-256-GCM codec over base64 ciphertexts.
///
/// Ciphertext layout: `base64(nonce || ciphertext+tag)`. Tampering with
/// any part of the payload fails authentication and is rejected.
pub struct AesGcmSecretCodec {
    cipher: Aes256Gcm,
}

impl AesGcmSecretCodec {
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Build a codec from a base64-encoded 256-bit key.
    ///
    /// # Errors
    /// Returns [`ResolveError::Decryption`] when the key is not valid
    /// base64 or does not decode to exactly 32 bytes.
    pub fn from_base64_key(key: &str) -> Result<Self, ResolveError> {
        let bytes = STANDARD
            .decode(key)
            .map_err(|e| ResolveError::Decryption(format!("invalid codec key: {e}")))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| ResolveError::Decryption("codec key must be 32 bytes".to_string()))?;
        Ok(Self::new(&key))
    }

    /// Encrypt a plaintext into the storable ciphertext format.
    ///
    /// # Errors
    /// Returns [`ResolveError::Decryption`] if sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ResolveError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| ResolveError::Decryption("sealing failed".to_string()))?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&sealed);
        Ok(STANDARD.encode(payload))
    }
}

impl SecretCodec for AesGcmSecretCodec {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, ResolveError> {
        let payload = STANDARD
            .decode(ciphertext)
            .map_err(|e| ResolveError::Decryption(format!("invalid base64: {e}")))?;
        if payload.len() <= NONCE_LEN {
            return Err(ResolveError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| ResolveError::Decryption("ciphertext rejected".to_string()))?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| ResolveError::Decryption("plaintext is not valid UTF-8".to_string()))?;

        Ok(SecretString::from(plaintext))
    }
}

impl fmt::Debug for AesGcmSecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmSecretCodec").finish_non_exhaustive()
    }
}
