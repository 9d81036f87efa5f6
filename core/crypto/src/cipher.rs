//! Authenticated encryption using AES-128-GCM.
//!
//! Every ciphertext is bound to a fixed associated-data tag identifying the
//! product, so ciphertext produced by a foreign deployment fails
//! authentication here even under the same key.

use aes_gcm::{
    aead::{Aead, Payload},
    Aes128Gcm, KeyInit, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use coffer_common::{product, Error, Result};

/// Key length in bytes (128-bit).
pub const KEY_LENGTH: usize = 16;

/// Nonce length in bytes (96-bit, NIST recommended for GCM).
pub const NONCE_LENGTH: usize = 12;

/// Associated data bound to every ciphertext.
const ASSOCIATED_DATA: &[u8] = product::SHORT_NAME.as_bytes();

/// Why a decryption or parse failed.
///
/// Never crosses the public API: callers see `None`, so persisted-data
/// corruption is indistinguishable from a wrong password to anyone probing
/// the user-facing surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    /// Authentication tag did not verify (wrong key, wrong nonce, foreign
    /// associated data, or tampered ciphertext).
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Framing did not parse.
    #[error("malformed secret: {0}")]
    Malformed(&'static str),

    /// Version prefix is not one this build understands.
    #[error("unsupported secret version")]
    VersionMismatch,
}

/// AES-128-GCM with an optional instance-default nonce.
///
/// The key store hands these out per key purpose; the `(key, nonce)` pair
/// comes from the decrypted secret blob.
pub struct AeadCipher {
    cipher: Aes128Gcm,
    nonce: Option<[u8; NONCE_LENGTH]>,
}

impl AeadCipher {
    /// Create a cipher without a default nonce; only the `_with_nonce`
    /// operations are usable.
    pub fn new(key: &[u8; KEY_LENGTH]) -> Self {
        Self {
            cipher: Aes128Gcm::new(key.into()),
            nonce: None,
        }
    }

    /// Create a cipher with an instance-default nonce.
    pub fn with_nonce(key: &[u8; KEY_LENGTH], nonce: [u8; NONCE_LENGTH]) -> Self {
        Self {
            cipher: Aes128Gcm::new(key.into()),
            nonce: Some(nonce),
        }
    }

    /// Generate a random key from the OS CSPRNG.
    pub fn generate_key() -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Generate a random nonce from the OS CSPRNG.
    pub fn generate_nonce() -> [u8; NONCE_LENGTH] {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Encrypt with the instance-default nonce.
    ///
    /// # Errors
    /// - Returns error if the cipher was constructed without a nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = self
            .nonce
            .ok_or_else(|| Error::Crypto("cipher has no default nonce".to_string()))?;
        self.encrypt_with_nonce(&nonce, plaintext)
    }

    /// Decrypt with the instance-default nonce.
    ///
    /// Returns `None` on authentication failure or if the cipher has no
    /// default nonce. Never panics.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        self.nonce
            .and_then(|nonce| self.decrypt_with_nonce(&nonce, ciphertext))
    }

    /// Encrypt with an explicit nonce.
    ///
    /// The caller owns nonce uniqueness per key; reusing a nonce under the
    /// same key breaks GCM entirely.
    pub fn encrypt_with_nonce(
        &self,
        nonce: &[u8; NONCE_LENGTH],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| Error::Crypto("AEAD encryption failed".to_string()))
    }

    /// Decrypt with an explicit nonce; `None` on authentication failure.
    pub fn decrypt_with_nonce(
        &self,
        nonce: &[u8; NONCE_LENGTH],
        ciphertext: &[u8],
    ) -> Option<Vec<u8>> {
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .ok()
    }
}

/// One-shot message encryption with textual framing.
///
/// Layers a fresh random nonce over [`AeadCipher`] and frames the result as
/// `"<nonce-hex>:<ciphertext-hex>"`. Repeated encryptions of the same value
/// differ.
pub struct MessageCipher {
    inner: AeadCipher,
}

impl MessageCipher {
    pub fn new(key: &[u8; KEY_LENGTH]) -> Self {
        Self {
            inner: AeadCipher::new(key),
        }
    }

    /// Generate a random key from the OS CSPRNG.
    pub fn generate_key() -> [u8; KEY_LENGTH] {
        AeadCipher::generate_key()
    }

    /// Generate a random nonce from the OS CSPRNG.
    pub fn generate_nonce() -> [u8; NONCE_LENGTH] {
        AeadCipher::generate_nonce()
    }

    /// Encrypt `data` under a fresh random nonce.
    pub fn encrypt(&self, data: &[u8]) -> Result<String> {
        let nonce = Self::generate_nonce();
        let ciphertext = self.inner.encrypt_with_nonce(&nonce, data)?;
        Ok(format!(
            "{}{}{}",
            hex::encode(nonce),
            product::STRING_SEPARATOR,
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a framed message.
    ///
    /// Returns `None` for any malformed separator count, bad hex, or
    /// authentication failure. Never panics.
    pub fn decrypt(&self, text: &str) -> Option<Vec<u8>> {
        match self.decrypt_parsed(text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("message decryption failed: {}", e);
                None
            }
        }
    }

    pub(crate) fn decrypt_parsed(&self, text: &str) -> std::result::Result<Vec<u8>, SecretError> {
        let (nonce_hex, data_hex) = text
            .split_once(product::STRING_SEPARATOR)
            .ok_or(SecretError::Malformed("missing separator"))?;

        let nonce = hex::decode(nonce_hex).map_err(|_| SecretError::Malformed("bad nonce hex"))?;
        let nonce: [u8; NONCE_LENGTH] = nonce
            .try_into()
            .map_err(|_| SecretError::Malformed("bad nonce length"))?;
        let data =
            hex::decode(data_hex).map_err(|_| SecretError::Malformed("bad ciphertext hex"))?;

        self.inner
            .decrypt_with_nonce(&nonce, &data)
            .ok_or(SecretError::AuthenticationFailed)
    }
}
