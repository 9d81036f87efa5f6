//! The key store: password-guarded custody of the key hierarchy and the
//! recovery seed.
//!
//! States: Uninitialized (no persisted secret) → Locked (persisted secret
//! exists, no key material in memory) → Unlocked (key material loaded for
//! every purpose). All mutation happens under one internal mutex, so a
//! caller can never observe a half-populated key table.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{Config, ConfigKey};
use crate::material::{KeyIndex, KeyMaterial};
use crate::mnemonic::Mnemonic;
use coffer_common::product;
use coffer_crypto::{AeadCipher, MessageCipher, SecretStore, BLOCK_KEY_LENGTH, KEY_LENGTH};

/// Expected, user-facing key store failures.
///
/// Wrong password and corrupt persisted data both surface as
/// [`KeyStoreError::InvalidPassword`], so the two cases cannot be told
/// apart by probing the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyStoreError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("no persisted secret found")]
    SecretNotFound,
    #[error("seed not found")]
    SeedNotFound,
    #[error("failed to save seed")]
    SaveSeed,
    #[error("invalid seed phrase")]
    InvalidSeedPhrase,
}

struct Inner {
    material: Option<KeyMaterial>,
    has_seed: bool,
}

/// Password-guarded key custody.
pub struct KeyStore {
    config: Arc<Config>,
    inner: Mutex<Inner>,
}

impl KeyStore {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                material: None,
                has_seed: false,
            }),
        }
    }

    /// Whether a persisted secret exists (Locked or Unlocked vs
    /// Uninitialized).
    pub fn has_password(&self) -> bool {
        self.config
            .get_string(ConfigKey::KeyStoreValue)
            .is_some_and(|value| !value.is_empty())
    }

    /// Whether an encrypted seed was decryptable at open/save time.
    pub fn has_seed(&self) -> bool {
        self.lock().has_seed
    }

    /// Create a brand-new key hierarchy guarded by `password`.
    ///
    /// Any previous secret and seed are hard-reset first. A persistence
    /// failure is reported as `false`, not a panic.
    pub fn create(&self, password: &str) -> bool {
        let blob = Zeroizing::new(KeyMaterial::generate().to_secret_blob());
        let value = match SecretStore::new(password).encrypt_value(&blob) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to encrypt new secret store value. {}", e);
                return false;
            }
        };
        drop(blob);

        let mut inner = self.lock();
        if !Self::reset_inner(&self.config, &mut inner, true) {
            return false;
        }
        self.config
            .set_string(ConfigKey::KeyStoreValue, Some(&value))
    }

    /// Decrypt the persisted secret and load the key table
    /// (Locked → Unlocked). Fails closed.
    pub fn open(&self, password: &str) -> Result<(), KeyStoreError> {
        let mut inner = self.lock();
        inner.material = None;
        inner.has_seed = false;

        let value = self
            .config
            .get_string(ConfigKey::KeyStoreValue)
            .filter(|value| !value.is_empty())
            .ok_or(KeyStoreError::SecretNotFound)?;

        let blob = Zeroizing::new(
            SecretStore::new(password)
                .decrypt_value(&value)
                .ok_or(KeyStoreError::InvalidPassword)?,
        );
        // A decrypted blob that does not parse is corruption; collapse it
        // into the wrong-password outcome.
        let material =
            KeyMaterial::from_secret_blob(&blob).ok_or(KeyStoreError::InvalidPassword)?;

        inner.material = Some(material);
        inner.has_seed = Self::decrypt_seed(&self.config, &inner).is_some();

        tracing::debug!("Key store unlocked (has_seed={}).", inner.has_seed);
        Ok(())
    }

    /// The identical password check without mutating state. Used to
    /// re-authenticate privileged actions.
    pub fn verify(&self, password: &str) -> bool {
        self.config
            .get_string(ConfigKey::KeyStoreValue)
            .filter(|value| !value.is_empty())
            .and_then(|value| {
                SecretStore::new(password)
                    .decrypt_value(&value)
                    .map(Zeroizing::new)
            })
            .is_some()
    }

    /// Zero the in-memory key table; with `hard`, also delete the
    /// persisted secret and every seed field.
    pub fn reset(&self, hard: bool) -> bool {
        let mut inner = self.lock();
        Self::reset_inner(&self.config, &mut inner, hard)
    }

    fn reset_inner(config: &Config, inner: &mut Inner, hard: bool) -> bool {
        inner.material = None;
        inner.has_seed = false;

        if hard
            && !config.set_many(&[
                (ConfigKey::KeyStoreValue, None),
                (ConfigKey::KeyStoreSeed, None),
                (ConfigKey::KeyStoreSeedPhrase, None),
            ])
        {
            return false;
        }

        tracing::debug!("Key store reset (hard={}).", hard);
        true
    }

    /// Cipher for `index` with its instance nonce.
    ///
    /// # Panics
    /// Panics when the store is not unlocked: deriving a cipher without key
    /// material is a caller bug, not a runtime condition.
    pub fn derive_cipher(&self, index: KeyIndex) -> AeadCipher {
        let inner = self.lock();
        let material = inner.material.as_ref().expect("key store is locked");
        AeadCipher::with_nonce(material.key(index), *material.nonce(index))
    }

    /// One-shot message cipher for `index`.
    ///
    /// # Panics
    /// Panics when the store is not unlocked.
    pub fn derive_message_cipher(&self, index: KeyIndex) -> MessageCipher {
        let inner = self.lock();
        let material = inner.material.as_ref().expect("key store is locked");
        MessageCipher::new(material.key(index))
    }

    /// The 256-bit sector-encryption key for the block-device VFS: the
    /// concatenation of every per-purpose key.
    ///
    /// # Panics
    /// Panics when the store is not unlocked.
    pub fn derive_block_device_key(&self) -> [u8; BLOCK_KEY_LENGTH] {
        let inner = self.lock();
        let material = inner.material.as_ref().expect("key store is locked");

        let mut key = [0u8; BLOCK_KEY_LENGTH];
        key[..KEY_LENGTH].copy_from_slice(material.key(KeyIndex::WalletDatabase));
        key[KEY_LENGTH..].copy_from_slice(material.key(KeyIndex::Seed));
        key
    }

    /// Derive the seed from `phrase`, encrypt seed and `(language, phrase)`
    /// under [`KeyIndex::Seed`], and persist both together.
    ///
    /// # Panics
    /// Panics when the store is not unlocked.
    pub fn save_seed(&self, language: &str, phrase: &str) -> Result<(), KeyStoreError> {
        if language.contains(product::STRING_SEPARATOR) {
            return Err(KeyStoreError::SaveSeed);
        }

        let mut inner = self.lock();
        let material = inner.material.as_ref().expect("key store is locked");
        let cipher = MessageCipher::new(material.key(KeyIndex::Seed));

        let seed = Zeroizing::new(
            Mnemonic::phrase_to_seed(phrase, None)
                .map_err(|_| KeyStoreError::InvalidSeedPhrase)?,
        );
        let seed_value = cipher
            .encrypt(seed.as_slice())
            .map_err(|_| KeyStoreError::SaveSeed)?;

        let framed = Zeroizing::new(format!(
            "{language}{}{phrase}",
            product::STRING_SEPARATOR
        ));
        let phrase_value = cipher
            .encrypt(framed.as_bytes())
            .map_err(|_| KeyStoreError::SaveSeed)?;

        if !self.config.set_many(&[
            (ConfigKey::KeyStoreSeed, Some(&seed_value)),
            (ConfigKey::KeyStoreSeedPhrase, Some(&phrase_value)),
        ]) {
            return Err(KeyStoreError::SaveSeed);
        }

        inner.has_seed = true;
        Ok(())
    }

    /// Reveal the stored seed phrase after an independent password check.
    ///
    /// Disclosure is a privileged action: the password is re-verified
    /// regardless of the current unlock state.
    pub fn reveal_seed_phrase(&self, password: &str) -> Result<String, KeyStoreError> {
        let inner = self.lock();
        if !self.verify(password) {
            return Err(KeyStoreError::InvalidPassword);
        }
        let (_language, phrase) =
            Self::seed_phrase(&self.config, &inner).ok_or(KeyStoreError::SeedNotFound)?;
        Ok(phrase)
    }

    fn decrypt_seed(config: &Config, inner: &Inner) -> Option<Zeroizing<Vec<u8>>> {
        let value = config
            .get_string(ConfigKey::KeyStoreSeed)
            .filter(|value| !value.is_empty())?;
        let material = inner.material.as_ref()?;
        MessageCipher::new(material.key(KeyIndex::Seed))
            .decrypt(&value)
            .map(Zeroizing::new)
    }

    fn seed_phrase(config: &Config, inner: &Inner) -> Option<(String, String)> {
        let value = config
            .get_string(ConfigKey::KeyStoreSeedPhrase)
            .filter(|value| !value.is_empty())?;
        let material = inner.material.as_ref()?;

        let plaintext = MessageCipher::new(material.key(KeyIndex::Seed)).decrypt(&value)?;
        let text = String::from_utf8(plaintext).ok()?;
        let (language, phrase) = text.split_once(product::STRING_SEPARATOR)?;

        let language = language.to_lowercase();
        let phrase = Mnemonic::friendly_phrase(&language, phrase);
        Some((language, phrase))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("key store lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_key_store(temp: &TempDir) -> KeyStore {
        KeyStore::new(Arc::new(Config::new(temp.path().join("config.json"))))
    }

    #[test]
    fn test_create_open_lifecycle() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert!(!key_store.has_password());
        assert!(key_store.create("password"));
        assert!(key_store.has_password());

        key_store.open("password").unwrap();

        // Distinct key material per index.
        let key1 = key_store.derive_cipher(KeyIndex::WalletDatabase);
        let key2 = key_store.derive_cipher(KeyIndex::Seed);
        let sample = key1.encrypt(b"sample").unwrap();
        assert!(key2.decrypt(&sample).is_none());
    }

    #[test]
    fn test_open_wrong_password_fails_closed() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert!(key_store.create("password"));
        assert_eq!(
            key_store.open("wrong").unwrap_err(),
            KeyStoreError::InvalidPassword
        );
    }

    #[test]
    fn test_open_uninitialized_fails() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert_eq!(
            key_store.open("password").unwrap_err(),
            KeyStoreError::SecretNotFound
        );
    }

    #[test]
    fn test_verify_does_not_mutate_state() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert!(key_store.create("password"));
        assert!(key_store.verify("password"));
        assert!(!key_store.verify("wrong"));

        // Still locked: verify must not have loaded key material.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            key_store.derive_cipher(KeyIndex::Seed)
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_hard_reset_destroys_everything() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert!(key_store.create("password"));
        key_store.open("password").unwrap();
        assert!(key_store.reset(true));

        assert!(!key_store.has_password());
        assert!(!key_store.has_seed());
        assert_eq!(
            key_store.open("password").unwrap_err(),
            KeyStoreError::SecretNotFound
        );
    }

    #[test]
    fn test_soft_reset_keeps_persisted_secret() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert!(key_store.create("password"));
        key_store.open("password").unwrap();
        assert!(key_store.reset(false));

        assert!(key_store.has_password());
        key_store.open("password").unwrap();
    }

    #[test]
    fn test_create_replaces_previous_secret() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);

        assert!(key_store.create("first"));
        assert!(key_store.create("second"));

        assert_eq!(
            key_store.open("first").unwrap_err(),
            KeyStoreError::InvalidPassword
        );
        key_store.open("second").unwrap();
    }

    #[test]
    fn test_tampered_persisted_secret_fails_closed() {
        let temp = TempDir::new().unwrap();
        let config = Arc::new(Config::new(temp.path().join("config.json")));
        let key_store = KeyStore::new(config.clone());

        assert!(key_store.create("password"));

        let value = config.get_string(ConfigKey::KeyStoreValue).unwrap();
        let mut tampered: Vec<char> = value.chars().collect();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == '0' { '1' } else { '0' };
        let tampered: String = tampered.into_iter().collect();
        assert!(config.set_string(ConfigKey::KeyStoreValue, Some(&tampered)));

        assert_eq!(
            key_store.open("password").unwrap_err(),
            KeyStoreError::InvalidPassword
        );
    }

    #[test]
    fn test_derive_while_locked_panics() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);
        assert!(key_store.create("password"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            key_store.derive_block_device_key()
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_block_device_key_concatenates_purpose_keys() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);
        assert!(key_store.create("password"));
        key_store.open("password").unwrap();

        let key = key_store.derive_block_device_key();
        assert_eq!(key.len(), BLOCK_KEY_LENGTH);

        // Stable across calls while unlocked.
        assert_eq!(key, key_store.derive_block_device_key());
    }

    #[test]
    fn test_seed_roundtrip_and_reveal() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);
        assert!(key_store.create("password"));
        key_store.open("password").unwrap();
        assert!(!key_store.has_seed());

        let phrase = Mnemonic::new(None)
            .unwrap()
            .phrase_from_entropy(&[0x33; 24])
            .unwrap();
        key_store.save_seed("english", &phrase).unwrap();
        assert!(key_store.has_seed());

        assert_eq!(key_store.reveal_seed_phrase("password").unwrap(), phrase);
        assert_eq!(
            key_store.reveal_seed_phrase("wrong").unwrap_err(),
            KeyStoreError::InvalidPassword
        );

        // Seed survives a lock/unlock cycle.
        assert!(key_store.reset(false));
        key_store.open("password").unwrap();
        assert!(key_store.has_seed());
    }

    #[test]
    fn test_reveal_without_seed() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);
        assert!(key_store.create("password"));
        key_store.open("password").unwrap();

        assert_eq!(
            key_store.reveal_seed_phrase("password").unwrap_err(),
            KeyStoreError::SeedNotFound
        );
    }

    #[test]
    fn test_save_seed_rejects_separator_in_language() {
        let temp = TempDir::new().unwrap();
        let key_store = new_key_store(&temp);
        assert!(key_store.create("password"));
        key_store.open("password").unwrap();

        let phrase = Mnemonic::new(None)
            .unwrap()
            .phrase_from_entropy(&[0x33; 24])
            .unwrap();
        assert_eq!(
            key_store.save_seed("bad:name", &phrase).unwrap_err(),
            KeyStoreError::SaveSeed
        );
    }
}
