//! Seed phrase onboarding: live-preview generation and restore.
//!
//! Generation keeps one running SHA-256 digest per attempt. The digest is
//! seeded from the OS CSPRNG; every UI interaction feeds more randomness
//! and user salt into the same digest without resetting it, and the phrase
//! preview is recomputed from the current digest state. Finalization only
//! accepts the most recent preview, so a stale phrase captured from an
//! earlier preview can never be committed.

use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::mnemonic::{Mnemonic, DEFAULT_DATA_LENGTH};
use crate::store::{KeyStore, KeyStoreError};

enum GenerateState {
    Idle,
    Previewing {
        mnemonic: Mnemonic,
        salt_hash: Sha256,
    },
}

/// Live-preview generator for a new seed phrase.
pub struct SeedPhraseGenerator {
    key_store: Arc<KeyStore>,
    state: GenerateState,
}

impl SeedPhraseGenerator {
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self {
            key_store,
            state: GenerateState::Idle,
        }
    }

    pub fn in_progress(&self) -> bool {
        matches!(self.state, GenerateState::Previewing { .. })
    }

    /// Abandon the current attempt and its digest state.
    pub fn clear(&mut self) {
        self.state = GenerateState::Idle;
    }

    /// Start a new attempt and return the first phrase preview.
    pub fn prepare(&mut self, language: Option<&str>) -> Result<String, KeyStoreError> {
        let mnemonic = Mnemonic::new(language).map_err(|_| KeyStoreError::InvalidSeedPhrase)?;

        let mut entropy = [0u8; 64];
        OsRng.fill_bytes(&mut entropy);
        let mut salt_hash = Sha256::new();
        salt_hash.update(entropy);

        self.state = GenerateState::Previewing {
            mnemonic,
            salt_hash,
        };
        Ok(self.update(None))
    }

    /// Feed user salt into the running digest and return the new preview.
    ///
    /// With `None`, returns the current preview unchanged. Returns an empty
    /// string when no attempt is in progress.
    pub fn update(&mut self, salt: Option<&str>) -> String {
        let GenerateState::Previewing {
            mnemonic,
            salt_hash,
        } = &mut self.state
        else {
            return String::new();
        };

        if let Some(salt) = salt.filter(|salt| !salt.is_empty()) {
            salt_hash.update(salt.as_bytes());
            let mut extra = [0u8; 4];
            OsRng.fill_bytes(&mut extra);
            salt_hash.update(extra);
        }

        let digest = salt_hash.clone().finalize();
        mnemonic
            .phrase_from_entropy(&digest[..DEFAULT_DATA_LENGTH])
            .unwrap_or_default()
    }

    /// A phrase is acceptable only if it matches the most recent preview.
    pub fn validate(&mut self, phrase: &str) -> bool {
        !phrase.is_empty()
            && self.in_progress()
            && Mnemonic::is_equal_phrases(phrase, &self.update(None))
    }

    /// Commit the attempt: derive and persist the seed, then discard the
    /// digest state.
    pub fn finalize(&mut self, phrase: &str) -> Result<(), KeyStoreError> {
        if !self.validate(phrase) {
            return Err(KeyStoreError::InvalidSeedPhrase);
        }

        let GenerateState::Previewing { mnemonic, .. } = &self.state else {
            return Err(KeyStoreError::InvalidSeedPhrase);
        };
        self.key_store.save_seed(mnemonic.language_name(), phrase)?;

        self.clear();
        Ok(())
    }
}

/// Restore path: the user supplies an existing phrase.
pub struct SeedPhraseRestorer {
    key_store: Arc<KeyStore>,
    mnemonic: Option<Mnemonic>,
}

impl SeedPhraseRestorer {
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self {
            key_store,
            mnemonic: None,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.mnemonic.is_some()
    }

    pub fn clear(&mut self) {
        self.mnemonic = None;
    }

    pub fn prepare(&mut self, language: Option<&str>) -> Result<(), KeyStoreError> {
        self.mnemonic =
            Some(Mnemonic::new(language).map_err(|_| KeyStoreError::InvalidSeedPhrase)?);
        Ok(())
    }

    /// Word-list and checksum validation of the supplied phrase.
    pub fn validate(&self, phrase: &str) -> bool {
        !phrase.is_empty()
            && self
                .mnemonic
                .as_ref()
                .is_some_and(|mnemonic| mnemonic.is_valid_phrase(phrase))
    }

    pub fn finalize(&mut self, phrase: &str) -> Result<(), KeyStoreError> {
        if !self.validate(phrase) {
            return Err(KeyStoreError::InvalidSeedPhrase);
        }

        let Some(mnemonic) = &self.mnemonic else {
            return Err(KeyStoreError::InvalidSeedPhrase);
        };
        self.key_store.save_seed(mnemonic.language_name(), phrase)?;

        self.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn unlocked_key_store(temp: &TempDir) -> Arc<KeyStore> {
        let config = Arc::new(Config::new(temp.path().join("config.json")));
        let key_store = Arc::new(KeyStore::new(config));
        assert!(key_store.create("password"));
        key_store.open("password").unwrap();
        key_store
    }

    #[test]
    fn test_generate_lifecycle() {
        let temp = TempDir::new().unwrap();
        let key_store = unlocked_key_store(&temp);

        let mut generator = SeedPhraseGenerator::new(key_store.clone());
        assert!(!generator.in_progress());

        let preview = generator.prepare(None).unwrap();
        assert!(generator.in_progress());
        assert_eq!(preview.split_whitespace().count(), 18);

        // No salt: preview is stable.
        assert_eq!(generator.update(None), preview);

        generator.finalize(&preview).unwrap();
        assert!(!generator.in_progress());
        assert!(key_store.has_seed());
    }

    #[test]
    fn test_update_changes_preview() {
        let temp = TempDir::new().unwrap();
        let key_store = unlocked_key_store(&temp);

        let mut generator = SeedPhraseGenerator::new(key_store);
        let preview1 = generator.prepare(None).unwrap();
        let preview2 = generator.update(Some("keyboard mashing"));
        assert_ne!(preview1, preview2);
    }

    #[test]
    fn test_finalize_rejects_stale_preview() {
        let temp = TempDir::new().unwrap();
        let key_store = unlocked_key_store(&temp);

        let mut generator = SeedPhraseGenerator::new(key_store.clone());
        let stale = generator.prepare(None).unwrap();
        let fresh = generator.update(Some("more entropy"));

        assert_eq!(
            generator.finalize(&stale).unwrap_err(),
            KeyStoreError::InvalidSeedPhrase
        );
        assert!(!key_store.has_seed());

        generator.finalize(&fresh).unwrap();
        assert!(key_store.has_seed());
    }

    #[test]
    fn test_finalize_without_prepare_fails() {
        let temp = TempDir::new().unwrap();
        let key_store = unlocked_key_store(&temp);

        let mut generator = SeedPhraseGenerator::new(key_store);
        assert!(generator.finalize("any phrase").is_err());
    }

    #[test]
    fn test_restore_valid_phrase() {
        let temp = TempDir::new().unwrap();
        let key_store = unlocked_key_store(&temp);

        // A phrase with a correct checksum, produced from fixed entropy.
        let phrase = Mnemonic::new(None)
            .unwrap()
            .phrase_from_entropy(&[0x42; 24])
            .unwrap();

        let mut restorer = SeedPhraseRestorer::new(key_store.clone());
        restorer.prepare(None).unwrap();
        assert!(restorer.validate(&phrase));
        restorer.finalize(&phrase).unwrap();

        assert!(!restorer.in_progress());
        assert!(key_store.has_seed());
    }

    #[test]
    fn test_restore_rejects_bad_phrase() {
        let temp = TempDir::new().unwrap();
        let key_store = unlocked_key_store(&temp);

        let mut restorer = SeedPhraseRestorer::new(key_store);
        restorer.prepare(None).unwrap();
        assert!(!restorer.validate("definitely not a wordlist phrase"));
        assert!(restorer.finalize("definitely not a wordlist phrase").is_err());
    }
}
