//! Recovery phrase handling on top of the BIP-39 word lists.

use bip39::{Language, Mnemonic as Bip39Mnemonic};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use coffer_common::{Error, Result};

/// Entropy lengths (bytes) a phrase can encode.
pub const DATA_LENGTHS: [usize; 5] = [16, 20, 24, 28, 32];

/// Entropy length used for generated phrases (18 words).
pub const DEFAULT_DATA_LENGTH: usize = 24;

/// Length of a derived seed in bytes.
pub const SEED_LENGTH: usize = 64;

const LANGUAGES: [(&str, Language); 10] = [
    ("english", Language::English),
    ("chinese_simplified", Language::SimplifiedChinese),
    ("chinese_traditional", Language::TraditionalChinese),
    ("czech", Language::Czech),
    ("french", Language::French),
    ("italian", Language::Italian),
    ("japanese", Language::Japanese),
    ("korean", Language::Korean),
    ("portuguese", Language::Portuguese),
    ("spanish", Language::Spanish),
];

/// A word list bound to one language.
#[derive(Debug, Clone)]
pub struct Mnemonic {
    name: &'static str,
    language: Language,
}

impl Mnemonic {
    /// Create a word list for `language` (default `"english"`).
    ///
    /// # Errors
    /// - Returns error for an unknown language name.
    pub fn new(language: Option<&str>) -> Result<Self> {
        let requested = language.unwrap_or("english").to_lowercase();
        LANGUAGES
            .iter()
            .copied()
            .find(|(name, _)| *name == requested)
            .map(|(name, language)| Self { name, language })
            .ok_or_else(|| Error::InvalidInput(format!("unknown wordlist language: {requested}")))
    }

    pub fn language_name(&self) -> &'static str {
        self.name
    }

    /// Known language names.
    pub fn language_list() -> Vec<&'static str> {
        LANGUAGES.iter().map(|(name, _)| *name).collect()
    }

    /// Encode entropy as a phrase in this word list, rendered in the
    /// language's friendly form.
    ///
    /// # Errors
    /// - Returns error if `data` is not one of [`DATA_LENGTHS`].
    pub fn phrase_from_entropy(&self, data: &[u8]) -> Result<String> {
        if !DATA_LENGTHS.contains(&data.len()) {
            return Err(Error::InvalidInput(format!(
                "entropy length {} not in {:?}",
                data.len(),
                DATA_LENGTHS
            )));
        }
        let mnemonic = Bip39Mnemonic::from_entropy_in(self.language, data)
            .map_err(|e| Error::InvalidInput(format!("entropy rejected: {e}")))?;
        Ok(Self::friendly_phrase(self.name, &mnemonic.to_string()))
    }

    /// Word-list and checksum validation for a user-supplied phrase.
    pub fn is_valid_phrase(&self, phrase: &str) -> bool {
        Bip39Mnemonic::parse_in(self.language, phrase).is_ok()
    }

    /// Derive the 64-byte seed from a phrase.
    ///
    /// BIP-39 rule: PBKDF2-HMAC-SHA512 over the normalized phrase with salt
    /// `"mnemonic" + passphrase`, 2048 rounds. When no passphrase is given,
    /// the default is the phrase's characters taken from the end stepping
    /// back three at a time.
    ///
    /// # Errors
    /// - Returns error if the phrase is not a valid mnemonic.
    pub fn phrase_to_seed(phrase: &str, passphrase: Option<&str>) -> Result<[u8; SEED_LENGTH]> {
        let mnemonic = Bip39Mnemonic::parse(phrase)
            .map_err(|e| Error::InvalidInput(format!("invalid mnemonic phrase: {e}")))?;

        let normalized = mnemonic.to_string();
        let passphrase = Zeroizing::new(match passphrase {
            Some(passphrase) => passphrase.to_string(),
            None => normalized.chars().rev().step_by(3).collect(),
        });

        Ok(mnemonic.to_seed(passphrase.as_str()))
    }

    /// Compare two phrases for equality modulo whitespace, in constant time
    /// over the normalized contents.
    pub fn is_equal_phrases(phrase1: &str, phrase2: &str) -> bool {
        if phrase1.is_empty() || phrase2.is_empty() {
            return false;
        }
        let normalized1 = normalize_whitespace(phrase1);
        let normalized2 = normalize_whitespace(phrase2);
        normalized1
            .as_bytes()
            .ct_eq(normalized2.as_bytes())
            .into()
    }

    /// Render a phrase in its language's friendly form: ideographic spaces
    /// for Japanese, plain spaces otherwise.
    pub fn friendly_phrase(language: &str, phrase: &str) -> String {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        if language == "japanese" {
            words.join("\u{3000}")
        } else {
            words.join(" ")
        }
    }
}

fn normalize_whitespace(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}
