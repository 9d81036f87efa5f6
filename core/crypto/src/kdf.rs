//! Password key derivation and the encrypted-secret codec.
//!
//! The password is first pre-hashed through BLAKE2b-512 together with the
//! product tag and a fixed domain salt, which reduces arbitrary-length,
//! non-ASCII passwords to one unambiguous fixed-length input. The actual
//! key then comes from Argon2id, a memory-hard function, over
//! `(salt, password_hash)`.

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Blake2b512, Digest};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{MessageCipher, SecretError, KEY_LENGTH};
use coffer_common::{product, Result};

/// Memory cost in KiB (64 MiB). Fixed for all callers; changing it
/// invalidates every persisted secret, which is why the secret string
/// carries a version prefix.
const MEMORY_COST_KIB: u32 = 65536;

/// Number of Argon2id passes.
const TIME_COST: u32 = 3;

/// Degree of parallelism.
const PARALLELISM: u32 = 4;

/// Domain salt mixed into the password pre-hash.
const HASH_SALT: &[u8] = b"passphrase1";

/// Length of the BLAKE2b password pre-hash.
const PASSWORD_HASH_LENGTH: usize = 64;

/// Version prefix of the persisted secret string, tied to the KDF constants
/// above.
const SECRET_VERSION: &str = "v1";

/// Length of the random salt prepended to each persisted secret.
pub const SALT_LENGTH: usize = 16;

/// Password-to-key derivation.
///
/// Deterministic for fixed inputs. A derivation failure (e.g. the OS cannot
/// satisfy the memory cost) is an environment fault, not a recoverable
/// error, and aborts the process.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyDerivationFunction {
    password_hash: [u8; PASSWORD_HASH_LENGTH],
}

impl KeyDerivationFunction {
    pub fn new(password: &str) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(product::SHORT_NAME.as_bytes());
        hasher.update(password.as_bytes());
        hasher.update(HASH_SALT);

        Self {
            password_hash: hasher.finalize().into(),
        }
    }

    /// Derive `key_length` bytes for `salt`.
    ///
    /// Argon2 puts a lower bound on salt length, so caller salts of any
    /// length are first reduced to a fixed-length digest.
    pub fn derive(&self, salt: &[u8], key_length: usize) -> Vec<u8> {
        let salt_hash: [u8; 32] = Blake2b::<U32>::new().chain_update(salt).finalize().into();

        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(key_length))
            .unwrap_or_else(|e| panic!("invalid KDF parameters: {e}"));
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = vec![0u8; key_length];
        argon2
            .hash_password_into(&self.password_hash, &salt_hash, &mut key)
            .unwrap_or_else(|e| panic!("key derivation failed: {e}"));
        key
    }
}

/// Self-describing encrypted-blob codec built on the KDF.
///
/// Produces `"v1:<salt-hex>:<nonce-hex>:<ciphertext-hex>"`. The salt is
/// re-randomized on every encryption, so repeated encryptions of the same
/// value differ in all three variable fields.
pub struct SecretStore {
    kdf: KeyDerivationFunction,
}

impl SecretStore {
    pub fn new(password: &str) -> Self {
        Self {
            kdf: KeyDerivationFunction::new(password),
        }
    }

    /// Encrypt `value` under a fresh random salt.
    pub fn encrypt_value(&self, value: &[u8]) -> Result<String> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);

        let payload = self.derive_cipher(&salt).encrypt(value)?;
        Ok(format!(
            "{}{sep}{}{sep}{}",
            SECRET_VERSION,
            hex::encode(salt),
            payload,
            sep = product::STRING_SEPARATOR
        ))
    }

    /// Decrypt a persisted secret string.
    ///
    /// Returns `None` (never panics) on version mismatch, malformed
    /// framing, or authentication failure — deliberately the same outcome
    /// for all three.
    pub fn decrypt_value(&self, value: &str) -> Option<Vec<u8>> {
        match self.decrypt_value_parsed(value) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                tracing::debug!("secret decryption failed: {}", e);
                None
            }
        }
    }

    fn decrypt_value_parsed(&self, value: &str) -> std::result::Result<Vec<u8>, SecretError> {
        let mut parts = value.splitn(3, product::STRING_SEPARATOR);
        let version = parts.next().ok_or(SecretError::Malformed("empty"))?;
        let salt_hex = parts
            .next()
            .ok_or(SecretError::Malformed("missing salt"))?;
        let payload = parts
            .next()
            .ok_or(SecretError::Malformed("missing payload"))?;

        if version != SECRET_VERSION {
            return Err(SecretError::VersionMismatch);
        }

        let salt = hex::decode(salt_hex).map_err(|_| SecretError::Malformed("bad salt hex"))?;
        if salt.len() != SALT_LENGTH {
            return Err(SecretError::Malformed("bad salt length"));
        }

        self.derive_cipher(&salt).decrypt_parsed(payload)
    }

    fn derive_cipher(&self, salt: &[u8]) -> MessageCipher {
        let mut key = self.kdf.derive(salt, KEY_LENGTH);
        let key_array: [u8; KEY_LENGTH] = key
            .as_slice()
            .try_into()
            .unwrap_or_else(|_| panic!("derived key has wrong length"));
        key.zeroize();
        MessageCipher::new(&key_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let kdf = KeyDerivationFunction::new("pw");
        assert_eq!(kdf.derive(b"s", 16), kdf.derive(b"s", 16));
    }

    #[test]
    fn test_derive_different_salt() {
        let kdf = KeyDerivationFunction::new("pw");
        assert_ne!(kdf.derive(b"salt-a", 16), kdf.derive(b"salt-b", 16));
    }

    #[test]
    fn test_derive_different_password() {
        let kdf1 = KeyDerivationFunction::new("password1");
        let kdf2 = KeyDerivationFunction::new("password2");
        assert_ne!(kdf1.derive(b"s", 16), kdf2.derive(b"s", 16));
    }

    #[test]
    fn test_non_ascii_password() {
        let kdf = KeyDerivationFunction::new("пароль-\u{3042}-🔑");
        assert_eq!(kdf.derive(b"s", 16).len(), 16);
    }

    #[test]
    fn test_secret_roundtrip() {
        let store = SecretStore::new("correct horse");
        let value = store.encrypt_value(b"key material").unwrap();
        assert_eq!(store.decrypt_value(&value).unwrap(), b"key material");
    }

    #[test]
    fn test_wrong_password_fails_closed() {
        let value = SecretStore::new("password-1")
            .encrypt_value(b"key material")
            .unwrap();
        assert!(SecretStore::new("password-2").decrypt_value(&value).is_none());
    }

    #[test]
    fn test_salt_rerandomized_per_call() {
        let store = SecretStore::new("pw");
        let value1 = store.encrypt_value(b"same value").unwrap();
        let value2 = store.encrypt_value(b"same value").unwrap();
        assert_ne!(value1, value2);
    }

    #[test]
    fn test_version_mismatch_fails_closed() {
        let store = SecretStore::new("pw");
        let value = store.encrypt_value(b"data").unwrap();
        let forged = format!("v9{}", value.strip_prefix("v1").unwrap());

        assert_eq!(
            store.decrypt_value_parsed(&forged),
            Err(SecretError::VersionMismatch)
        );
        assert!(store.decrypt_value(&forged).is_none());
    }

    #[test]
    fn test_malformed_framing_fails_closed() {
        let store = SecretStore::new("pw");
        assert!(store.decrypt_value("").is_none());
        assert!(store.decrypt_value("v1").is_none());
        assert!(store.decrypt_value("v1:00ff").is_none());
        assert!(store.decrypt_value("v1:zz:00:00").is_none());
    }

    #[test]
    fn test_tampered_secret_fails_closed() {
        let store = SecretStore::new("pw");
        let value = store.encrypt_value(b"data").unwrap();

        // Flip one hex digit of the ciphertext tail.
        let mut tampered: Vec<char> = value.chars().collect();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == '0' { '1' } else { '0' };
        let tampered: String = tampered.into_iter().collect();

        assert!(store.decrypt_value(&tampered).is_none());
    }
}
