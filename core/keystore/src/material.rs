//! Key purposes and the in-memory key table.
//!
//! The table is keyed by [`KeyIndex`] and is either fully populated for
//! every index or absent as a whole; `Option<KeyMaterial>` at the call site
//! is the only partiality the type system allows. All entries are zeroized
//! on drop.

use rand::{rngs::OsRng, RngCore};
use serde_json::{Map, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

use coffer_common::product;
use coffer_crypto::{KEY_LENGTH, NONCE_LENGTH};

/// Fixed enumeration of key purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIndex {
    /// Sector encryption of the wallet database files.
    WalletDatabase = 0,
    /// Seed and seed-phrase custody.
    Seed = 1,
}

impl KeyIndex {
    pub const ALL: [KeyIndex; 2] = [KeyIndex::WalletDatabase, KeyIndex::Seed];
    pub const COUNT: usize = Self::ALL.len();

    pub fn ordinal(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct KeyEntry {
    key: [u8; KEY_LENGTH],
    nonce: [u8; NONCE_LENGTH],
}

/// Per-purpose `(key, nonce)` pairs, held only in memory while unlocked.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct KeyMaterial {
    entries: [KeyEntry; KeyIndex::COUNT],
}

impl KeyMaterial {
    /// Generate a brand-new table with fresh randomness per index.
    pub fn generate() -> Self {
        Self {
            entries: std::array::from_fn(|_| {
                let mut entry = KeyEntry {
                    key: [0u8; KEY_LENGTH],
                    nonce: [0u8; NONCE_LENGTH],
                };
                OsRng.fill_bytes(&mut entry.key);
                OsRng.fill_bytes(&mut entry.nonce);
                entry
            }),
        }
    }

    pub fn key(&self, index: KeyIndex) -> &[u8; KEY_LENGTH] {
        &self.entries[index.ordinal()].key
    }

    pub fn nonce(&self, index: KeyIndex) -> &[u8; NONCE_LENGTH] {
        &self.entries[index.ordinal()].nonce
    }

    /// Serialize to the canonical secret-blob JSON document:
    /// `{"version": ..., "nonce_<i>": "<hex>", "key_<i>": "<hex>", ...}`.
    pub fn to_secret_blob(&self) -> Vec<u8> {
        let mut value = Map::new();
        value.insert(
            "version".to_string(),
            Value::String(product::VERSION_STRING.to_string()),
        );
        for index in KeyIndex::ALL {
            let i = index.ordinal();
            value.insert(
                format!("nonce_{i}"),
                Value::String(hex::encode(self.nonce(index))),
            );
            value.insert(
                format!("key_{i}"),
                Value::String(hex::encode(self.key(index))),
            );
        }
        serde_json::to_vec(&Value::Object(value)).expect("secret blob serialization cannot fail")
    }

    /// Parse a secret-blob document. Unknown fields are ignored; a blob
    /// missing any key or nonce, or naming an index out of range, is
    /// rejected whole.
    pub fn from_secret_blob(blob: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(blob).ok()?;
        let object = value.as_object()?;

        let mut keys: [Option<[u8; KEY_LENGTH]>; KeyIndex::COUNT] = [None; KeyIndex::COUNT];
        let mut nonces: [Option<[u8; NONCE_LENGTH]>; KeyIndex::COUNT] = [None; KeyIndex::COUNT];

        for (name, field) in object {
            if let Some(ordinal) = name.strip_prefix("nonce_") {
                let ordinal: usize = ordinal.parse().ok()?;
                let slot = nonces.get_mut(ordinal)?;
                *slot = Some(decode_fixed(field)?);
            } else if let Some(ordinal) = name.strip_prefix("key_") {
                let ordinal: usize = ordinal.parse().ok()?;
                let slot = keys.get_mut(ordinal)?;
                *slot = Some(decode_fixed(field)?);
            }
        }

        let mut entries = Vec::with_capacity(KeyIndex::COUNT);
        for i in 0..KeyIndex::COUNT {
            entries.push(KeyEntry {
                key: keys[i].take()?,
                nonce: nonces[i].take()?,
            });
        }
        let entries: [KeyEntry; KeyIndex::COUNT] = match entries.try_into() {
            Ok(entries) => entries,
            Err(_) => return None,
        };

        Some(Self { entries })
    }
}

fn decode_fixed<const N: usize>(field: &Value) -> Option<[u8; N]> {
    let bytes = hex::decode(field.as_str()?).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_distinct_per_index() {
        let material = KeyMaterial::generate();
        assert_ne!(
            material.key(KeyIndex::WalletDatabase),
            material.key(KeyIndex::Seed)
        );
        assert_ne!(
            material.nonce(KeyIndex::WalletDatabase),
            material.nonce(KeyIndex::Seed)
        );
    }

    #[test]
    fn test_secret_blob_roundtrip() {
        let material = KeyMaterial::generate();
        let blob = material.to_secret_blob();
        let restored = KeyMaterial::from_secret_blob(&blob).unwrap();

        for index in KeyIndex::ALL {
            assert_eq!(material.key(index), restored.key(index));
            assert_eq!(material.nonce(index), restored.nonce(index));
        }
    }

    #[test]
    fn test_secret_blob_carries_version() {
        let blob = KeyMaterial::generate().to_secret_blob();
        let value: Value = serde_json::from_slice(&blob).unwrap();
        assert_eq!(
            value["version"].as_str().unwrap(),
            product::VERSION_STRING
        );
    }

    #[test]
    fn test_partial_blob_rejected() {
        let blob = serde_json::json!({
            "version": product::VERSION_STRING,
            "nonce_0": hex::encode([0u8; NONCE_LENGTH]),
            "key_0": hex::encode([0u8; KEY_LENGTH]),
            // index 1 missing entirely
        });
        let blob = serde_json::to_vec(&blob).unwrap();
        assert!(KeyMaterial::from_secret_blob(&blob).is_none());
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let blob = serde_json::json!({
            "nonce_0": hex::encode([0u8; NONCE_LENGTH]),
            "key_0": hex::encode([0u8; KEY_LENGTH]),
            "nonce_1": hex::encode([0u8; NONCE_LENGTH]),
            "key_1": hex::encode([0u8; KEY_LENGTH]),
            "key_7": hex::encode([0u8; KEY_LENGTH]),
        });
        let blob = serde_json::to_vec(&blob).unwrap();
        assert!(KeyMaterial::from_secret_blob(&blob).is_none());
    }

    #[test]
    fn test_malformed_blob_rejected() {
        assert!(KeyMaterial::from_secret_blob(b"not json").is_none());
        assert!(KeyMaterial::from_secret_blob(b"[1, 2, 3]").is_none());

        let blob = serde_json::json!({
            "nonce_0": "zz-not-hex",
            "key_0": hex::encode([0u8; KEY_LENGTH]),
            "nonce_1": hex::encode([0u8; NONCE_LENGTH]),
            "key_1": hex::encode([0u8; KEY_LENGTH]),
        });
        let blob = serde_json::to_vec(&blob).unwrap();
        assert!(KeyMaterial::from_secret_blob(&blob).is_none());
    }
}
