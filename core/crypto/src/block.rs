//! Length-preserving sector encryption for the block-device VFS.
//!
//! XChaCha20 keystream keyed by the 256-bit block-device key. The 24-byte
//! nonce is the 16-byte per-file salt followed by the little-endian sector
//! index, so every (file role, sector) pair gets its own keystream and a
//! sector ciphertext is exactly as long as the sector. There is no
//! per-sector authentication tag: the logical file size must equal the
//! physical file size, and tampering surfaces as garbage pages in the
//! consuming SQL engine.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;

/// Block-device key length in bytes (256-bit).
pub const BLOCK_KEY_LENGTH: usize = 32;

/// Per-file salt length in bytes.
pub const BLOCK_SALT_LENGTH: usize = 16;

/// XChaCha20 nonce length in bytes.
const NONCE_LENGTH: usize = 24;

/// Keystream transform for one sector. Encrypt and decrypt are the same
/// operation.
pub struct BlockDeviceCipher {
    cipher: XChaCha20,
}

impl BlockDeviceCipher {
    pub fn new(
        key: &[u8; BLOCK_KEY_LENGTH],
        sector_index: u64,
        salt: &[u8; BLOCK_SALT_LENGTH],
    ) -> Self {
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce[..BLOCK_SALT_LENGTH].copy_from_slice(salt);
        nonce[BLOCK_SALT_LENGTH..].copy_from_slice(&sector_index.to_le_bytes());

        Self {
            cipher: XChaCha20::new(key.into(), (&nonce).into()),
        }
    }

    /// XOR the keystream into `data` in place.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }

    /// One-shot transform of a whole sector.
    pub fn transform(
        key: &[u8; BLOCK_KEY_LENGTH],
        sector_index: u64,
        salt: &[u8; BLOCK_SALT_LENGTH],
        data: &[u8],
    ) -> Vec<u8> {
        let mut out = data.to_vec();
        Self::new(key, sector_index, salt).apply_keystream(&mut out);
        out
    }
}
