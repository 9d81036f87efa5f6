//! A single open file of the block-device VFS.
//!
//! Files whose open flags carry one of the database storage roles are
//! sector-encrypted; everything else passes through to the OS unchanged.
//! Every OS-level failure is logged and degraded to an empty/no-op/zero
//! result — the consuming SQL engine turns the degradation into its own
//! error reporting. A handle that failed to open stays usable; all of its
//! operations are no-ops.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coffer_common::product;
use coffer_crypto::{BlockDeviceCipher, BLOCK_SALT_LENGTH};
use coffer_keystore::KeyStore;

use crate::flags::*;

/// Sector size used when the caller does not override it.
pub const DEFAULT_SECTOR_SIZE: usize = 4096;

/// Storage roles whose files are encrypted. The role flag doubles as the
/// per-file salt input, so two files of the same role share a keystream
/// salt while distinct roles never do.
const ENCRYPTED_ROLES: [u32; 8] = [
    SQLITE_OPEN_MAIN_DB,
    SQLITE_OPEN_MAIN_JOURNAL,
    SQLITE_OPEN_TEMP_DB,
    SQLITE_OPEN_TEMP_JOURNAL,
    SQLITE_OPEN_TRANSIENT_DB,
    SQLITE_OPEN_SUBJOURNAL,
    SQLITE_OPEN_SUPER_JOURNAL,
    SQLITE_OPEN_WAL,
];

/// An open VFS file bound to an OS file, a role salt and the key store.
pub struct VfsFile {
    key_store: Arc<KeyStore>,
    file_path: PathBuf,
    file: Option<File>,
    is_encrypted: bool,
    salt: [u8; BLOCK_SALT_LENGTH],
    sector_size: usize,
    remove_on_close: bool,
}

impl VfsFile {
    /// Open `file_path` for the SQL engine.
    ///
    /// # Panics
    /// Panics for the MEMORY and AUTOPROXY roles, which this VFS does not
    /// serve.
    pub(crate) fn open(
        key_store: Arc<KeyStore>,
        file_path: &Path,
        sqlite_flags: u32,
        sector_size: usize,
    ) -> Self {
        assert!(
            sqlite_flags & SQLITE_OPEN_MEMORY == 0,
            "in-memory databases are not served by this VFS"
        );
        assert!(
            sqlite_flags & SQLITE_OPEN_AUTOPROXY == 0,
            "auto-proxy files are not served by this VFS"
        );

        let mut options = OpenOptions::new();
        options.read(true);
        if sqlite_flags & SQLITE_OPEN_READWRITE != 0 {
            options.write(true);
        }
        if sqlite_flags & SQLITE_OPEN_CREATE != 0 {
            options.create(true);
        }

        let mut custom_flags = libc::O_CLOEXEC;
        if sqlite_flags & SQLITE_OPEN_EXCLUSIVE != 0 {
            custom_flags |= libc::O_EXCL;
        }
        if sqlite_flags & SQLITE_OPEN_NOFOLLOW != 0 {
            custom_flags |= libc::O_NOFOLLOW;
        }
        options.custom_flags(custom_flags).mode(0o644);

        let (is_encrypted, salt) = match ENCRYPTED_ROLES
            .iter()
            .find(|role| sqlite_flags & **role != 0)
        {
            Some(role) => (true, Self::role_salt(*role)),
            None => (false, [0u8; BLOCK_SALT_LENGTH]),
        };

        tracing::debug!(
            "Opening '{}' in {} mode.",
            file_path.display(),
            if is_encrypted { "ENCRYPTED" } else { "PLAIN" }
        );

        let file = match options.open(file_path) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::error!("Failed to open file '{}'. {}", file_path.display(), e);
                None
            }
        };

        Self {
            key_store,
            file_path: file_path.to_path_buf(),
            file,
            is_encrypted,
            salt,
            sector_size: if sector_size == 0 {
                DEFAULT_SECTOR_SIZE
            } else {
                sector_size
            },
            remove_on_close: sqlite_flags & SQLITE_OPEN_DELETEONCLOSE != 0,
        }
    }

    /// Role flag, little endian, followed by the product tag and zero
    /// padding.
    fn role_salt(role: u32) -> [u8; BLOCK_SALT_LENGTH] {
        let mut salt = [0u8; BLOCK_SALT_LENGTH];
        salt[..4].copy_from_slice(&role.to_le_bytes());
        let name = product::SHORT_NAME.as_bytes();
        let copied = name.len().min(BLOCK_SALT_LENGTH - 4);
        salt[4..4 + copied].copy_from_slice(&name[..copied]);
        salt
    }

    pub fn is_valid(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    pub fn close(&mut self) {
        if self.file.take().is_none() {
            return;
        }
        self.salt = [0u8; BLOCK_SALT_LENGTH];
        if self.remove_on_close {
            if let Err(e) = std::fs::remove_file(&self.file_path) {
                tracing::error!(
                    "Failed to remove file '{}'. {}",
                    self.file_path.display(),
                    e
                );
            }
        }
    }

    /// Read up to `amount` bytes at `offset`.
    ///
    /// Encrypted files read and decrypt each chunk's whole covering sector
    /// and slice out the requested sub-range; a short or missing covering
    /// sector yields a short read, not an error.
    pub fn read(&self, amount: usize, offset: u64) -> Vec<u8> {
        let Some(file) = &self.file else {
            return Vec::new();
        };

        if !self.is_encrypted {
            return match read_at_most(file, amount, offset) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(
                        "Failed to read file (offset={}, amount={}). {}",
                        offset,
                        amount,
                        e
                    );
                    Vec::new()
                }
            };
        }

        let key = self.key_store.derive_block_device_key();
        let sector_size = self.sector_size as u64;

        let mut result = Vec::with_capacity(amount);
        let mut sector_offset = (offset / sector_size) * sector_size;
        let mut chunk_offset = (offset - sector_offset) as usize;
        let mut remaining = amount;

        while remaining > 0 {
            let chunk_size = remaining.min(self.sector_size - chunk_offset);
            let sector_index = sector_offset / sector_size;

            let sector_data = match read_at_most(file, self.sector_size, sector_offset) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(
                        "Failed to read file (offset={}, amount={}). {}",
                        offset,
                        amount,
                        e
                    );
                    return Vec::new();
                }
            };
            if sector_data.len() != self.sector_size {
                break;
            }

            let plaintext =
                BlockDeviceCipher::transform(&key, sector_index, &self.salt, &sector_data);
            result.extend_from_slice(&plaintext[chunk_offset..chunk_offset + chunk_size]);

            remaining -= chunk_size;
            sector_offset += sector_size;
            chunk_offset = 0;
        }
        result
    }

    /// Write `data` at `offset`.
    ///
    /// Encrypted files are written a whole sector at a time: a chunk that
    /// covers its sector is encrypted directly, anything smaller is spliced
    /// into the decrypted existing sector first. A short existing sector is
    /// never trusted as a merge base.
    pub fn write(&self, data: &[u8], offset: u64) {
        let Some(file) = &self.file else {
            return;
        };

        if !self.is_encrypted {
            if let Err(e) = file.write_all_at(data, offset) {
                tracing::error!(
                    "Failed to write file (offset={}, amount={}). {}",
                    offset,
                    data.len(),
                    e
                );
            }
            return;
        }

        let key = self.key_store.derive_block_device_key();
        let sector_size = self.sector_size as u64;

        let mut sector_offset = (offset / sector_size) * sector_size;
        let mut chunk_offset = (offset - sector_offset) as usize;
        let mut data_offset = 0usize;

        while data_offset < data.len() {
            let chunk_size = (data.len() - data_offset).min(self.sector_size - chunk_offset);
            let sector_index = sector_offset / sector_size;

            let mut sector_data = if chunk_size == self.sector_size {
                // The chunk replaces the sector entirely; reading it back
                // first would be wasted work.
                vec![0u8; self.sector_size]
            } else {
                match read_at_most(file, self.sector_size, sector_offset) {
                    Ok(existing) if existing.len() == self.sector_size => {
                        BlockDeviceCipher::transform(&key, sector_index, &self.salt, &existing)
                    }
                    Ok(existing) => {
                        if !existing.is_empty() {
                            tracing::warn!(
                                "Partial read of sector {} (offset {}), data was ignored.",
                                sector_index,
                                sector_index * sector_size
                            );
                        }
                        vec![0u8; self.sector_size]
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to write file (offset={}, amount={}). {}",
                            offset,
                            data.len(),
                            e
                        );
                        return;
                    }
                }
            };

            sector_data[chunk_offset..chunk_offset + chunk_size]
                .copy_from_slice(&data[data_offset..data_offset + chunk_size]);

            let ciphertext =
                BlockDeviceCipher::transform(&key, sector_index, &self.salt, &sector_data);
            if let Err(e) = file.write_all_at(&ciphertext, sector_offset) {
                tracing::error!(
                    "Failed to write file (offset={}, amount={}). {}",
                    offset,
                    data.len(),
                    e
                );
                return;
            }

            data_offset += chunk_size;
            sector_offset += sector_size;
            chunk_offset = 0;
        }
    }

    pub fn truncate(&self, size: u64) {
        let Some(file) = &self.file else {
            return;
        };
        if let Err(e) = file.set_len(size) {
            tracing::error!("Failed to truncate file to size {}. {}", size, e);
        }
    }

    pub fn sync(&self, _flags: u32) {
        let Some(file) = &self.file else {
            return;
        };
        if let Err(e) = file.sync_all() {
            tracing::error!("Failed to sync file. {}", e);
        }
    }

    pub fn file_size(&self) -> u64 {
        let Some(file) = &self.file else {
            return 0;
        };
        match file.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::error!("Failed to get size of file. {}", e);
                0
            }
        }
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn device_characteristics(&self) -> u32 {
        SQLITE_IOCAP_ATOMIC4K
    }
}

impl Drop for VfsFile {
    fn drop(&mut self) {
        self.close();
    }
}

/// Positioned read that retries interruptions and stops at end of file.
fn read_at_most(file: &File, amount: usize, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut data = vec![0u8; amount];
    let mut filled = 0usize;
    while filled < amount {
        match file.read_at(&mut data[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    data.truncate(filled);
    Ok(data)
}
