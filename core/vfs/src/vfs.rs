//! The virtual file system handed to the embedded SQL engine.
//!
//! One instance serves every file the engine opens. The key store is
//! injected at construction and passed on to each file, which derives the
//! sector encryption key from it per operation.

use std::path::Path;
use std::sync::Arc;

use coffer_keystore::KeyStore;

use crate::file::VfsFile;

pub struct Vfs {
    key_store: Arc<KeyStore>,
}

impl Vfs {
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self { key_store }
    }

    /// Open a file for the SQL engine. The returned handle is valid until
    /// [`Vfs::close`]; a failed open yields a handle whose operations are
    /// no-ops.
    pub fn open(&self, file_name: impl AsRef<Path>, sqlite_flags: u32) -> VfsFile {
        VfsFile::open(self.key_store.clone(), file_name.as_ref(), sqlite_flags, 0)
    }

    pub fn close(&self, file: &mut VfsFile) {
        file.close();
    }

    pub fn read(&self, file: &VfsFile, amount: usize, offset: u64) -> Vec<u8> {
        file.read(amount, offset)
    }

    pub fn write(&self, file: &VfsFile, data: &[u8], offset: u64) {
        file.write(data, offset)
    }

    pub fn truncate(&self, file: &VfsFile, size: u64) {
        file.truncate(size)
    }

    pub fn sync(&self, file: &VfsFile, flags: u32) {
        file.sync(flags)
    }

    pub fn file_size(&self, file: &VfsFile) -> u64 {
        file.file_size()
    }

    pub fn sector_size(&self, file: &VfsFile) -> usize {
        file.sector_size()
    }

    pub fn device_characteristics(&self, file: &VfsFile) -> u32 {
        file.device_characteristics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::*;
    use coffer_keystore::Config;
    use tempfile::TempDir;

    #[test]
    fn test_vfs_delegates_to_file() {
        let temp = TempDir::new().unwrap();
        let config = Arc::new(Config::new(temp.path().join("config.json")));
        let key_store = Arc::new(KeyStore::new(config));
        assert!(key_store.create("password"));
        key_store.open("password").unwrap();

        let vfs = Vfs::new(key_store);
        let mut file = vfs.open(
            temp.path().join("wallet.db"),
            SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE | SQLITE_OPEN_MAIN_DB,
        );

        vfs.write(&file, &vec![9u8; 4096], 0);
        assert_eq!(vfs.read(&file, 4096, 0), vec![9u8; 4096]);
        assert_eq!(vfs.file_size(&file), 4096);
        vfs.sync(&file, 0);
        vfs.truncate(&file, 0);
        assert_eq!(vfs.file_size(&file), 0);
        assert_eq!(vfs.sector_size(&file), 4096);
        assert_eq!(vfs.device_characteristics(&file), SQLITE_IOCAP_ATOMIC4K);
        vfs.close(&mut file);
        assert!(!file.is_valid());
    }
}
