//! SQLite OS-interface constants.
//!
//! These values are an ABI contract with the embedded SQL engine and must
//! match its `SQLITE_OPEN_*` / `SQLITE_IOCAP_*` definitions bit-for-bit.

pub const SQLITE_OPEN_READONLY: u32 = 0x0000_0001;
pub const SQLITE_OPEN_READWRITE: u32 = 0x0000_0002;
pub const SQLITE_OPEN_CREATE: u32 = 0x0000_0004;
pub const SQLITE_OPEN_DELETEONCLOSE: u32 = 0x0000_0008;
pub const SQLITE_OPEN_EXCLUSIVE: u32 = 0x0000_0010;
pub const SQLITE_OPEN_AUTOPROXY: u32 = 0x0000_0020;
pub const SQLITE_OPEN_URI: u32 = 0x0000_0040;
pub const SQLITE_OPEN_MEMORY: u32 = 0x0000_0080;

pub const SQLITE_OPEN_MAIN_DB: u32 = 0x0000_0100;
pub const SQLITE_OPEN_TEMP_DB: u32 = 0x0000_0200;
pub const SQLITE_OPEN_TRANSIENT_DB: u32 = 0x0000_0400;
pub const SQLITE_OPEN_MAIN_JOURNAL: u32 = 0x0000_0800;
pub const SQLITE_OPEN_TEMP_JOURNAL: u32 = 0x0000_1000;
pub const SQLITE_OPEN_SUBJOURNAL: u32 = 0x0000_2000;
pub const SQLITE_OPEN_SUPER_JOURNAL: u32 = 0x0000_4000;
pub const SQLITE_OPEN_WAL: u32 = 0x0008_0000;

pub const SQLITE_OPEN_NOMUTEX: u32 = 0x0000_8000;
pub const SQLITE_OPEN_FULLMUTEX: u32 = 0x0001_0000;
pub const SQLITE_OPEN_SHAREDCACHE: u32 = 0x0002_0000;
pub const SQLITE_OPEN_PRIVATECACHE: u32 = 0x0004_0000;
pub const SQLITE_OPEN_NOFOLLOW: u32 = 0x0100_0000;
pub const SQLITE_OPEN_EXRESCODE: u32 = 0x0200_0000;

/// Writes of aligned 4096-byte blocks are atomic.
pub const SQLITE_IOCAP_ATOMIC4K: u32 = 0x0000_0010;
