//! Key custody for CoinCoffer.
//!
//! This module provides:
//! - The password-guarded [`KeyStore`] state machine
//! - The persistent configuration store it writes through
//! - Recovery phrase handling and the seed onboarding protocol
//!
//! # Architecture
//! The key store is the only component other layers may call for key
//! material: the UI drives create/open/verify/reset and the seed flows,
//! while the storage layer asks it for per-purpose ciphers and the sector
//! encryption key.

pub mod config;
pub mod material;
pub mod mnemonic;
pub mod seed;
pub mod store;

pub use config::{Config, ConfigKey};
pub use material::KeyIndex;
pub use mnemonic::Mnemonic;
pub use seed::{SeedPhraseGenerator, SeedPhraseRestorer};
pub use store::{KeyStore, KeyStoreError};
