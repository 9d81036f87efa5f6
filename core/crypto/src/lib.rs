//! Cryptographic primitives for CoinCoffer.
//!
//! This module provides:
//! - Authenticated encryption bound to the product tag (AES-128-GCM)
//! - One-shot message encryption with textual framing
//! - Length-preserving sector encryption for the block-device VFS
//! - Password key derivation (BLAKE2b pre-hash + Argon2id) and the
//!   self-describing encrypted-secret codec built on it
//!
//! # Security Guarantees
//! - Derived key material is zeroized on drop
//! - Expected failures (wrong password, tampered or malformed data) are
//!   reported as `None`, never as panics

pub mod block;
pub mod cipher;
pub mod kdf;

pub use block::{BlockDeviceCipher, BLOCK_KEY_LENGTH, BLOCK_SALT_LENGTH};
pub use cipher::{AeadCipher, MessageCipher, SecretError, KEY_LENGTH, NONCE_LENGTH};
pub use kdf::{KeyDerivationFunction, SecretStore, SALT_LENGTH};
