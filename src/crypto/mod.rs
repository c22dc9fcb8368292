//! Cryptographic primitives for ShardVault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Argon2id passphrase-based key derivation (`kdf`)
//! - HKDF-based cipher-key and HMAC-key derivation (`keys`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, derive_master_key, ...};
pub use encryption::{decrypt, encrypt};
pub use kdf::{derive_master_key, derive_master_key_with_params, generate_salt, KdfParams};
pub use keys::{derive_cipher_key, derive_mac_key, MasterKey};
