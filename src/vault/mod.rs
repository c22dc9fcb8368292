//! Vault module — encrypted credential storage.
//!
//! This module provides:
//! - `CredentialEntry` and `EntryMetadata` types (`entry`)
//! - Self-describing encrypted blob format with HMAC integrity (`blob`)
//! - High-level `VaultStore` for creating, opening, and managing vaults (`store`)

pub mod blob;
pub mod entry;
pub mod store;

// Re-export the most commonly used items.
pub use blob::{BlobHeader, StoredKdfParams};
pub use entry::{CredentialEntry, EntryMetadata};
pub use store::VaultStore;
