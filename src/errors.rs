use std::path::PathBuf;
use thiserror::Error;

use crate::guard::DenyReason;

/// All errors that can occur in ShardVault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption or tag verification failed.  Deliberately carries no
    /// detail: callers must not be able to distinguish a wrong key from
    /// corrupted data.
    #[error("Authentication failed — wrong key or corrupted data")]
    AuthenticationFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    // --- Unlock path ---
    /// The single error every unlock-path failure collapses into, so a
    /// caller cannot tell which stage of derive → reconstruct → verify →
    /// decrypt rejected the attempt.
    #[error("Unable to unlock vault")]
    UnlockFailed,

    // --- Sharding errors ---
    #[error("Invalid shard set: {0}")]
    InvalidShard(String),

    // --- Policy errors ---
    #[error("Access denied: {0}")]
    PolicyDenied(DenyReason),

    // --- Persistence errors ---
    #[error("Vault is locked by another writer: {0}")]
    StateConflict(String),

    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Invalid vault format: {0}")]
    InvalidFormat(String),

    // --- Entry errors ---
    #[error("Entry '{0}' not found")]
    EntryNotFound(String),

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    Audit(String),
}

/// Convenience type alias for ShardVault results.
pub type Result<T> = std::result::Result<T, VaultError>;
