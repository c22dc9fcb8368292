//! Credential entry types stored inside a vault.
//!
//! Entries only ever exist in plaintext inside an unlocked vault's
//! memory; on disk they are part of one opaque encrypted payload.
//! Secret material is wiped when an entry is dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A single credential stored in the vault.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    /// Identifier, unique within a vault (e.g. "example.com").
    pub id: String,

    /// Account name for the service.
    pub username: String,

    /// The secret value (password, token, ...).
    pub secret: String,

    /// When this entry was first created.
    pub created_at: DateTime<Utc>,

    /// When this entry was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Drop for CredentialEntry {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.username.zeroize();
    }
}

// Manual Debug so a stray `{:?}` can never leak the secret value.
impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Lightweight metadata about an entry (no secret value).
///
/// Returned by `VaultStore::list_entries` so callers can display entries
/// without handling secret material.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
