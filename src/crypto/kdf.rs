//! Passphrase-based key derivation using Argon2id.
//!
//! Argon2id is a memory-hard KDF that resists GPU and ASIC brute force.
//! Parameters are configurable via `KdfParams` (loaded from
//! `.shardvault.toml` or sensible defaults) and are stored in the blob
//! header so a vault can always be re-derived with the exact settings it
//! was sealed with.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::errors::{Result, VaultError};

/// Length of the salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// Configurable Argon2id parameters.
///
/// The defaults put a single derivation in the hundreds-of-milliseconds
/// range on commodity hardware, which is the point: offline guessing has
/// to pay the same cost per guess.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65 536 = 64 MiB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Minimum safe memory cost in KiB (8 MiB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Derive a 32-byte master key from a passphrase and salt using Argon2id.
///
/// Uses the default parameters (64 MiB, 3 iterations, 4 lanes).  Prefer
/// `derive_master_key_with_params` when the vault header or config carries
/// explicit settings.
pub fn derive_master_key(passphrase: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    derive_master_key_with_params(passphrase, salt, &KdfParams::default())
}

/// Derive a 32-byte master key with explicit Argon2id parameters.
///
/// The same passphrase + salt + params always produce the same key.
/// Parameters below the safety floor are rejected outright — derivation
/// never silently downgrades to weaker settings.
pub fn derive_master_key_with_params(
    passphrase: &[u8],
    salt: &[u8],
    kdf_params: &KdfParams,
) -> Result<[u8; KEY_LEN]> {
    if passphrase.is_empty() {
        return Err(VaultError::KeyDerivation(
            "passphrase must not be empty".into(),
        ));
    }
    if kdf_params.memory_kib < MIN_MEMORY_KIB {
        return Err(VaultError::KeyDerivation(format!(
            "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
            kdf_params.memory_kib
        )));
    }
    if kdf_params.iterations < 1 {
        return Err(VaultError::KeyDerivation(
            "Argon2 iterations must be at least 1".into(),
        ));
    }
    if kdf_params.parallelism < 1 {
        return Err(VaultError::KeyDerivation(
            "Argon2 parallelism must be at least 1".into(),
        ));
    }

    let params = Params::new(
        kdf_params.memory_kib,
        kdf_params.iterations,
        kdf_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivation(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| VaultError::KeyDerivation(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
///
/// A fresh salt is generated per vault and never reused across vaults.
/// Salts are not secret; they are stored in the blob header.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
