//! Key hierarchy helpers using HKDF-SHA256.
//!
//! From the single Argon2-derived master key we derive two independent
//! sub-keys: the AES cipher key that encrypts the vault payload and the
//! HMAC key that authenticates the blob envelope.  HKDF (RFC 5869) uses
//! the master key as input keying material and a context string (`info`)
//! to produce domain-separated keys.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

/// Length of derived sub-keys (256 bits).
const KEY_LEN: usize = 32;

/// Derive the vault cipher key from the master key.
pub fn derive_cipher_key(master_key: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(master_key, b"shardvault:cipher")
}

/// Derive the envelope HMAC key from the master key.
///
/// This key authenticates the blob header + ciphertext so tampering is
/// detected before decryption is even attempted.
pub fn derive_mac_key(master_key: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(master_key, b"shardvault:mac")
}

/// Internal helper: run HKDF-SHA256 expand with the given `info`.
///
/// The extract step is skipped and the master key used directly as the
/// pseudo-random key, because it already has full entropy (it came out of
/// Argon2id).
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A wrapper around the 32-byte master key that zeroes its memory when
/// dropped, so the key cannot linger after the operation that needed it.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Derive the vault cipher key from this master key.
    pub fn derive_cipher_key(&self) -> Result<[u8; KEY_LEN]> {
        derive_cipher_key(&self.bytes)
    }

    /// Derive the envelope HMAC key from this master key.
    pub fn derive_mac_key(&self) -> Result<[u8; KEY_LEN]> {
        derive_mac_key(&self.bytes)
    }
}
