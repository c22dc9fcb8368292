//! Encrypted blob format and HMAC integrity verification.
//!
//! A sealed vault is a single self-describing byte buffer:
//!
//! ```text
//! [SVLT: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][nonce || ciphertext + tag][HMAC-SHA256: 32 bytes]
//! ```
//!
//! - **Magic** (`SVLT`): identifies the buffer as a ShardVault blob.
//! - **Version**: format version (currently `1`).
//! - **Header length**: little-endian u32 telling us where the header
//!   JSON ends and the ciphertext begins.
//! - **Header JSON**: serialized `BlobHeader` — salt, KDF parameters,
//!   creation time.  Everything needed to re-derive the key, so a blob
//!   can be decrypted with no external configuration state.
//! - **Ciphertext**: AES-256-GCM output with its nonce prepended.
//! - **HMAC-SHA256**: 32-byte tag over header + ciphertext bytes, keyed
//!   with an HKDF-derived MAC key, verified before decryption.
//!
//! This module works on bytes only.  Where those bytes live — local
//! file, remote object store, shard set — is the storage layer's
//! business, not ours.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::kdf::KdfParams;
use crate::errors::{Result, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every blob.
const MAGIC: &[u8; 4] = b"SVLT";

/// Current blob format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the HMAC tag appended to the blob (SHA-256 = 32 bytes).
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// BlobHeader
// ---------------------------------------------------------------------------

/// Argon2 parameters stored in the blob header so the exact same KDF
/// settings are used when re-opening.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoredKdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<KdfParams> for StoredKdfParams {
    fn from(p: KdfParams) -> Self {
        Self {
            memory_kib: p.memory_kib,
            iterations: p.iterations,
            parallelism: p.parallelism,
        }
    }
}

impl From<StoredKdfParams> for KdfParams {
    fn from(p: StoredKdfParams) -> Self {
        Self {
            memory_kib: p.memory_kib,
            iterations: p.iterations,
            parallelism: p.parallelism,
        }
    }
}

/// Metadata stored at the beginning of a blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHeader {
    /// Format version.
    pub version: u8,

    /// The salt used for Argon2id key derivation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// When this vault was first created.
    pub created_at: DateTime<Utc>,

    /// KDF params used at vault creation (stored so open uses the same).
    pub kdf_params: StoredKdfParams,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Encode a blob from its parts.
///
/// 1. Serialize the header to JSON.
/// 2. Compute HMAC over header + ciphertext bytes.
/// 3. Assemble `[prefix][header][ciphertext][hmac]`.
pub fn encode(header: &BlobHeader, ciphertext: &[u8], mac_key: &[u8]) -> Result<Vec<u8>> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| VaultError::Serialization(format!("header: {e}")))?;

    let mac_tag = compute_mac(mac_key, &header_bytes, ciphertext)?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        VaultError::Serialization(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;
    let total = PREFIX_LEN + header_bytes.len() + ciphertext.len() + HMAC_LEN;
    let mut buf = Vec::with_capacity(total);

    buf.extend_from_slice(MAGIC); // 4 bytes
    buf.push(CURRENT_VERSION); // 1 byte
    buf.extend_from_slice(&header_len.to_le_bytes()); // 4 bytes LE
    buf.extend_from_slice(&header_bytes); // header JSON
    buf.extend_from_slice(ciphertext); // nonce || ciphertext + tag
    buf.extend_from_slice(&mac_tag); // 32 bytes

    Ok(buf)
}

/// Parts of a decoded blob **with raw bytes preserved**.
///
/// Keeping the original bytes lets the HMAC be verified over exactly
/// what was decoded — no re-serialization round trip.
pub struct RawBlob {
    pub header: BlobHeader,
    /// The raw header JSON bytes exactly as encoded.
    pub header_bytes: Vec<u8>,
    /// The nonce-prefixed ciphertext section.
    pub ciphertext: Vec<u8>,
    /// The HMAC tag stored at the end of the blob.
    pub stored_mac: Vec<u8>,
}

/// Decode a blob into its parts.
///
/// The caller must verify the HMAC over `header_bytes` and `ciphertext`
/// before trusting anything, and only then decrypt.
pub fn decode(data: &[u8]) -> Result<RawBlob> {
    // Minimum size: prefix + HMAC.
    let min_size = PREFIX_LEN + HMAC_LEN;
    if data.len() < min_size {
        return Err(VaultError::InvalidFormat(
            "blob too small to be a valid vault".into(),
        ));
    }

    // --- Parse the fixed-size prefix ---

    if &data[0..4] != MAGIC {
        return Err(VaultError::InvalidFormat(
            "missing SVLT magic bytes".into(),
        ));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(VaultError::InvalidFormat(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| VaultError::InvalidFormat("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32).map_err(|_| {
        VaultError::InvalidFormat(format!(
            "header length {header_len_u32} exceeds platform address space"
        ))
    })?;

    let header_end = PREFIX_LEN + header_len;
    if header_end + HMAC_LEN > data.len() {
        return Err(VaultError::InvalidFormat(
            "header length exceeds blob size".into(),
        ));
    }

    // --- Extract the variable-length sections as raw bytes ---

    let header_bytes = data[PREFIX_LEN..header_end].to_vec();
    let ciphertext_end = data.len() - HMAC_LEN;
    let ciphertext = data[header_end..ciphertext_end].to_vec();
    let stored_mac = data[ciphertext_end..].to_vec();

    let header: BlobHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| VaultError::InvalidFormat(format!("header JSON: {e}")))?;

    Ok(RawBlob {
        header,
        header_bytes,
        ciphertext,
        stored_mac,
    })
}

/// Compute HMAC-SHA256 over header + ciphertext bytes.
pub fn compute_mac(mac_key: &[u8], header_bytes: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(ciphertext);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify the HMAC using constant-time comparison.
///
/// `hmac::Mac::verify_slice` is guaranteed constant-time, so the check
/// leaks nothing through timing.  A mismatch is an opaque
/// `AuthenticationFailed` — no distinction between a wrong key and a
/// tampered blob.
pub fn verify_mac(
    mac_key: &[u8],
    header_bytes: &[u8],
    ciphertext: &[u8],
    expected_mac: &[u8],
) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|_| VaultError::AuthenticationFailed)?;

    mac.update(header_bytes);
    mac.update(ciphertext);

    mac.verify_slice(expected_mac)
        .map_err(|_| VaultError::AuthenticationFailed)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
