//! Threshold secret sharing of encrypted vault blobs.
//!
//! An encrypted blob can be split into N shards over GF(256) Shamir
//! sharing such that any M of them reconstruct the blob byte-for-byte
//! and fewer than M reveal nothing about it.  The field arithmetic comes
//! from the `sharks` crate; this module adds shard metadata, a binary
//! envelope, and strict validation of incoming shard sets.
//!
//! Reconstruction only guarantees correct algebra for a consistent input
//! set.  Authenticity is layered outside: a blob rebuilt from shards of
//! mixed splits fails the envelope HMAC / AES-GCM check downstream.

use std::collections::HashSet;

use sharks::{Share, Sharks};

use crate::errors::{Result, VaultError};

/// Magic bytes at the start of every encoded shard.
const MAGIC: &[u8; 4] = b"SVSH";

/// Fixed-size prefix: 4 (magic) + 1 (blob version) + 1 (index) +
/// 1 (threshold) + 1 (total).
const PREFIX_LEN: usize = 8;

/// How a vault should be split when persisted as shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardingConfig {
    /// Total number of shards to produce (N).
    pub total: u8,
    /// Minimum number of shards needed to reconstruct (M).
    pub threshold: u8,
}

impl ShardingConfig {
    pub fn new(total: u8, threshold: u8) -> Result<Self> {
        validate_params(total, threshold)?;
        Ok(Self { total, threshold })
    }
}

/// One of N fragments of an encrypted blob.
///
/// A single shard is computationally indistinguishable from random data
/// relative to the original blob whenever fewer than `threshold` shards
/// are available.  The metadata (index, threshold, total, parent blob
/// version) is not secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// 1-based share index (the x-coordinate of the share).
    pub index: u8,
    /// Reconstruction threshold M this shard was produced with.
    pub threshold: u8,
    /// Total shard count N this shard was produced with.
    pub total: u8,
    /// Format version of the parent encrypted blob.
    pub blob_version: u8,
    /// Raw share bytes as serialized by `sharks` (x-coordinate followed
    /// by one y-value per blob byte).
    pub payload: Vec<u8>,
}

impl Shard {
    /// Encode this shard into its binary envelope.
    ///
    /// Layout: `[SVSH][blob_version][index][threshold][total][payload]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREFIX_LEN + self.payload.len());
        buf.extend_from_slice(MAGIC);
        buf.push(self.blob_version);
        buf.push(self.index);
        buf.push(self.threshold);
        buf.push(self.total);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a shard from its binary envelope.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() <= PREFIX_LEN {
            return Err(VaultError::InvalidShard(
                "shard data too short to contain a payload".into(),
            ));
        }
        if &data[0..4] != MAGIC {
            return Err(VaultError::InvalidShard(
                "missing SVSH magic bytes".into(),
            ));
        }

        let shard = Self {
            blob_version: data[4],
            index: data[5],
            threshold: data[6],
            total: data[7],
            payload: data[PREFIX_LEN..].to_vec(),
        };

        if shard.index == 0 || shard.threshold == 0 {
            return Err(VaultError::InvalidShard(
                "shard index and threshold must be at least 1".into(),
            ));
        }
        if shard.threshold > shard.total || shard.index > shard.total {
            return Err(VaultError::InvalidShard(format!(
                "inconsistent shard metadata: index {} / threshold {} / total {}",
                shard.index, shard.threshold, shard.total
            )));
        }

        Ok(shard)
    }
}

/// Split a blob into `total` shards with reconstruction threshold
/// `threshold`.
///
/// Requires `1 <= threshold <= total` (the `u8` parameters cap the share
/// count at 255, the size of the underlying field).  Each call draws
/// fresh random polynomial coefficients, so two splits of the same blob
/// produce unlinkable shard sets.
///
/// `blob_version` is carried in every shard so a reader knows which blob
/// format to expect after reconstruction.
pub fn split(blob: &[u8], total: u8, threshold: u8, blob_version: u8) -> Result<Vec<Shard>> {
    validate_params(total, threshold)?;
    if blob.is_empty() {
        return Err(VaultError::InvalidShard("cannot split an empty blob".into()));
    }

    let sharks = Sharks(threshold);
    let dealer = sharks.dealer(blob);

    let shards: Vec<Shard> = dealer
        .take(total as usize)
        .enumerate()
        .map(|(i, share)| Shard {
            index: (i + 1) as u8,
            threshold,
            total,
            blob_version,
            payload: (&share).into(),
        })
        .collect();

    Ok(shards)
}

/// Reconstruct the original blob from at least `threshold` shards.
///
/// The shard set must be internally consistent: identical (threshold,
/// total, blob version) metadata, distinct indices, and equal payload
/// lengths.  Duplicate indices or fewer than `threshold` distinct shards
/// are rejected before any interpolation happens — never a best-effort
/// result.
pub fn reconstruct(shards: &[Shard]) -> Result<Vec<u8>> {
    let first = shards
        .first()
        .ok_or_else(|| VaultError::InvalidShard("no shards provided".into()))?;

    let mut seen = HashSet::new();
    for shard in shards {
        if shard.threshold != first.threshold
            || shard.total != first.total
            || shard.blob_version != first.blob_version
        {
            return Err(VaultError::InvalidShard(
                "shards carry mismatched split metadata".into(),
            ));
        }
        if shard.payload.len() != first.payload.len() {
            return Err(VaultError::InvalidShard(
                "shards carry payloads of different lengths".into(),
            ));
        }
        // The serialized share embeds its x-coordinate as the first byte;
        // it must agree with the envelope index.
        if shard.payload.first() != Some(&shard.index) {
            return Err(VaultError::InvalidShard(format!(
                "shard {} payload does not match its index",
                shard.index
            )));
        }
        if !seen.insert(shard.index) {
            return Err(VaultError::InvalidShard(format!(
                "duplicate shard index {}",
                shard.index
            )));
        }
    }

    if seen.len() < first.threshold as usize {
        return Err(VaultError::InvalidShard(format!(
            "need at least {} distinct shards, got {}",
            first.threshold,
            seen.len()
        )));
    }

    let shares: Vec<Share> = shards
        .iter()
        .map(|s| {
            Share::try_from(s.payload.as_slice())
                .map_err(|e| VaultError::InvalidShard(format!("malformed shard payload: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let sharks = Sharks(first.threshold);
    let blob = sharks
        .recover(&shares)
        .map_err(|e| VaultError::InvalidShard(format!("reconstruction failed: {e}")))?;

    Ok(blob)
}

fn validate_params(total: u8, threshold: u8) -> Result<()> {
    if threshold == 0 {
        return Err(VaultError::InvalidShard(
            "threshold must be at least 1".into(),
        ));
    }
    if total == 0 {
        return Err(VaultError::InvalidShard(
            "total shard count must be at least 1".into(),
        ));
    }
    if threshold > total {
        return Err(VaultError::InvalidShard(format!(
            "threshold {threshold} exceeds total shard count {total}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_envelope_roundtrip() {
        let shard = Shard {
            index: 3,
            threshold: 2,
            total: 5,
            blob_version: 1,
            payload: vec![3, 0xDE, 0xAD, 0xBE, 0xEF],
        };

        let bytes = shard.to_bytes();
        let decoded = Shard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, shard);
    }

    #[test]
    fn from_bytes_rejects_bad_magic() {
        let mut bytes = Shard {
            index: 1,
            threshold: 1,
            total: 1,
            blob_version: 1,
            payload: vec![1, 2, 3],
        }
        .to_bytes();
        bytes[0] = b'X';

        let result = Shard::from_bytes(&bytes);
        assert!(matches!(result, Err(VaultError::InvalidShard(_))));
    }

    #[test]
    fn from_bytes_rejects_truncated_data() {
        let result = Shard::from_bytes(b"SVSH");
        assert!(matches!(result, Err(VaultError::InvalidShard(_))));
    }

    #[test]
    fn from_bytes_rejects_zero_index() {
        let bytes = [b'S', b'V', b'S', b'H', 1, 0, 2, 3, 0xAA, 0xBB];
        let result = Shard::from_bytes(&bytes);
        assert!(matches!(result, Err(VaultError::InvalidShard(_))));
    }

    #[test]
    fn from_bytes_rejects_threshold_above_total() {
        let bytes = [b'S', b'V', b'S', b'H', 1, 1, 4, 3, 0xAA, 0xBB];
        let result = Shard::from_bytes(&bytes);
        assert!(matches!(result, Err(VaultError::InvalidShard(_))));
    }

    #[test]
    fn split_rejects_bad_params() {
        let blob = b"payload";
        assert!(split(blob, 3, 0, 1).is_err()); // threshold < 1
        assert!(split(blob, 0, 1, 1).is_err()); // total < 1
        assert!(split(blob, 3, 4, 1).is_err()); // threshold > total
    }

    #[test]
    fn split_rejects_empty_blob() {
        assert!(split(b"", 3, 2, 1).is_err());
    }

    #[test]
    fn sharding_config_validates() {
        assert!(ShardingConfig::new(5, 3).is_ok());
        assert!(ShardingConfig::new(3, 5).is_err());
        assert!(ShardingConfig::new(5, 0).is_err());
    }
}
