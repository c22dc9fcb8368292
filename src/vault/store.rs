//! High-level vault operations.
//!
//! `VaultStore` ties the blob format, the crypto layer, and the shard
//! codec together so callers can work with simple method calls like
//! `store.set_entry("example.com", "alice", "s3cr3t")`.
//!
//! A `VaultStore` value only exists unlocked: `create` and the `open*`
//! constructors either hand back a fully usable store or an error, and
//! dropping the store wipes the master key and all plaintext entries.
//! `save` re-encrypts the entire entry set and replaces the persisted
//! state atomically — the old blob (or shard set) survives any failed
//! save untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::encryption::{decrypt, encrypt};
use crate::crypto::kdf::{derive_master_key_with_params, generate_salt, KdfParams};
use crate::crypto::keys::MasterKey;
use crate::errors::{Result, VaultError};
use crate::guard::{AccessGuard, Decision};
use crate::shard::{self, Shard, ShardingConfig};

use super::blob::{self, BlobHeader, CURRENT_VERSION};
use super::entry::{CredentialEntry, EntryMetadata};

/// The main vault handle.  Create one with `VaultStore::create` or one of
/// the `open*` constructors, then use its methods to manage entries.
pub struct VaultStore {
    /// Path to the `.vault` blob on disk (or the base path the shard
    /// files are named after, when sharded).
    path: PathBuf,

    /// Header metadata (version, salt, KDF params, creation time).
    header: BlobHeader,

    /// In-memory ordered map of entry id -> plaintext entry.
    entries: BTreeMap<String, CredentialEntry>,

    /// The derived master key (zeroized on drop).
    master_key: MasterKey,

    /// How this vault is persisted: `None` for a single blob file,
    /// `Some` for a shard set.
    sharding: Option<ShardingConfig>,
}

impl VaultStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a brand-new vault at `path`.
    ///
    /// Generates a random salt, derives the master key from the
    /// passphrase, and writes an empty encrypted vault to disk.
    ///
    /// Pass `None` for `kdf_params` to use the defaults.
    pub fn create(path: &Path, passphrase: &[u8], kdf_params: Option<&KdfParams>) -> Result<Self> {
        if path.exists() {
            return Err(VaultError::VaultAlreadyExists(path.to_path_buf()));
        }

        let salt = generate_salt();
        let effective_params = kdf_params.copied().unwrap_or_default();

        let mut master_bytes =
            derive_master_key_with_params(passphrase, &salt, &effective_params)?;
        let master_key = MasterKey::new(master_bytes);
        master_bytes.zeroize();

        let header = BlobHeader {
            version: CURRENT_VERSION,
            salt: salt.to_vec(),
            created_at: Utc::now(),
            kdf_params: effective_params.into(),
        };

        let mut store = Self {
            path: path.to_path_buf(),
            header,
            entries: BTreeMap::new(),
            master_key,
            sharding: None,
        };

        store.save()?;

        Ok(store)
    }

    /// Open an existing single-blob vault.
    ///
    /// Reads the blob, re-derives the master key from the passphrase and
    /// the salt + KDF params embedded in the header, verifies the HMAC
    /// over the original bytes, then decrypts and deserializes.  Every
    /// failure past the structural decode collapses into `UnlockFailed`
    /// so the caller learns nothing about which stage rejected it.
    pub fn open(path: &Path, passphrase: &[u8]) -> Result<Self> {
        if !path.exists() {
            return Err(VaultError::VaultNotFound(path.to_path_buf()));
        }

        let data = fs::read(path)?;
        Self::unlock(path.to_path_buf(), &data, passphrase, None)
    }

    /// Open a vault, consulting an `AccessGuard` first.
    ///
    /// On `Deny` the blob is never read and decryption is never
    /// attempted.  A successful unlock resets the guard's counter.
    pub fn open_with_guard(
        path: &Path,
        passphrase: &[u8],
        guard: &mut AccessGuard,
    ) -> Result<Self> {
        if let Decision::Deny(reason) = guard.check() {
            return Err(VaultError::PolicyDenied(reason));
        }

        let store = Self::open(path, passphrase)?;
        guard.reset();
        Ok(store)
    }

    /// Open a vault persisted as a shard set.
    ///
    /// Reads the given shard files, reconstructs the encrypted blob from
    /// them, then unlocks it like `open`.  Reconstruction failures are
    /// part of the unlock path and collapse into `UnlockFailed`.
    pub fn open_shards(shard_paths: &[PathBuf], passphrase: &[u8]) -> Result<Self> {
        let first_path = shard_paths
            .first()
            .ok_or_else(|| VaultError::InvalidShard("no shard files given".into()))?;

        let mut shards = Vec::with_capacity(shard_paths.len());
        for p in shard_paths {
            if !p.exists() {
                return Err(VaultError::VaultNotFound(p.clone()));
            }
            let data = fs::read(p)?;
            let shard = Shard::from_bytes(&data).map_err(|_| VaultError::UnlockFailed)?;
            shards.push(shard);
        }

        let config = ShardingConfig {
            total: shards[0].total,
            threshold: shards[0].threshold,
        };

        let blob_bytes = shard::reconstruct(&shards).map_err(|_| VaultError::UnlockFailed)?;

        let base = base_path_from_shard(first_path);
        Self::unlock(base, &blob_bytes, passphrase, Some(config))
    }

    /// Open a sharded vault, consulting an `AccessGuard` first.
    pub fn open_shards_with_guard(
        shard_paths: &[PathBuf],
        passphrase: &[u8],
        guard: &mut AccessGuard,
    ) -> Result<Self> {
        if let Decision::Deny(reason) = guard.check() {
            return Err(VaultError::PolicyDenied(reason));
        }

        let store = Self::open_shards(shard_paths, passphrase)?;
        guard.reset();
        Ok(store)
    }

    /// Shared unlock path for blob bytes from any source.
    fn unlock(
        path: PathBuf,
        data: &[u8],
        passphrase: &[u8],
        sharding: Option<ShardingConfig>,
    ) -> Result<Self> {
        // Structural decode happens first; a buffer that is not a vault
        // blob at all is reported as such — that reveals nothing about
        // the passphrase.
        let raw = blob::decode(data)?;

        // Re-derive the master key using the stored salt and params.
        let params: KdfParams = raw.header.kdf_params.into();
        let mut master_bytes =
            derive_master_key_with_params(passphrase, &raw.header.salt, &params)
                .map_err(|_| VaultError::UnlockFailed)?;
        let master_key = MasterKey::new(master_bytes);
        master_bytes.zeroize();

        // Verify the HMAC over the *original* header + ciphertext bytes
        // before touching the ciphertext.
        let mut mac_key = master_key.derive_mac_key().map_err(|_| VaultError::UnlockFailed)?;
        let verified = blob::verify_mac(&mac_key, &raw.header_bytes, &raw.ciphertext, &raw.stored_mac);
        mac_key.zeroize();
        verified.map_err(|_| VaultError::UnlockFailed)?;

        // Decrypt and deserialize the entry set.
        let mut cipher_key = master_key
            .derive_cipher_key()
            .map_err(|_| VaultError::UnlockFailed)?;
        let plaintext = decrypt(&cipher_key, &raw.ciphertext);
        cipher_key.zeroize();
        let plaintext = Zeroizing::new(plaintext.map_err(|_| VaultError::UnlockFailed)?);

        let entry_list: Vec<CredentialEntry> =
            serde_json::from_slice(&plaintext).map_err(|_| VaultError::UnlockFailed)?;

        let entries: BTreeMap<String, CredentialEntry> = entry_list
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        Ok(Self {
            path,
            header: raw.header,
            entries,
            master_key,
            sharding,
        })
    }

    // ------------------------------------------------------------------
    // Entry operations
    // ------------------------------------------------------------------

    /// Add or update an entry.
    ///
    /// Updating an existing id preserves its original `created_at`.
    /// Nothing touches the disk until `save` is called.
    pub fn set_entry(&mut self, id: &str, username: &str, secret: &str) -> Result<()> {
        Self::validate_entry_id(id)?;

        let now = Utc::now();
        let created_at = self
            .entries
            .get(id)
            .map_or(now, |existing| existing.created_at);

        let entry = CredentialEntry {
            id: id.to_string(),
            username: username.to_string(),
            secret: secret.to_string(),
            created_at,
            updated_at: now,
        };

        self.entries.insert(id.to_string(), entry);
        Ok(())
    }

    /// Look up an entry by id.
    pub fn get_entry(&self, id: &str) -> Result<&CredentialEntry> {
        Self::validate_entry_id(id)?;
        self.entries
            .get(id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))
    }

    /// Remove an entry from the vault.
    pub fn delete_entry(&mut self, id: &str) -> Result<()> {
        Self::validate_entry_id(id)?;
        if self.entries.remove(id).is_none() {
            return Err(VaultError::EntryNotFound(id.to_string()));
        }
        Ok(())
    }

    /// List metadata for all entries, ordered by id.
    pub fn list_entries(&self) -> Vec<EntryMetadata> {
        self.entries
            .values()
            .map(|e| EntryMetadata {
                id: e.id.clone(),
                username: e.username.clone(),
                created_at: e.created_at,
                updated_at: e.updated_at,
            })
            .collect()
    }

    /// Returns `true` if the vault contains an entry with the given id.
    pub fn contains_entry(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the number of entries in the vault.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    // ------------------------------------------------------------------
    // Sealing
    // ------------------------------------------------------------------

    /// Serialize and encrypt the current entry set into a blob.
    ///
    /// Pure in-memory operation: the storage layer (local file, shard
    /// set, or an external transport) decides where the bytes go.
    pub fn seal(&self) -> Result<Vec<u8>> {
        let entry_list: Vec<&CredentialEntry> = self.entries.values().collect();
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&entry_list)
                .map_err(|e| VaultError::Serialization(format!("entries: {e}")))?,
        );

        let mut cipher_key = self.master_key.derive_cipher_key()?;
        let ciphertext = encrypt(&cipher_key, &plaintext);
        cipher_key.zeroize();
        let ciphertext = ciphertext?;

        let mut mac_key = self.master_key.derive_mac_key()?;
        let encoded = blob::encode(&self.header, &ciphertext, &mac_key);
        mac_key.zeroize();

        encoded
    }

    /// Seal the current entry set and split the blob into shards.
    ///
    /// Does not persist anything; see `save_sharded` for that.
    pub fn seal_shards(&self, config: &ShardingConfig) -> Result<Vec<Shard>> {
        let blob_bytes = self.seal()?;
        shard::split(&blob_bytes, config.total, config.threshold, CURRENT_VERSION)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Seal the vault and write it to disk atomically.
    ///
    /// Holds an exclusive lock file for the duration of the write; a
    /// concurrent `save` against the same vault gets `StateConflict`
    /// instead of silently racing.  A vault that was opened from shards
    /// is written back as a shard set, otherwise as a single blob file.
    pub fn save(&mut self) -> Result<()> {
        let encoded = self.seal()?;
        let _lock = SaveLock::acquire(&self.path)?;

        match self.sharding {
            Some(config) => self.write_shard_set(&encoded, &config)?,
            None => {
                write_atomic(&self.path, &encoded)?;
                // A vault that used to be sharded leaves no stale shards
                // behind.
                prune_shard_files(&self.path, 0)?;
            }
        }

        Ok(())
    }

    /// Switch the vault to sharded persistence and save.
    ///
    /// Subsequent `save` calls keep writing the shard set.
    pub fn save_sharded(&mut self, config: ShardingConfig) -> Result<()> {
        self.sharding = Some(config);
        self.save()
    }

    /// Write a full shard set, replacing any previous one.
    ///
    /// All shard files are written to temp names first and renamed into
    /// place only after every write succeeded, then stale higher-index
    /// shards from a previous wider split are removed, along with any
    /// single-blob file this vault had before it was sharded.
    fn write_shard_set(&self, blob_bytes: &[u8], config: &ShardingConfig) -> Result<()> {
        let shards = shard::split(blob_bytes, config.total, config.threshold, CURRENT_VERSION)?;

        let parent = self.path.parent().unwrap_or(Path::new("."));
        let name = self
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        // Stage every shard before renaming any of them.
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(shards.len());
        for s in &shards {
            let final_path = shard_file_path(&self.path, s.index);
            let tmp_path = parent.join(format!(".{name}.shard-{}.tmp", s.index));
            if let Err(e) = fs::write(&tmp_path, s.to_bytes()) {
                for (tmp, _) in &staged {
                    let _ = fs::remove_file(tmp);
                }
                let _ = fs::remove_file(&tmp_path);
                return Err(e.into());
            }
            staged.push((tmp_path, final_path));
        }

        for (tmp, final_path) in staged {
            fs::rename(tmp, final_path)?;
        }

        prune_shard_files(&self.path, config.total)?;

        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the path of the vault blob (or shard base path).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the vault creation timestamp.
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.header.created_at
    }

    /// Returns the sharding configuration, if this vault persists as a
    /// shard set.
    pub fn sharding(&self) -> Option<ShardingConfig> {
        self.sharding
    }

    /// Paths of the shard files this vault writes when sharded.
    pub fn shard_paths(&self) -> Option<Vec<PathBuf>> {
        self.sharding.map(|config| {
            (1..=config.total)
                .map(|i| shard_file_path(&self.path, i))
                .collect()
        })
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validate that an entry id is safe to use as a lookup key.
    ///
    /// Allowed: ASCII letters, digits, underscores, hyphens, periods.
    /// Must be non-empty and at most 256 characters.
    fn validate_entry_id(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(VaultError::InvalidEntryId("id cannot be empty".into()));
        }
        if id.len() > 256 {
            return Err(VaultError::InvalidEntryId(
                "id cannot exceed 256 characters".into(),
            ));
        }
        if !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
        {
            return Err(VaultError::InvalidEntryId(format!(
                "id '{id}' contains invalid characters — only ASCII letters, digits, underscores, hyphens, and periods are allowed"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persistence helpers
// ---------------------------------------------------------------------------

/// Exclusive writer lock, backed by a sibling lock file.
///
/// `create_new` is atomic at the filesystem level: exactly one writer
/// can hold the lock, a second one gets `StateConflict`.  The lock file
/// is removed when the guard drops.
struct SaveLock {
    path: PathBuf,
}

impl SaveLock {
    fn acquire(vault_path: &Path) -> Result<Self> {
        let parent = vault_path.parent().unwrap_or(Path::new("."));
        let name = vault_path.file_name().unwrap_or_default().to_string_lossy();
        let path = parent.join(format!(".{name}.lock"));

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(VaultError::StateConflict(
                format!("lock file {} already held", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for SaveLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Write a file atomically: temp file in the same directory, then rename.
///
/// The rename ensures readers never see a half-written blob.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Path of shard `index` for a vault at `vault_path`:
/// `creds.vault` -> `creds.vault.shard-3`.
fn shard_file_path(vault_path: &Path, index: u8) -> PathBuf {
    let parent = vault_path.parent().unwrap_or(Path::new("."));
    let name = vault_path.file_name().unwrap_or_default().to_string_lossy();
    parent.join(format!("{name}.shard-{index}"))
}

/// Recover the base vault path from one of its shard files:
/// `creds.vault.shard-3` -> `creds.vault`.  Falls back to the given path
/// when the name does not follow the shard naming scheme.
fn base_path_from_shard(shard_path: &Path) -> PathBuf {
    let parent = shard_path.parent().unwrap_or(Path::new("."));
    let name = shard_path.file_name().unwrap_or_default().to_string_lossy();
    match name.rsplit_once(".shard-") {
        Some((base, _)) => parent.join(base),
        None => shard_path.to_path_buf(),
    }
}

/// Remove shard files with an index above `keep_up_to` (0 removes all).
fn prune_shard_files(vault_path: &Path, keep_up_to: u8) -> Result<()> {
    let parent = vault_path.parent().unwrap_or(Path::new("."));
    let name = vault_path.file_name().unwrap_or_default().to_string_lossy();
    let prefix = format!("{name}.shard-");

    if !parent.exists() {
        return Ok(());
    }

    for dir_entry in fs::read_dir(parent)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(suffix) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        if let Ok(index) = suffix.parse::<u8>() {
            if index > keep_up_to {
                fs::remove_file(dir_entry.path())?;
            }
        }
    }

    Ok(())
}
