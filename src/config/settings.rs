use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};
use crate::guard::AccessPolicy;
use crate::shard::ShardingConfig;

/// Project-level configuration, loaded from `.shardvault.toml`.
///
/// Every field has a sensible default so ShardVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) where vault files are stored.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Argon2 memory cost in KiB (default: 64 MiB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Total shard count N when saving sharded (default: none — vaults
    /// persist as a single blob unless configured otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_total: Option<u8>,

    /// Reconstruction threshold M when saving sharded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_threshold: Option<u8>,

    /// Start of the allowed unlock window (UTC hour, inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_window_start_hour: Option<u32>,

    /// End of the allowed unlock window (UTC hour, exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_window_end_hour: Option<u32>,

    /// Maximum unlock attempts within the rolling interval (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_unlock_attempts: u32,

    /// Length of the rolling attempt interval in seconds (default: 300).
    #[serde(default = "default_attempt_window_secs")]
    pub attempt_window_secs: i64,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> String {
    ".shardvault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MiB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_attempt_window_secs() -> i64 {
    300
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            shard_total: None,
            shard_threshold: None,
            access_window_start_hour: None,
            access_window_end_hour: None,
            max_unlock_attempts: default_max_attempts(),
            attempt_window_secs: default_attempt_window_secs(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".shardvault.toml";

    /// Load settings from `<project_dir>/.shardvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Build the full path to a vault file with a given name.
    ///
    /// Example: `project_dir/.shardvault/personal.vault`
    pub fn vault_path(&self, project_dir: &Path, name: &str) -> PathBuf {
        project_dir
            .join(&self.vault_dir)
            .join(format!("{name}.vault"))
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn kdf_params(&self) -> crate::crypto::kdf::KdfParams {
        crate::crypto::kdf::KdfParams {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    /// The configured sharding, if both knobs are set.
    pub fn sharding(&self) -> Result<Option<ShardingConfig>> {
        match (self.shard_total, self.shard_threshold) {
            (Some(total), Some(threshold)) => Ok(Some(ShardingConfig::new(total, threshold)?)),
            (None, None) => Ok(None),
            _ => Err(VaultError::Config(
                "shard_total and shard_threshold must be set together".into(),
            )),
        }
    }

    /// Convert the access settings into a guard policy.
    pub fn access_policy(&self) -> Result<AccessPolicy> {
        let allowed_hours = match (self.access_window_start_hour, self.access_window_end_hour) {
            (Some(start), Some(end)) => {
                if start > 23 || end > 23 {
                    return Err(VaultError::Config(
                        "access window hours must be in 0..=23".into(),
                    ));
                }
                Some((start, end))
            }
            (None, None) => None,
            _ => {
                return Err(VaultError::Config(
                    "access window start and end hours must be set together".into(),
                ));
            }
        };

        Ok(AccessPolicy {
            allowed_hours,
            max_attempts: self.max_unlock_attempts,
            attempt_window_secs: self.attempt_window_secs,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.vault_dir, ".shardvault");
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.argon2_iterations, 3);
        assert_eq!(s.argon2_parallelism, 4);
        assert_eq!(s.max_unlock_attempts, 5);
        assert_eq!(s.attempt_window_secs, 300);
        assert!(s.sharding().unwrap().is_none());
        assert!(s.access_policy().unwrap().allowed_hours.is_none());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, ".shardvault");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
vault_dir = "secrets"
argon2_memory_kib = 131072
argon2_iterations = 5
argon2_parallelism = 8
shard_total = 5
shard_threshold = 3
access_window_start_hour = 9
access_window_end_hour = 17
max_unlock_attempts = 3
attempt_window_secs = 60
"#;
        fs::write(tmp.path().join(".shardvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, "secrets");
        assert_eq!(settings.argon2_memory_kib, 131_072);
        assert_eq!(settings.argon2_iterations, 5);
        assert_eq!(settings.argon2_parallelism, 8);

        let sharding = settings.sharding().unwrap().unwrap();
        assert_eq!(sharding.total, 5);
        assert_eq!(sharding.threshold, 3);

        let policy = settings.access_policy().unwrap();
        assert_eq!(policy.allowed_hours, Some((9, 17)));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_window_secs, 60);
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let config = "vault_dir = \"vaults\"\n";
        fs::write(tmp.path().join(".shardvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, "vaults");
        // Rest should be defaults
        assert_eq!(settings.argon2_iterations, 3);
        assert!(settings.shard_total.is_none());
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".shardvault.toml"), "not valid {{toml").unwrap();

        let result = Settings::load(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn sharding_requires_both_knobs() {
        let settings = Settings {
            shard_total: Some(5),
            ..Settings::default()
        };
        assert!(settings.sharding().is_err());
    }

    #[test]
    fn sharding_rejects_bad_threshold() {
        let settings = Settings {
            shard_total: Some(3),
            shard_threshold: Some(5),
            ..Settings::default()
        };
        assert!(settings.sharding().is_err());
    }

    #[test]
    fn access_policy_rejects_out_of_range_hours() {
        let settings = Settings {
            access_window_start_hour: Some(9),
            access_window_end_hour: Some(25),
            ..Settings::default()
        };
        assert!(settings.access_policy().is_err());
    }

    #[test]
    fn access_policy_requires_both_hours() {
        let settings = Settings {
            access_window_start_hour: Some(9),
            ..Settings::default()
        };
        assert!(settings.access_policy().is_err());
    }

    #[test]
    fn vault_path_builds_correct_path() {
        let s = Settings::default();
        let project = Path::new("/home/user/myproject");
        let path = s.vault_path(project, "personal");
        assert_eq!(
            path,
            PathBuf::from("/home/user/myproject/.shardvault/personal.vault")
        );
    }

    #[test]
    fn vault_path_respects_custom_vault_dir() {
        let s = Settings {
            vault_dir: "secrets".to_string(),
            ..Settings::default()
        };
        let project = Path::new("/home/user/myproject");
        let path = s.vault_path(project, "work");
        assert_eq!(
            path,
            PathBuf::from("/home/user/myproject/secrets/work.vault")
        );
    }
}
