//! Integration tests for AccessGuard wiring into vault unlocks.

use chrono::Timelike;
use shardvault::crypto::KdfParams;
use shardvault::errors::VaultError;
use shardvault::guard::{AccessGuard, AccessPolicy, DenyReason};
use shardvault::shard::ShardingConfig;
use shardvault::vault::VaultStore;
use tempfile::TempDir;

/// Fast-but-valid KDF params so tests don't burn CPU on Argon2.
fn test_params() -> KdfParams {
    KdfParams {
        memory_kib: 8_192,
        iterations: 1,
        parallelism: 1,
    }
}

/// A policy whose allowed window is guaranteed not to contain the
/// current hour, whatever time the test runs at.
fn closed_window_policy() -> AccessPolicy {
    let hour = chrono::Utc::now().hour();
    AccessPolicy {
        allowed_hours: Some(((hour + 2) % 24, (hour + 3) % 24)),
        ..AccessPolicy::default()
    }
}

#[test]
fn denied_unlock_never_touches_the_vault() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("guarded.vault");

    let mut store = VaultStore::create(&path, b"pw", Some(&test_params())).unwrap();
    store.set_entry("example.com", "alice", "s3cr3t").unwrap();
    store.save().unwrap();

    let mut guard = AccessGuard::new(closed_window_policy());

    // Correct passphrase, valid vault — still denied.
    let result = VaultStore::open_with_guard(&path, b"pw", &mut guard);
    assert!(matches!(
        result,
        Err(VaultError::PolicyDenied(DenyReason::OutsideWindow))
    ));
}

#[test]
fn denial_happens_before_any_file_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.vault");

    let mut guard = AccessGuard::new(closed_window_policy());

    // The vault does not exist, but the policy check comes first — so
    // the caller sees the denial, not a not-found error.
    let result = VaultStore::open_with_guard(&path, b"pw", &mut guard);
    assert!(matches!(result, Err(VaultError::PolicyDenied(_))));
}

#[test]
fn repeated_failures_trip_the_rate_limit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("limited.vault");

    let mut store = VaultStore::create(&path, b"right-pw", Some(&test_params())).unwrap();
    store.set_entry("example.com", "alice", "s3cr3t").unwrap();
    store.save().unwrap();

    let mut guard = AccessGuard::new(AccessPolicy {
        allowed_hours: None,
        max_attempts: 2,
        attempt_window_secs: 300,
    });

    // Two wrong guesses pass the gate and fail at the crypto layer.
    for _ in 0..2 {
        let result = VaultStore::open_with_guard(&path, b"wrong-pw", &mut guard);
        assert!(matches!(result, Err(VaultError::UnlockFailed)));
    }

    // Third attempt is blocked by policy, even with the right passphrase.
    let result = VaultStore::open_with_guard(&path, b"right-pw", &mut guard);
    assert!(matches!(
        result,
        Err(VaultError::PolicyDenied(DenyReason::TooManyAttempts))
    ));
}

#[test]
fn successful_unlock_resets_the_counter() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reset.vault");

    let mut store = VaultStore::create(&path, b"pw", Some(&test_params())).unwrap();
    store.set_entry("example.com", "alice", "s3cr3t").unwrap();
    store.save().unwrap();

    let mut guard = AccessGuard::new(AccessPolicy {
        allowed_hours: None,
        max_attempts: 3,
        attempt_window_secs: 300,
    });

    let _ = VaultStore::open_with_guard(&path, b"wrong", &mut guard);
    assert_eq!(guard.attempt_count(), 1);

    let opened = VaultStore::open_with_guard(&path, b"pw", &mut guard);
    assert!(opened.is_ok());
    assert_eq!(guard.attempt_count(), 0, "success clears the counter");
}

#[test]
fn guard_also_gates_sharded_unlocks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sharded.vault");

    let mut store = VaultStore::create(&path, b"pw", Some(&test_params())).unwrap();
    store.set_entry("example.com", "alice", "s3cr3t").unwrap();
    store
        .save_sharded(ShardingConfig::new(5, 3).unwrap())
        .unwrap();
    let shard_paths = store.shard_paths().unwrap();

    let mut guard = AccessGuard::new(closed_window_policy());
    let result = VaultStore::open_shards_with_guard(&shard_paths[0..3], b"pw", &mut guard);
    assert!(matches!(result, Err(VaultError::PolicyDenied(_))));

    // With an open policy the same shards unlock fine.
    let mut open_guard = AccessGuard::new(AccessPolicy::default());
    let reopened =
        VaultStore::open_shards_with_guard(&shard_paths[0..3], b"pw", &mut open_guard).unwrap();
    assert_eq!(reopened.get_entry("example.com").unwrap().secret, "s3cr3t");
}
