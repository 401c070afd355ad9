//! Tests for filesystem secret persistence

use super::*;
use crate::persistence::PersistedHistoryEntry;
use crate::Timestamp;
use tempfile::TempDir;

fn sample_state() -> PersistedSecretState {
    let now = Timestamp::now();
    PersistedSecretState {
        current_secret: "a".repeat(64),
        previous_secret: Some("b".repeat(64)),
        secret_history: vec![PersistedHistoryEntry {
            secret: "c".repeat(64),
            timestamp: now.unix_millis(),
            rotated_at: now,
        }],
        last_updated: now,
    }
}

#[tokio::test]
async fn test_load_missing_file_returns_none() {
    let dir = TempDir::new().unwrap();
    let persistence = FileSecretPersistence::new(dir.path().join("secrets.json"));

    let loaded = persistence.load().await.unwrap();

    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let persistence = FileSecretPersistence::new(dir.path().join("nested/secrets.json"));
    let state = sample_state();

    persistence.save(&state).await.unwrap();
    let loaded = persistence.load().await.unwrap().unwrap();

    assert_eq!(loaded, state);
    assert!(!dir.path().join("nested/secrets.tmp").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_saved_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    let persistence = FileSecretPersistence::new(path.clone());

    persistence.save(&sample_state()).await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[cfg(unix)]
#[tokio::test]
async fn test_load_tightens_loose_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    let persistence = FileSecretPersistence::new(path.clone());
    persistence.save(&sample_state()).await.unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    persistence.load().await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[tokio::test]
async fn test_load_malformed_json_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    std::fs::write(&path, "{ not json").unwrap();
    let persistence = FileSecretPersistence::new(path);

    let result = persistence.load().await;

    assert!(matches!(result, Err(PersistenceError::Serialization { .. })));
}

#[tokio::test]
async fn test_load_rejects_empty_current_secret() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secrets.json");
    std::fs::write(
        &path,
        r#"{"currentSecret":"","lastUpdated":"2024-05-01T12:30:00Z"}"#,
    )
    .unwrap();
    let persistence = FileSecretPersistence::new(path);

    let result = persistence.load().await;

    assert!(matches!(result, Err(PersistenceError::Corrupt { .. })));
}

#[tokio::test]
async fn test_save_into_unwritable_location_fails() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "file, not a directory").unwrap();
    let persistence = FileSecretPersistence::new(blocker.join("secrets.json"));

    let result = persistence.save(&sample_state()).await;

    assert!(matches!(result, Err(PersistenceError::Io { .. })));
}

#[test]
fn test_describe_names_path() {
    let persistence = FileSecretPersistence::new(PathBuf::from("/var/lib/secrets.json"));

    assert_eq!(persistence.describe(), "file:/var/lib/secrets.json");
}
