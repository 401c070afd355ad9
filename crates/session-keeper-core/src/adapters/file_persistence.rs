//! # Filesystem Secret Persistence Adapter
//!
//! Stores secret state as a JSON file readable and writable only by the
//! owning user.

use crate::persistence::{PersistedSecretState, PersistenceError, SecretPersistence};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Permission bits applied to the backup file on unix
pub const BACKUP_FILE_MODE: u32 = 0o600;

/// File-backed secret persistence
///
/// Writes go to a temporary sibling file that is renamed over the target,
/// so a crash mid-write never leaves a truncated backup behind.
///
/// # Examples
///
/// ```no_run
/// use session_keeper_core::adapters::FileSecretPersistence;
/// use std::path::PathBuf;
///
/// let persistence = FileSecretPersistence::new(PathBuf::from("./data/session-secrets.json"));
/// ```
#[derive(Debug, Clone)]
pub struct FileSecretPersistence {
    path: PathBuf,
}

impl FileSecretPersistence {
    /// Create persistence for the given file path
    ///
    /// The file and its parent directory are created on first save.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Backup file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            message: format!("{}: {}", action, e),
        }
    }

    #[cfg(unix)]
    async fn restrict_permissions(&self, path: &Path) -> Result<(), PersistenceError> {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, std::fs::Permissions::from_mode(BACKUP_FILE_MODE))
            .await
            .map_err(|e| self.io_error("failed to restrict permissions", e))
    }

    #[cfg(not(unix))]
    async fn restrict_permissions(&self, _path: &Path) -> Result<(), PersistenceError> {
        Ok(())
    }

    #[cfg(unix)]
    async fn check_permissions(&self) -> Result<(), PersistenceError> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error("failed to read metadata", e))?;
        let mode = metadata.permissions().mode() & 0o777;

        if mode & 0o077 != 0 {
            warn!(
                path = %self.path.display(),
                mode = %format!("{:o}", mode),
                "Secret backup is accessible to other users; tightening permissions"
            );
            self.restrict_permissions(&self.path).await?;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    async fn check_permissions(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn create_temp_file(&self, temp_path: &Path) -> Result<fs::File, PersistenceError> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        options.mode(BACKUP_FILE_MODE);

        options
            .open(temp_path)
            .await
            .map_err(|e| self.io_error("failed to create temp file", e))
    }
}

#[async_trait]
impl SecretPersistence for FileSecretPersistence {
    async fn load(&self) -> Result<Option<PersistedSecretState>, PersistenceError> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => Zeroizing::new(json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No secret backup file present");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error("failed to read backup", e)),
        };

        self.check_permissions().await?;

        let state: PersistedSecretState =
            serde_json::from_str(&json).map_err(|e| PersistenceError::Serialization {
                message: format!("Failed to deserialize secret backup: {}", e),
            })?;
        state.validate()?;

        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedSecretState) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error("failed to create directory", e))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map(Zeroizing::new)
            .map_err(|e| PersistenceError::Serialization {
                message: format!("Failed to serialize secret state: {}", e),
            })?;

        // Write to temporary file first (atomic write pattern)
        let temp_path = self.path.with_extension("tmp");
        let mut file = self.create_temp_file(&temp_path).await?;

        file.write_all(json.as_bytes())
            .await
            .map_err(|e| self.io_error("failed to write backup", e))?;
        file.flush()
            .await
            .map_err(|e| self.io_error("failed to flush backup", e))?;
        drop(file);

        // A pre-existing temp file keeps its old mode through open().
        self.restrict_permissions(&temp_path).await?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error("failed to rename temp file", e))?;

        debug!(path = %self.path.display(), "Secret state written to backup");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
#[path = "file_persistence_tests.rs"]
mod tests;
