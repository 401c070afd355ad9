//! # Persistence Module
//!
//! Serialized form of the secret state and the interface used to back it up.
//!
//! The on-disk layout is a single JSON object:
//!
//! ```json
//! {
//!   "currentSecret": "…",
//!   "previousSecret": "…",
//!   "secretHistory": [{ "secret": "…", "timestamp": 1714566600000, "rotatedAt": "2024-05-01T12:30:00+00:00" }],
//!   "lastUpdated": "2024-05-01T12:30:00+00:00"
//! }
//! ```

use crate::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Persisted secret state
///
/// Contains raw secret values. Never log this type; its `Debug` output is
/// redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSecretState {
    /// Secret signing new sessions
    pub current_secret: String,

    /// Secret superseded by the most recent rotation
    #[serde(default)]
    pub previous_secret: Option<String>,

    /// Older secrets, newest first
    #[serde(default)]
    pub secret_history: Vec<PersistedHistoryEntry>,

    /// When the state was written
    pub last_updated: Timestamp,
}

/// Persisted history entry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHistoryEntry {
    /// Raw secret value
    pub secret: String,

    /// Rotation time as milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Rotation time as an RFC3339 timestamp
    pub rotated_at: Timestamp,
}

impl PersistedSecretState {
    /// Check structural validity of loaded state
    ///
    /// # Errors
    /// Returns [`PersistenceError::Corrupt`] if `currentSecret` is empty or a
    /// history entry carries an empty secret.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.current_secret.is_empty() {
            return Err(PersistenceError::Corrupt {
                message: "currentSecret is empty".to_string(),
            });
        }

        if self.previous_secret.as_deref() == Some("") {
            return Err(PersistenceError::Corrupt {
                message: "previousSecret is empty".to_string(),
            });
        }

        if let Some(index) = self.secret_history.iter().position(|e| e.secret.is_empty()) {
            return Err(PersistenceError::Corrupt {
                message: format!("secretHistory[{}] has an empty secret", index),
            });
        }

        Ok(())
    }
}

impl fmt::Debug for PersistedSecretState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSecretState")
            .field("current_secret", &"[REDACTED]")
            .field(
                "previous_secret",
                &self.previous_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("secret_history_len", &self.secret_history.len())
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

impl fmt::Debug for PersistedHistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedHistoryEntry")
            .field("secret", &"[REDACTED]")
            .field("rotated_at", &self.rotated_at)
            .finish()
    }
}

impl Drop for PersistedSecretState {
    fn drop(&mut self) {
        self.current_secret.zeroize();
        if let Some(previous) = self.previous_secret.as_mut() {
            previous.zeroize();
        }
    }
}

impl Drop for PersistedHistoryEntry {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

// ============================================================================
// Interface Traits
// ============================================================================

/// Interface for storing secret state outside process memory
///
/// Implementations must protect the stored data from disclosure; the file
/// adapter restricts the backup to owner read/write.
#[async_trait]
pub trait SecretPersistence: Send + Sync {
    /// Load previously saved state
    ///
    /// Returns `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<PersistedSecretState>, PersistenceError>;

    /// Save state, replacing anything stored before
    async fn save(&self, state: &PersistedSecretState) -> Result<(), PersistenceError>;

    /// Short description of the backing location for logs
    fn describe(&self) -> String;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading or saving secret state
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O failure on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("Persisted state is corrupt: {message}")]
    Corrupt { message: String },
}

impl PersistenceError {
    /// Check if the failure may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Io { .. })
    }
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;
