//! # Secret Store Module
//!
//! Owner of the signing secret state: `current`, `previous` and a bounded,
//! newest-first history of older secrets.
//!
//! ## Validity rules
//!
//! History is trimmed by count and filtered by time, independently:
//!
//! - after every rotation the history keeps at most `history_max_count`
//!   entries, evicting the oldest;
//! - a history entry only validates sessions while it is younger than the
//!   graceful window, even though it stays in history (and in statistics)
//!   until evicted by count.
//!
//! `current` and `previous` are always valid.
//!
//! ## Concurrency
//!
//! Readers take an `Arc` snapshot of the state under a short read lock and
//! never observe a half-applied rotation. Rotations are serialized by an
//! async mutex and swap in a fully built state under the write lock.

use crate::{
    adapters::FileSecretPersistence,
    config::{ConfigError, SecretRotationConfig},
    notification::{NotificationHub, RotationEvent},
    persistence::{PersistedHistoryEntry, PersistedSecretState, SecretPersistence},
    secret::{generate_secret, Secret, SecretError, SecretPreview, SecretValue},
    Timestamp,
};
use serde::Serialize;
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Core Types
// ============================================================================

/// A superseded secret and the moment it was pushed into history
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The superseded secret
    pub secret: Secret,

    /// When the rotation that demoted it into history happened
    pub rotated_at: Timestamp,
}

#[derive(Debug, Clone)]
struct SecretState {
    current: Secret,
    previous: Option<Secret>,
    history: VecDeque<HistoryEntry>,
    rotation_count: u64,
    last_rotation_at: Option<Timestamp>,
}

impl SecretState {
    fn fresh(current: Secret) -> Self {
        Self {
            current,
            previous: None,
            history: VecDeque::new(),
            rotation_count: 0,
            last_rotation_at: None,
        }
    }

    fn from_persisted(persisted: &PersistedSecretState, history_max_count: usize) -> Self {
        let current = Secret::new(
            SecretValue::from_string(persisted.current_secret.clone()),
            persisted.last_updated,
        );
        let previous = persisted.previous_secret.as_ref().map(|value| {
            Secret::new(SecretValue::from_string(value.clone()), persisted.last_updated)
        });
        let history = persisted
            .secret_history
            .iter()
            .take(history_max_count)
            .map(|entry| HistoryEntry {
                secret: Secret::new(
                    SecretValue::from_string(entry.secret.clone()),
                    entry.rotated_at,
                ),
                rotated_at: entry.rotated_at,
            })
            .collect();

        Self {
            current,
            previous,
            history,
            rotation_count: 0,
            last_rotation_at: None,
        }
    }

    fn to_persisted(&self) -> PersistedSecretState {
        PersistedSecretState {
            current_secret: self.current.value().expose_secret().to_string(),
            previous_secret: self
                .previous
                .as_ref()
                .map(|s| s.value().expose_secret().to_string()),
            secret_history: self
                .history
                .iter()
                .map(|entry| PersistedHistoryEntry {
                    secret: entry.secret.value().expose_secret().to_string(),
                    timestamp: entry.rotated_at.unix_millis(),
                    rotated_at: entry.rotated_at,
                })
                .collect(),
            last_updated: Timestamp::now(),
        }
    }
}

/// Redacted view of one history entry
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPreview {
    pub preview: SecretPreview,
    pub rotated_at: Timestamp,
    pub within_graceful_window: bool,
}

/// Redacted statistics for the admin surface
///
/// Contains previews only, never raw secret values.
#[derive(Debug, Clone, Serialize)]
pub struct SecretStatistics {
    /// Preview of the current secret
    pub current_preview: SecretPreview,

    /// When the current secret was created
    pub current_created_at: Timestamp,

    /// Preview of the previous secret, if any
    pub previous_preview: Option<SecretPreview>,

    /// History entries, newest first
    pub history: Vec<HistoryPreview>,

    /// Size of the valid secret set right now
    pub valid_secret_count: usize,

    /// Configured history bound
    pub history_max_count: usize,

    /// Configured graceful window
    pub graceful_window_seconds: u64,

    /// Rotations performed since the store was created
    pub rotation_count: u64,

    /// Most recent rotation
    pub last_rotation_at: Option<Timestamp>,

    /// When the store was created
    pub initialized_at: Timestamp,

    /// Whether state was restored from the backup
    pub loaded_from_backup: bool,

    /// Backup location, if persistence is configured
    pub backup: Option<String>,

    /// When these statistics were collected
    pub collected_at: Timestamp,
}

// ============================================================================
// Secret Store
// ============================================================================

/// Process-wide owner of signing secret state
///
/// Constructed once at startup and shared by reference (`Arc`) with the
/// scheduler, the validation gateway and the HTTP layer.
pub struct SecretStore {
    config: SecretRotationConfig,
    state: RwLock<Arc<SecretState>>,
    rotation_lock: Mutex<()>,
    hub: Arc<NotificationHub>,
    persistence: Option<Arc<dyn SecretPersistence>>,
    initialized_at: Timestamp,
    loaded_from_backup: AtomicBool,
}

impl SecretStore {
    /// Create store with an explicit persistence backend
    ///
    /// `current` is set immediately, from `config.base_secret` when present
    /// or freshly generated otherwise, so the store never exposes an empty
    /// current secret. Call [`Self::initialize`] to restore a backup.
    ///
    /// # Errors
    /// - [`SecretStoreError::Configuration`] if the configuration is invalid
    /// - [`SecretStoreError::Secret`] if no secret can be generated (fatal)
    pub fn new(
        config: SecretRotationConfig,
        hub: Arc<NotificationHub>,
        persistence: Option<Arc<dyn SecretPersistence>>,
    ) -> Result<Self, SecretStoreError> {
        config.validate()?;

        let current = match &config.base_secret {
            Some(base) => Secret::new(base.clone(), Timestamp::now()),
            None => Secret::generate(config.secret_bytes)?,
        };

        Ok(Self {
            config,
            state: RwLock::new(Arc::new(SecretState::fresh(current))),
            rotation_lock: Mutex::new(()),
            hub,
            persistence,
            initialized_at: Timestamp::now(),
            loaded_from_backup: AtomicBool::new(false),
        })
    }

    /// Create store whose persistence follows the configuration
    ///
    /// Uses a [`FileSecretPersistence`] at `config.backup_path` when file
    /// backup is enabled, and no persistence otherwise.
    pub fn from_config(
        config: SecretRotationConfig,
        hub: Arc<NotificationHub>,
    ) -> Result<Self, SecretStoreError> {
        let persistence: Option<Arc<dyn SecretPersistence>> = if config.file_backup_enabled {
            Some(Arc::new(FileSecretPersistence::new(config.backup_path.clone())))
        } else {
            None
        };
        Self::new(config, hub, persistence)
    }

    /// Restore state from the backup, if one is configured and readable
    ///
    /// Returns `true` when the backup was loaded. A missing or unreadable
    /// backup is not an error: the store keeps the secret chosen in
    /// [`Self::new`] and runs memory-only.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> bool {
        let Some(persistence) = &self.persistence else {
            info!("Secret backup disabled; using in-memory secret state");
            return false;
        };

        let _guard = self.rotation_lock.lock().await;

        match persistence.load().await {
            Ok(Some(persisted)) => {
                let restored = SecretState::from_persisted(&persisted, self.config.history_max_count);
                info!(
                    backup = %persistence.describe(),
                    current = %restored.current.preview(),
                    history = restored.history.len(),
                    "Secret state restored from backup"
                );
                self.replace_state(restored);
                self.loaded_from_backup.store(true, Ordering::SeqCst);
                true
            }
            Ok(None) => {
                info!(
                    backup = %persistence.describe(),
                    "No secret backup found; starting with fresh state"
                );
                false
            }
            Err(e) => {
                warn!(
                    operation = "initialize",
                    backup = %persistence.describe(),
                    error = %e,
                    "Failed to load secret backup; continuing with in-memory state"
                );
                false
            }
        }
    }

    /// Rotate now
    ///
    /// See [`Self::rotate_at`].
    pub async fn rotate(&self) -> Result<SecretValue, SecretStoreError> {
        self.rotate_at(Timestamp::now()).await
    }

    /// Rotate, recording `now` as the rotation time
    ///
    /// The old `previous` is pushed onto the front of history stamped with
    /// `now`, the old `current` becomes `previous`, and a freshly generated
    /// secret becomes `current`. History is then trimmed to the configured
    /// count. Listeners are notified and the new state is persisted; a
    /// persistence failure is logged and does not fail the rotation.
    ///
    /// # Errors
    /// Returns [`SecretStoreError::Secret`] if a new secret cannot be
    /// generated. The state is left unchanged in that case.
    #[instrument(skip(self, now), fields(rotated_at = %now))]
    pub async fn rotate_at(&self, now: Timestamp) -> Result<SecretValue, SecretStoreError> {
        let _guard = self.rotation_lock.lock().await;

        let new_secret = Secret::new(generate_secret(self.config.secret_bytes)?, now);

        let (event, next) = {
            let mut slot = self.state.write().unwrap_or_else(|p| p.into_inner());
            let old = Arc::clone(&*slot);

            let mut history = old.history.clone();
            if let Some(previous) = &old.previous {
                history.push_front(HistoryEntry {
                    secret: previous.clone(),
                    rotated_at: now,
                });
            }
            history.truncate(self.config.history_max_count);

            let next = Arc::new(SecretState {
                current: new_secret.clone(),
                previous: Some(old.current.clone()),
                history,
                rotation_count: old.rotation_count + 1,
                last_rotation_at: Some(now),
            });
            *slot = Arc::clone(&next);

            let event = RotationEvent {
                rotated_at: now,
                rotation_count: next.rotation_count,
                current_preview: new_secret.preview(),
                previous_preview: old.current.preview(),
            };
            (event, next)
        };

        info!(
            rotation_count = event.rotation_count,
            current = %event.current_preview,
            previous = %event.previous_preview,
            history = next.history.len(),
            "Session secret rotated"
        );

        self.hub.broadcast_rotated(&event);
        self.persist(&next, "rotate").await;

        Ok(new_secret.value().clone())
    }

    /// Secret used to sign new sessions
    pub fn current_secret(&self) -> SecretValue {
        self.snapshot().current.value().clone()
    }

    /// Secrets that currently validate sessions, `current` first
    pub fn valid_secrets(&self) -> Vec<SecretValue> {
        self.valid_secrets_at(Timestamp::now())
    }

    /// Secrets that validate sessions at time `now`, `current` first
    ///
    /// Contains `current`, `previous` when set, and history entries rotated
    /// less than the graceful window before `now`, without duplicates.
    pub fn valid_secrets_at(&self, now: Timestamp) -> Vec<SecretValue> {
        let state = self.snapshot();
        let window = self.config.graceful_window();

        let candidates = std::iter::once(&state.current)
            .chain(state.previous.iter())
            .chain(
                state
                    .history
                    .iter()
                    .filter(|entry| now.duration_since(entry.rotated_at) < window)
                    .map(|entry| &entry.secret),
            );

        let mut valid: Vec<SecretValue> = Vec::with_capacity(2 + state.history.len());
        for secret in candidates {
            if !valid.iter().any(|v| v == secret.value()) {
                valid.push(secret.value().clone());
            }
        }
        valid
    }

    /// Check whether `candidate` is in the valid secret set
    pub fn is_valid_secret(&self, candidate: &str) -> bool {
        self.valid_secrets()
            .iter()
            .fold(false, |found, secret| found | secret.matches(candidate))
    }

    /// Redacted statistics
    pub fn statistics(&self) -> SecretStatistics {
        let now = Timestamp::now();
        let state = self.snapshot();
        let window = self.config.graceful_window();

        SecretStatistics {
            current_preview: state.current.preview(),
            current_created_at: state.current.created_at(),
            previous_preview: state.previous.as_ref().map(Secret::preview),
            history: state
                .history
                .iter()
                .map(|entry| HistoryPreview {
                    preview: entry.secret.preview(),
                    rotated_at: entry.rotated_at,
                    within_graceful_window: now.duration_since(entry.rotated_at) < window,
                })
                .collect(),
            valid_secret_count: self.valid_secrets_at(now).len(),
            history_max_count: self.config.history_max_count,
            graceful_window_seconds: self.config.graceful_window_seconds,
            rotation_count: state.rotation_count,
            last_rotation_at: state.last_rotation_at,
            initialized_at: self.initialized_at,
            loaded_from_backup: self.loaded_from_backup.load(Ordering::SeqCst),
            backup: self.persistence.as_ref().map(|p| p.describe()),
            collected_at: now,
        }
    }

    /// Current state in persisted form
    ///
    /// Contains raw secret values.
    pub fn export_state(&self) -> PersistedSecretState {
        self.snapshot().to_persisted()
    }

    /// Persist final state and drop all rotation listeners
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _guard = self.rotation_lock.lock().await;
        let state = self.snapshot();
        self.persist(&state, "shutdown").await;
        self.hub.clear();
        info!("Secret store shut down");
    }

    /// Store configuration
    pub fn config(&self) -> &SecretRotationConfig {
        &self.config
    }

    /// Hub notified on every rotation
    pub fn notification_hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Number of rotations performed since creation
    pub fn rotation_count(&self) -> u64 {
        self.snapshot().rotation_count
    }

    fn snapshot(&self) -> Arc<SecretState> {
        let slot = self.state.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&*slot)
    }

    fn replace_state(&self, next: SecretState) {
        let mut slot = self.state.write().unwrap_or_else(|p| p.into_inner());
        *slot = Arc::new(next);
    }

    async fn persist(&self, state: &SecretState, operation: &str) {
        let Some(persistence) = &self.persistence else {
            debug!(operation, "Secret backup disabled; nothing to persist");
            return;
        };

        if let Err(e) = persistence.save(&state.to_persisted()).await {
            error!(
                operation,
                backup = %persistence.describe(),
                error = %e,
                at = %Timestamp::now(),
                "Failed to persist secret state; continuing in memory-only mode"
            );
        }
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.snapshot();
        f.debug_struct("SecretStore")
            .field("current", &state.current.preview())
            .field("has_previous", &state.previous.is_some())
            .field("history_len", &state.history.len())
            .field("rotation_count", &state.rotation_count)
            .finish()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in secret store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecretStoreError {
    #[error("Secret generation failed: {0}")]
    Secret(#[from] SecretError),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}

impl SecretStoreError {
    /// Check if the process cannot continue safely
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Secret(e) => e.is_fatal(),
            Self::Configuration(_) => true,
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
