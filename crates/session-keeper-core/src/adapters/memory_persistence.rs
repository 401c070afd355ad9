//! # In-Memory Secret Persistence
//!
//! Thread-safe in-memory implementation for testing and development.
//! Can be switched into a failing mode to exercise the degraded path.

use crate::persistence::{PersistedSecretState, PersistenceError, SecretPersistence};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, RwLock,
};

/// In-memory secret persistence
///
/// Clones share the same backing slot, so a test can keep a handle while the
/// store owns another.
#[derive(Clone, Default)]
pub struct InMemorySecretPersistence {
    slot: Arc<RwLock<Option<PersistedSecretState>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    save_count: Arc<AtomicUsize>,
}

impl InMemorySecretPersistence {
    /// Create empty persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create persistence pre-populated with state
    pub fn with_state(state: PersistedSecretState) -> Self {
        let persistence = Self::new();
        if let Ok(mut slot) = persistence.slot.write() {
            *slot = Some(state);
        }
        persistence
    }

    /// Make subsequent saves fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent loads fail with an I/O error
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved state
    pub fn stored(&self) -> Option<PersistedSecretState> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    fn poisoned() -> PersistenceError {
        PersistenceError::Io {
            path: "memory".to_string(),
            message: "lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl SecretPersistence for InMemorySecretPersistence {
    async fn load(&self) -> Result<Option<PersistedSecretState>, PersistenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                path: "memory".to_string(),
                message: "simulated read failure".to_string(),
            });
        }

        let slot = self.slot.read().map_err(|_| Self::poisoned())?;
        if let Some(state) = slot.as_ref() {
            state.validate()?;
        }
        Ok(slot.clone())
    }

    async fn save(&self, state: &PersistedSecretState) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                path: "memory".to_string(),
                message: "simulated write failure".to_string(),
            });
        }

        *self.slot.write().map_err(|_| Self::poisoned())? = Some(state.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
