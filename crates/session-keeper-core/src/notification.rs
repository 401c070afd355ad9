//! # Notification Module
//!
//! In-process broadcast of rotation events.
//!
//! Components that derive state from the signing secret (a cookie issuer
//! holding the current key, a cached verifier) register a
//! [`RotationListener`] with the [`NotificationHub`]. The store calls
//! [`NotificationHub::broadcast_rotated`] right after a rotation completes.
//! Delivery is synchronous and each listener is isolated: one listener
//! failing does not stop the others from being notified.

use crate::{secret::SecretPreview, Timestamp};
use serde::Serialize;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tracing::{debug, warn};

// ============================================================================
// Core Types
// ============================================================================

/// Details of a completed rotation
///
/// Carries previews only; listeners that need the new secret read it from
/// the store.
#[derive(Debug, Clone, Serialize)]
pub struct RotationEvent {
    /// When the rotation happened
    pub rotated_at: Timestamp,

    /// Rotations performed by the store since it was created
    pub rotation_count: u64,

    /// Preview of the new current secret
    pub current_preview: SecretPreview,

    /// Preview of the secret that was current before this rotation
    pub previous_preview: SecretPreview,
}

/// Handle returned by [`NotificationHub::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Listeners that handled the event
    pub delivered: usize,

    /// Listeners whose handler returned an error
    pub failed: usize,
}

// ============================================================================
// Interface Traits
// ============================================================================

/// Receiver of rotation notifications
///
/// Handlers run synchronously on the rotating task and should be quick:
/// swap a cached value, invalidate a cache, or schedule work elsewhere.
pub trait RotationListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Handle a completed rotation
    fn on_secret_rotated(&self, event: &RotationEvent) -> Result<(), ListenerError>;
}

// ============================================================================
// Notification Hub
// ============================================================================

/// Registry of rotation listeners
///
/// Registration and removal are safe at any time, including from another
/// task while a broadcast is running. A broadcast works on a snapshot of the
/// listener list taken when it starts.
#[derive(Default)]
pub struct NotificationHub {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RotationListener>)>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    /// Create hub with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its handle
    pub fn register(&self, listener: Arc<dyn RotationListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let name = listener.name().to_string();

        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((id, listener)),
            Err(poisoned) => poisoned.into_inner().push((id, listener)),
        }

        debug!(listener_id = %id, listener = %name, "Rotation listener registered");
        id
    }

    /// Remove a listener
    ///
    /// Returns `false` if the handle was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };

        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;

        if removed {
            debug!(listener_id = %id, "Rotation listener removed");
        }
        removed
    }

    /// Remove every listener
    pub fn clear(&self) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Deliver a rotation event to every registered listener
    pub fn broadcast_rotated(&self, event: &RotationEvent) -> BroadcastReport {
        let snapshot: Vec<(ListenerId, Arc<dyn RotationListener>)> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut report = BroadcastReport::default();
        for (id, listener) in snapshot {
            match listener.on_secret_rotated(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        listener_id = %id,
                        listener = %listener.name(),
                        rotation_count = event.rotation_count,
                        error = %e,
                        "Rotation listener failed; continuing with remaining listeners"
                    );
                }
            }
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Rotation event broadcast"
        );
        report
    }
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error returned by a listener's handler
#[derive(Debug, Clone, thiserror::Error)]
#[error("Listener '{listener}' failed: {message}")]
pub struct ListenerError {
    pub listener: String,
    pub message: String,
}

impl ListenerError {
    /// Create listener error
    pub fn new(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
