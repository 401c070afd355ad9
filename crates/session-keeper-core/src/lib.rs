//! # Session-Keeper Core
//!
//! Lifecycle management for the secrets that sign session cookies.
//!
//! This crate owns the only stateful part of session authentication: the set
//! of signing secrets. It generates secrets from the operating system entropy
//! source, rotates them on a schedule, keeps a bounded history of superseded
//! secrets valid for a graceful window, and tells interested components when
//! a rotation happened.
//!
//! ## Architecture
//!
//! - [`SecretStore`] holds `current`, `previous` and the rotation history and
//!   is the single writer of that state.
//! - [`RotationScheduler`] drives [`SecretStore::rotate`] from a timer.
//! - [`SecretValidationGateway`] verifies inbound session cookies against the
//!   valid secret set and re-signs sessions that matched an older secret.
//! - [`NotificationHub`] broadcasts rotation events to registered listeners.
//!
//! Infrastructure (file backup, the cookie codec, the re-sign hook) is
//! injected through traits so the HTTP layer can supply its own.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use session_keeper_core::{NotificationHub, SecretRotationConfig, SecretStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(NotificationHub::new());
//! let store = Arc::new(SecretStore::new(SecretRotationConfig::default(), hub, None)?);
//! let restored = store.initialize().await;
//! assert!(!restored);
//!
//! let rotated = store.rotate().await?;
//! assert!(store.is_valid_secret(rotated.expose_secret()));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Standard result type for session-keeper operations
pub type SessionKeeperResult<T> = Result<T, SessionKeeperError>;

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing `DateTime<Utc>`
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create timestamp from milliseconds since the Unix epoch
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Milliseconds since the Unix epoch
    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Add seconds to timestamp
    ///
    /// Saturates at the latest representable timestamp.
    pub fn add_seconds(&self, seconds: u64) -> Self {
        self.add_duration(Duration::from_secs(seconds))
    }

    /// Add a std duration to timestamp
    ///
    /// Saturates at the latest representable timestamp.
    pub fn add_duration(&self, duration: Duration) -> Self {
        let sum = chrono::TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| self.0.checked_add_signed(delta));
        Self(sum.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Subtract duration from timestamp
    ///
    /// Saturates at the earliest representable timestamp.
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let difference = chrono::TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| self.0.checked_sub_signed(delta));
        Self(difference.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// Get duration since another timestamp
    ///
    /// Saturates to zero when `other` is later than `self`.
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that are logged and retried on the next tick
    Transient,
    /// Failures that will not succeed on retry
    Permanent,
    /// The process cannot continue safely
    Fatal,
    /// Configuration errors preventing startup
    Configuration,
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Top-level error type for session-keeper operations
#[derive(Debug, thiserror::Error)]
pub enum SessionKeeperError {
    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Secret store error: {0}")]
    Store(#[from] SecretStoreError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl SessionKeeperError {
    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Secret(e) if e.is_fatal() => ErrorCategory::Fatal,
            Self::Secret(_) => ErrorCategory::Permanent,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Persistence(_) => ErrorCategory::Transient,
            Self::Store(e) if e.is_fatal() => ErrorCategory::Fatal,
            Self::Store(_) => ErrorCategory::Transient,
            Self::Parse(_) => ErrorCategory::Permanent,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Secret values, generation and redacted previews
pub mod secret;

/// Rotation configuration
pub mod config;

/// Persisted secret state and the persistence interface
pub mod persistence;

/// Rotation event broadcast
pub mod notification;

/// Current/previous/history secret state
pub mod store;

/// Timer-driven rotation
pub mod scheduler;

/// Session cookie verification across the valid secret set
pub mod gateway;

/// Persistence adapters
pub mod adapters;

pub use adapters::{FileSecretPersistence, InMemorySecretPersistence};
pub use config::{ConfigError, SecretRotationConfig};
pub use gateway::{
    GatewayStatistics, HmacCookieSigner, MatchedSecret, ResignError, SecretValidationGateway,
    SessionCookieCodec, SessionResigner, ValidationOutcome, VerificationError,
};
pub use notification::{
    BroadcastReport, ListenerError, ListenerId, NotificationHub, RotationEvent, RotationListener,
};
pub use persistence::{PersistedHistoryEntry, PersistedSecretState, PersistenceError, SecretPersistence};
pub use scheduler::{RotationScheduler, RotationStatus, SchedulerError, SchedulerState};
pub use secret::{
    generate_secret, Secret, SecretError, SecretPreview, SecretValue, DEFAULT_SECRET_BYTES,
};
pub use store::{
    HistoryEntry, HistoryPreview, SecretStatistics, SecretStore, SecretStoreError,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
