//! Secret rotation configuration
//!
//! All tunables are enumerated once in [`SecretRotationConfig`] with their
//! defaults. Values can be loaded from environment variables with
//! [`SecretRotationConfig::from_env`]; anything unset keeps its default.

use crate::secret::{SecretValue, DEFAULT_SECRET_BYTES};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

/// Environment variable holding the base (fallback) session secret
pub const ENV_SESSION_SECRET: &str = "SESSION_SECRET";
/// Environment variable for the rotation interval in hours
pub const ENV_ROTATION_INTERVAL_HOURS: &str = "SECRET_ROTATION_INTERVAL_HOURS";
/// Environment variable for the history retention count
pub const ENV_HISTORY_SIZE: &str = "SECRET_HISTORY_SIZE";
/// Environment variable for the graceful window in minutes
pub const ENV_GRACE_PERIOD_MINUTES: &str = "SECRET_GRACE_PERIOD_MINUTES";
/// Environment variable enabling timer-driven rotation
pub const ENV_ENABLE_ROTATION: &str = "ENABLE_SECRET_ROTATION";
/// Environment variable enabling the local file backup
pub const ENV_ENABLE_BACKUP: &str = "ENABLE_SECRET_BACKUP";
/// Environment variable for the backup file location
pub const ENV_BACKUP_PATH: &str = "SECRET_BACKUP_PATH";

/// Minimum accepted length of an operator-provided base secret
pub const MIN_BASE_SECRET_LENGTH: usize = 32;

/// Upper bound on the history retention count
pub const MAX_HISTORY_COUNT: usize = 100;

/// Upper bound on the rotation interval (one year)
pub const MAX_ROTATION_INTERVAL_HOURS: u64 = 365 * 24;

/// Upper bound on the graceful validation window (one year)
pub const MAX_GRACEFUL_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Configuration for secret generation, rotation and backup
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretRotationConfig {
    /// Operator-provided secret used as `current` when no backup is loaded
    #[serde(skip)]
    pub base_secret: Option<SecretValue>,

    /// Hours between scheduled rotations
    pub rotation_interval_hours: u64,

    /// Maximum number of superseded secrets kept in history
    pub history_max_count: usize,

    /// How long a history entry keeps validating sessions after rotation
    pub graceful_window_seconds: u64,

    /// Whether the service starts the rotation timer
    pub auto_rotation_enabled: bool,

    /// Whether secret state is written to a local file
    pub file_backup_enabled: bool,

    /// Location of the backup file
    pub backup_path: PathBuf,

    /// Random bytes per generated secret
    pub secret_bytes: usize,
}

impl Default for SecretRotationConfig {
    fn default() -> Self {
        Self {
            base_secret: None,
            rotation_interval_hours: 24,
            history_max_count: 5,
            graceful_window_seconds: 2 * 60 * 60, // 2 hours
            auto_rotation_enabled: true,
            file_backup_enabled: false,
            backup_path: PathBuf::from(".session-secrets.json"),
            secret_bytes: DEFAULT_SECRET_BYTES,
        }
    }
}

impl fmt::Debug for SecretRotationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRotationConfig")
            .field(
                "base_secret",
                &self.base_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field("rotation_interval_hours", &self.rotation_interval_hours)
            .field("history_max_count", &self.history_max_count)
            .field("graceful_window_seconds", &self.graceful_window_seconds)
            .field("auto_rotation_enabled", &self.auto_rotation_enabled)
            .field("file_backup_enabled", &self.file_backup_enabled)
            .field("backup_path", &self.backup_path)
            .field("secret_bytes", &self.secret_bytes)
            .finish()
    }
}

impl SecretRotationConfig {
    /// Load configuration from environment variables
    ///
    /// Recognised variables:
    /// - `SESSION_SECRET`: base secret
    /// - `SECRET_ROTATION_INTERVAL_HOURS`: rotation interval (default 24)
    /// - `SECRET_HISTORY_SIZE`: history retention count (default 5)
    /// - `SECRET_GRACE_PERIOD_MINUTES`: graceful window (default 120)
    /// - `ENABLE_SECRET_ROTATION`: `true`/`false` (default true)
    /// - `ENABLE_SECRET_BACKUP`: `true`/`false` (default false)
    /// - `SECRET_BACKUP_PATH`: backup file path
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but cannot
    /// be parsed, or when the resulting configuration fails [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(secret) = read_env(ENV_SESSION_SECRET) {
            config.base_secret = Some(SecretValue::from_string(secret));
        }
        if let Some(hours) = parse_env::<u64>(ENV_ROTATION_INTERVAL_HOURS)? {
            config.rotation_interval_hours = hours;
        }
        if let Some(count) = parse_env::<usize>(ENV_HISTORY_SIZE)? {
            config.history_max_count = count;
        }
        if let Some(minutes) = parse_env::<u64>(ENV_GRACE_PERIOD_MINUTES)? {
            config.graceful_window_seconds =
                minutes
                    .checked_mul(60)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: ENV_GRACE_PERIOD_MINUTES.to_string(),
                        message: format!("{} minutes is out of range", minutes),
                    })?;
        }
        if let Some(enabled) = parse_env_flag(ENV_ENABLE_ROTATION)? {
            config.auto_rotation_enabled = enabled;
        }
        if let Some(enabled) = parse_env_flag(ENV_ENABLE_BACKUP)? {
            config.file_backup_enabled = enabled;
        }
        if let Some(path) = read_env(ENV_BACKUP_PATH) {
            config.backup_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_interval_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rotation_interval_hours".to_string(),
                message: "must be at least 1 hour".to_string(),
            });
        }

        if self.rotation_interval_hours > MAX_ROTATION_INTERVAL_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "rotation_interval_hours".to_string(),
                message: format!("must not exceed {} hours", MAX_ROTATION_INTERVAL_HOURS),
            });
        }

        if self.graceful_window_seconds > MAX_GRACEFUL_WINDOW_SECONDS {
            return Err(ConfigError::InvalidValue {
                key: "graceful_window_seconds".to_string(),
                message: format!("must not exceed {} seconds", MAX_GRACEFUL_WINDOW_SECONDS),
            });
        }

        if self.history_max_count > MAX_HISTORY_COUNT {
            return Err(ConfigError::InvalidValue {
                key: "history_max_count".to_string(),
                message: format!("must not exceed {}", MAX_HISTORY_COUNT),
            });
        }

        if self.secret_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "secret_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if let Some(secret) = &self.base_secret {
            if secret.len() < MIN_BASE_SECRET_LENGTH {
                return Err(ConfigError::InvalidValue {
                    key: ENV_SESSION_SECRET.to_string(),
                    message: format!(
                        "must be at least {} characters long",
                        MIN_BASE_SECRET_LENGTH
                    ),
                });
            }
        }

        if self.file_backup_enabled && self.backup_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "backup_path".to_string(),
                message: "required when file backup is enabled".to_string(),
            });
        }

        Ok(())
    }

    /// Rotation interval as a duration
    ///
    /// Saturates for hour counts that [`Self::validate`] would reject.
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_hours.saturating_mul(60 * 60))
    }

    /// Graceful validation window as a duration
    pub fn graceful_window(&self) -> Duration {
        Duration::from_secs(self.graceful_window_seconds)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match read_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}' is not a valid number", raw),
            }),
        None => Ok(None),
    }
}

fn parse_env_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    match read_env(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}' is not a boolean", raw),
            }),
        },
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
