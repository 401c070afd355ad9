//! # Secret Module
//!
//! Secret values used to sign session cookies.
//!
//! A secret is an opaque hex string produced from the operating system's
//! cryptographically secure random source. Values are zeroized on drop and
//! never appear in `Debug` output; anything that reports on secrets uses
//! [`SecretPreview`] instead.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Number of random bytes in a default secret (64 hex characters)
pub const DEFAULT_SECRET_BYTES: usize = 32;

/// Number of leading characters shown in a preview
pub const PREVIEW_LENGTH: usize = 8;

// ============================================================================
// Secret Value
// ============================================================================

/// Secure container for secret values
///
/// The backing buffer is zeroized when the value is dropped. Secret values
/// are never included in Debug output or logs.
#[derive(Clone)]
pub struct SecretValue {
    inner: Zeroizing<String>,
}

impl SecretValue {
    /// Create secret value from string
    pub fn from_string(value: String) -> Self {
        Self {
            inner: Zeroizing::new(value),
        }
    }

    /// Get secret as string (only for immediate use)
    ///
    /// # Security Warning
    /// The returned string contains the actual secret value.
    /// Use immediately and avoid storing in variables.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Get secret as bytes
    pub fn expose_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get secret length without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Non-reversible preview suitable for logs and statistics
    pub fn preview(&self) -> SecretPreview {
        SecretPreview::of(&self.inner)
    }

    /// Constant-time comparison against a candidate string
    pub fn matches(&self, candidate: &str) -> bool {
        self.inner.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.expose_secret())
    }
}

impl Eq for SecretValue {}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Secret Preview
// ============================================================================

/// Redacted representation of a secret
///
/// Holds at most the first [`PREVIEW_LENGTH`] characters followed by `...`.
/// Values too short to preview safely are shown as `***`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretPreview(String);

impl SecretPreview {
    fn of(value: &str) -> Self {
        // A preview must hide at least as much as it shows.
        if value.chars().count() < PREVIEW_LENGTH * 2 {
            return Self("***".to_string());
        }

        let head: String = value.chars().take(PREVIEW_LENGTH).collect();
        Self(format!("{}...", head))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Secret
// ============================================================================

/// A signing secret and the moment it was created
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    value: SecretValue,
    created_at: Timestamp,
}

impl Secret {
    /// Wrap an existing value created at `created_at`
    pub fn new(value: SecretValue, created_at: Timestamp) -> Self {
        Self { value, created_at }
    }

    /// Generate a fresh secret of `byte_len` random bytes
    ///
    /// # Errors
    /// Returns [`SecretError::EntropyUnavailable`] if the operating system
    /// random source cannot be read.
    pub fn generate(byte_len: usize) -> Result<Self, SecretError> {
        Ok(Self::new(generate_secret(byte_len)?, Timestamp::now()))
    }

    /// Secret value
    pub fn value(&self) -> &SecretValue {
        &self.value
    }

    /// Creation time
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Redacted preview
    pub fn preview(&self) -> SecretPreview {
        self.value.preview()
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Generate a hex-encoded secret from `byte_len` bytes of OS randomness
///
/// Every call draws fresh bytes from the operating system, so consecutive
/// results are independent. There is no fallback to a non-cryptographic
/// generator: if the OS source fails the error must be treated as fatal.
///
/// # Errors
/// - [`SecretError::InvalidLength`] if `byte_len` is zero
/// - [`SecretError::EntropyUnavailable`] if the OS random source fails
pub fn generate_secret(byte_len: usize) -> Result<SecretValue, SecretError> {
    if byte_len == 0 {
        return Err(SecretError::InvalidLength {
            length: byte_len,
            reason: "secret must contain at least one byte".to_string(),
        });
    }

    let mut bytes = Zeroizing::new(vec![0u8; byte_len]);
    getrandom::getrandom(bytes.as_mut_slice()).map_err(|e| SecretError::EntropyUnavailable {
        message: e.to_string(),
    })?;

    Ok(SecretValue::from_string(hex::encode(bytes.as_slice())))
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while producing or parsing secrets
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecretError {
    #[error("Secure random source unavailable: {message}")]
    EntropyUnavailable { message: String },

    #[error("Invalid secret length {length}: {reason}")]
    InvalidLength { length: usize, reason: String },
}

impl SecretError {
    /// Check if the error leaves the process without a usable secret
    pub fn is_fatal(&self) -> bool {
        matches!(self, SecretError::EntropyUnavailable { .. })
    }
}

#[cfg(test)]
#[path = "secret_tests.rs"]
mod tests;
