//! # Validation Gateway Module
//!
//! Verifies inbound session cookies against every secret in the valid set.
//!
//! The current secret is tried first. If it fails, the remaining valid
//! secrets are tried in the order [`SecretStore::valid_secrets`] returns
//! them. A match on anything other than the current secret is a fallback
//! match: the gateway re-signs the session under the current secret so later
//! requests take the fast path again. Re-signing is best-effort and never
//! turns a valid session into a failure.
//!
//! Only [`SecretPreview`]s leave this module; raw secrets are never logged.

use crate::{
    secret::{SecretPreview, SecretValue},
    store::SecretStore,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Prefix marking a signed cookie value
pub const SIGNED_COOKIE_PREFIX: &str = "s:";

/// Percent-encoded form of [`SIGNED_COOKIE_PREFIX`] as sent by some clients
const ENCODED_COOKIE_PREFIX: &str = "s%3A";

// ============================================================================
// Interface Traits
// ============================================================================

/// Signs and verifies session cookies with a given secret
pub trait SessionCookieCodec: Send + Sync {
    /// Produce a signed cookie value for `session_id`
    fn sign(&self, session_id: &str, secret: &SecretValue) -> Result<String, VerificationError>;

    /// Verify `cookie` with `secret` and return the session id it carries
    fn verify(&self, cookie: &str, secret: &SecretValue) -> Result<String, VerificationError>;
}

/// Hook that re-saves a session after a fallback match
///
/// Receives the session id and the cookie already re-signed under the
/// current secret.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionResigner: Send + Sync {
    async fn resign(&self, session_id: &str, reissued_cookie: &str) -> Result<(), ResignError>;
}

// ============================================================================
// HMAC Cookie Signer
// ============================================================================

/// HMAC-SHA256 cookie codec
///
/// A signed cookie has the form `s:<session-id>.<signature>` where the
/// signature is the unpadded standard base64 encoding of
/// `HMAC-SHA256(secret, session-id)`. The `s:` prefix is optional on input.
/// Signature comparison is constant time.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacCookieSigner;

impl HmacCookieSigner {
    /// Create signer
    pub fn new() -> Self {
        Self
    }

    fn mac(secret: &SecretValue) -> Result<HmacSha256, VerificationError> {
        HmacSha256::new_from_slice(secret.expose_bytes()).map_err(|_| VerificationError::InvalidKey)
    }
}

impl SessionCookieCodec for HmacCookieSigner {
    fn sign(&self, session_id: &str, secret: &SecretValue) -> Result<String, VerificationError> {
        if session_id.is_empty() {
            return Err(VerificationError::Malformed {
                message: "session id is empty".to_string(),
            });
        }

        let mut mac = Self::mac(secret)?;
        mac.update(session_id.as_bytes());
        let signature = STANDARD_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}{}.{}", SIGNED_COOKIE_PREFIX, session_id, signature))
    }

    fn verify(&self, cookie: &str, secret: &SecretValue) -> Result<String, VerificationError> {
        let body = cookie
            .strip_prefix(SIGNED_COOKIE_PREFIX)
            .or_else(|| cookie.strip_prefix(ENCODED_COOKIE_PREFIX))
            .unwrap_or(cookie);

        let (session_id, signature) =
            body.rsplit_once('.').ok_or_else(|| VerificationError::Malformed {
                message: "cookie has no signature".to_string(),
            })?;

        if session_id.is_empty() {
            return Err(VerificationError::Malformed {
                message: "session id is empty".to_string(),
            });
        }

        let signature = STANDARD_NO_PAD
            .decode(signature.trim_end_matches('='))
            .map_err(|_| VerificationError::Malformed {
                message: "signature is not valid base64".to_string(),
            })?;

        let mut mac = Self::mac(secret)?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| VerificationError::SignatureMismatch)?;

        Ok(session_id.to_string())
    }
}

// ============================================================================
// Validation Results
// ============================================================================

/// Which secret authenticated a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchedSecret {
    /// The current secret
    Current,
    /// A non-current valid secret, by position in the valid set
    Fallback { position: usize },
}

/// Successful validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Session id carried by the cookie
    pub session_id: String,

    /// Secret that verified the cookie
    pub matched: MatchedSecret,

    /// Preview of that secret
    pub matched_preview: SecretPreview,

    /// Whether a non-current secret was needed
    pub used_fallback: bool,

    /// Cookie re-signed under the current secret, after a successful re-sign
    pub reissued_cookie: Option<String>,

    /// Whether re-signing completed
    pub resigned: bool,
}

/// Gateway counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStatistics {
    pub validations: u64,
    pub current_hits: u64,
    pub fallback_hits: u64,
    pub failures: u64,
    pub resign_successes: u64,
    pub resign_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    validations: AtomicU64,
    current_hits: AtomicU64,
    fallback_hits: AtomicU64,
    failures: AtomicU64,
    resign_successes: AtomicU64,
    resign_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// Secret Validation Gateway
// ============================================================================

/// Multi-secret session cookie verification
pub struct SecretValidationGateway {
    store: Arc<SecretStore>,
    codec: Arc<dyn SessionCookieCodec>,
    resigner: Option<Arc<dyn SessionResigner>>,
    counters: Counters,
}

impl SecretValidationGateway {
    /// Create gateway without a re-sign hook
    ///
    /// Fallback matches still produce a reissued cookie for the caller to
    /// send back.
    pub fn new(store: Arc<SecretStore>, codec: Arc<dyn SessionCookieCodec>) -> Self {
        Self {
            store,
            codec,
            resigner: None,
            counters: Counters::default(),
        }
    }

    /// Attach a hook run after every fallback match
    pub fn with_resigner(mut self, resigner: Arc<dyn SessionResigner>) -> Self {
        self.resigner = Some(resigner);
        self
    }

    /// Verify `cookie` against the valid secret set
    ///
    /// # Errors
    /// Returns the error produced by the current-secret attempt when no valid
    /// secret verifies the cookie. A malformed cookie fails immediately.
    #[instrument(skip(self, cookie), fields(cookie_len = cookie.len()))]
    pub async fn validate(&self, cookie: &str) -> Result<ValidationOutcome, VerificationError> {
        bump(&self.counters.validations);

        let candidates = self.store.valid_secrets();
        let Some((current, fallbacks)) = candidates.split_first() else {
            bump(&self.counters.failures);
            return Err(VerificationError::NoValidSecrets);
        };

        let original = match self.codec.verify(cookie, current) {
            Ok(session_id) => {
                bump(&self.counters.current_hits);
                return Ok(ValidationOutcome {
                    session_id,
                    matched: MatchedSecret::Current,
                    matched_preview: current.preview(),
                    used_fallback: false,
                    reissued_cookie: None,
                    resigned: false,
                });
            }
            Err(e) if e.is_secret_independent() => {
                bump(&self.counters.failures);
                debug!(error = %e, "Session cookie rejected before secret checks");
                return Err(e);
            }
            Err(e) => e,
        };

        for (index, secret) in fallbacks.iter().enumerate() {
            if let Ok(session_id) = self.codec.verify(cookie, secret) {
                bump(&self.counters.fallback_hits);
                let position = index + 1;
                info!(
                    position,
                    matched_preview = %secret.preview(),
                    current_preview = %current.preview(),
                    "Session validated with fallback secret"
                );

                let reissued = self.resign(&session_id, current).await;
                return Ok(ValidationOutcome {
                    session_id,
                    matched: MatchedSecret::Fallback { position },
                    matched_preview: secret.preview(),
                    used_fallback: true,
                    resigned: reissued.is_some(),
                    reissued_cookie: reissued,
                });
            }
        }

        bump(&self.counters.failures);
        debug!(
            candidates = candidates.len(),
            error = %original,
            "Session cookie did not verify with any valid secret"
        );
        Err(original)
    }

    /// Sign a new session under the current secret
    pub fn issue(&self, session_id: &str) -> Result<String, VerificationError> {
        self.codec.sign(session_id, &self.store.current_secret())
    }

    /// Counter snapshot
    pub fn statistics(&self) -> GatewayStatistics {
        let c = &self.counters;
        GatewayStatistics {
            validations: c.validations.load(Ordering::Relaxed),
            current_hits: c.current_hits.load(Ordering::Relaxed),
            fallback_hits: c.fallback_hits.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            resign_successes: c.resign_successes.load(Ordering::Relaxed),
            resign_failures: c.resign_failures.load(Ordering::Relaxed),
        }
    }

    /// Store providing the valid secret set
    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    /// Codec used for signing and verification
    pub fn codec(&self) -> &Arc<dyn SessionCookieCodec> {
        &self.codec
    }

    async fn resign(&self, session_id: &str, current: &SecretValue) -> Option<String> {
        let reissued = match self.codec.sign(session_id, current) {
            Ok(cookie) => cookie,
            Err(e) => {
                bump(&self.counters.resign_failures);
                warn!(error = %e, "Failed to re-sign session under current secret");
                return None;
            }
        };

        if let Some(resigner) = &self.resigner {
            if let Err(e) = resigner.resign(session_id, &reissued).await {
                bump(&self.counters.resign_failures);
                warn!(
                    error = %e,
                    "Session re-sign hook failed; continuing with validated session"
                );
                return None;
            }
        }

        bump(&self.counters.resign_successes);
        debug!(current_preview = %current.preview(), "Session re-signed under current secret");
        Some(reissued)
    }
}

impl std::fmt::Debug for SecretValidationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValidationGateway")
            .field("has_resigner", &self.resigner.is_some())
            .field("statistics", &self.statistics())
            .finish()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while verifying a session cookie
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Malformed session cookie: {message}")]
    Malformed { message: String },

    #[error("Session cookie signature does not match")]
    SignatureMismatch,

    #[error("Secret cannot be used as an HMAC key")]
    InvalidKey,

    #[error("No valid secrets available")]
    NoValidSecrets,
}

impl VerificationError {
    /// Check if trying another secret cannot change the result
    pub fn is_secret_independent(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::NoValidSecrets)
    }
}

/// Error returned by a [`SessionResigner`]
#[derive(Debug, Clone, thiserror::Error)]
#[error("Session re-sign failed: {message}")]
pub struct ResignError {
    pub message: String,
}

impl ResignError {
    /// Create re-sign error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
