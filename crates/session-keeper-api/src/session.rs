//! Session cookie issuance and verification for HTTP requests
//!
//! [`CookieIssuer`] signs new sessions with a cached copy of the current
//! secret and refreshes that copy when the store broadcasts a rotation.
//! [`session_auth_middleware`] verifies the inbound cookie through the
//! [`SecretValidationGateway`](session_keeper_core::SecretValidationGateway)
//! and sends a re-signed cookie back when an older secret was needed.

use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use session_keeper_core::{
    ListenerError, RotationEvent, RotationListener, SecretPreview, SecretStore, SecretValue,
    SessionCookieCodec, ValidationOutcome,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock, Weak,
};
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Session Context
// ============================================================================

/// Verified session attached to request extensions
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub session_id: String,
    pub used_fallback: bool,
    pub resigned: bool,
    pub matched_preview: SecretPreview,
}

impl From<&ValidationOutcome> for SessionContext {
    fn from(outcome: &ValidationOutcome) -> Self {
        Self {
            session_id: outcome.session_id.clone(),
            used_fallback: outcome.used_fallback,
            resigned: outcome.resigned,
            matched_preview: outcome.matched_preview.clone(),
        }
    }
}

// ============================================================================
// Cookie Issuer
// ============================================================================

/// Newly issued session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub cookie: String,
}

/// Signs new session cookies under the current secret
///
/// Holds a weak reference to the store; the store's hub holds the issuer,
/// so a strong reference would keep both alive forever.
pub struct CookieIssuer {
    store: Weak<SecretStore>,
    codec: Arc<dyn SessionCookieCodec>,
    signing_secret: RwLock<SecretValue>,
    refreshes: AtomicU64,
}

impl CookieIssuer {
    /// Create issuer bound to `store` and register it for rotation events
    pub fn register(store: &Arc<SecretStore>, codec: Arc<dyn SessionCookieCodec>) -> Arc<Self> {
        let issuer = Arc::new(Self {
            store: Arc::downgrade(store),
            codec,
            signing_secret: RwLock::new(store.current_secret()),
            refreshes: AtomicU64::new(0),
        });

        let id = store.notification_hub().register(issuer.clone());
        debug!(listener_id = %id, "Cookie issuer registered for rotation events");
        issuer
    }

    /// Issue a cookie for a fresh random session id
    #[instrument(skip(self))]
    pub fn issue(&self) -> Result<IssuedSession, ApiError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let cookie = self
            .codec
            .sign(&session_id, &self.read_secret())
            .map_err(|e| ApiError::Internal {
                message: format!("failed to sign session cookie: {}", e),
            })?;

        Ok(IssuedSession { session_id, cookie })
    }

    /// Preview of the secret new cookies are signed with
    pub fn signing_preview(&self) -> SecretPreview {
        self.read_secret().preview()
    }

    /// Number of rotation events handled
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn read_secret(&self) -> SecretValue {
        match self.signing_secret.read() {
            Ok(secret) => secret.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RotationListener for CookieIssuer {
    fn name(&self) -> &str {
        "cookie-issuer"
    }

    fn on_secret_rotated(&self, event: &RotationEvent) -> Result<(), ListenerError> {
        let store = self
            .store
            .upgrade()
            .ok_or_else(|| ListenerError::new(self.name(), "secret store no longer exists"))?;

        let current = store.current_secret();
        if current.preview() != event.current_preview {
            // A newer rotation already landed; its own event follows.
            debug!(
                event_preview = %event.current_preview,
                store_preview = %current.preview(),
                "Store moved past rotation event; using latest secret"
            );
        }

        match self.signing_secret.write() {
            Ok(mut secret) => *secret = current,
            Err(poisoned) => *poisoned.into_inner() = current,
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        info!(
            rotation_count = event.rotation_count,
            secret_preview = %event.current_preview,
            "Cookie issuer switched to rotated secret"
        );
        Ok(())
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Find cookie `name` in the request's `Cookie` headers
pub fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Require a verifiable session cookie
///
/// Inserts [`SessionContext`] into request extensions. When the cookie only
/// verified with an older secret, the response carries a `Set-Cookie` with
/// the session re-signed under the current secret.
#[instrument(skip_all, fields(used_fallback))]
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let cookie = extract_cookie(request.headers(), &state.config.session.cookie_name)
        .ok_or(ApiError::Unauthenticated)?
        .to_string();

    let outcome = state.gateway.validate(&cookie).await?;
    tracing::Span::current().record("used_fallback", outcome.used_fallback);

    request
        .extensions_mut()
        .insert(SessionContext::from(&outcome));

    let mut response = next.run(request).await;

    if let Some(reissued) = &outcome.reissued_cookie {
        match HeaderValue::from_str(&state.config.session.set_cookie_header(reissued)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Re-signed cookie is not a valid header value"),
        }
    }

    Ok(response)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
