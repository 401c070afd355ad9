//! # Session-Keeper HTTP Service
//!
//! HTTP surface for session authentication backed by rotating secrets.
//!
//! This crate provides:
//! - Session issuance and a session-protected endpoint
//! - Middleware that validates session cookies against every valid secret
//!   and re-issues cookies signed with an older one
//! - Admin endpoints for secret statistics, rotation status and forced rotation
//! - Health check endpoint

pub mod config;
pub mod errors;
pub mod session;

pub use config::{AdminConfig, ServerConfig, ServiceConfig, SessionConfig};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use session::{
    extract_cookie, session_auth_middleware, CookieIssuer, IssuedSession, SessionContext,
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Serialize;
use session_keeper_core::{
    GatewayStatistics, RotationScheduler, RotationStatus, SchedulerState, SecretPreview,
    SecretStatistics, SecretStore, SecretValidationGateway, Timestamp,
};
use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Owner of the signing secrets
    pub store: Arc<SecretStore>,

    /// Timer driving automatic rotation
    pub scheduler: Arc<RotationScheduler>,

    /// Multi-secret cookie verification
    pub gateway: Arc<SecretValidationGateway>,

    /// Signs new session cookies
    pub issuer: Arc<CookieIssuer>,
}

impl AppState {
    /// Create application state
    ///
    /// Registers a [`CookieIssuer`] with the store's notification hub, so
    /// call this after the store has been initialized.
    pub fn new(
        config: ServiceConfig,
        store: Arc<SecretStore>,
        scheduler: Arc<RotationScheduler>,
        gateway: Arc<SecretValidationGateway>,
    ) -> Self {
        let issuer = CookieIssuer::register(&store, Arc::clone(gateway.codec()));
        Self {
            config: Arc::new(config),
            store,
            scheduler,
            gateway,
            issuer,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // Only GET is behind the session check; POST issues the cookie.
    let session_routes = Router::new().route(
        "/session",
        get(get_session)
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_auth_middleware,
            ))
            .post(create_session),
    );

    let health_routes = Router::new().route("/health", get(handle_health_check));

    let mut router = Router::new().merge(session_routes).merge(health_routes);

    if state.config.admin.enabled {
        let admin_routes = Router::new()
            .route("/admin/secrets/statistics", get(get_secret_statistics))
            .route("/admin/secrets/status", get(get_rotation_status))
            .route("/admin/secrets/rotate", post(force_rotation))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_auth_middleware,
            ));
        router = router.merge(admin_routes);
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until `shutdown` resolves
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = Arc::clone(&state.config);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| {
            ServiceError::Configuration(ConfigError::Invalid {
                message: format!(
                    "invalid listen address {}:{}: {}",
                    config.server.host, config.server.port, e
                ),
            })
        })?;

    let app = create_router(state);
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.to_string(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };

    // New connections are refused once the shutdown future resolves;
    // in-flight requests get `drain_timeout` to finish.
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => result,
        Ok(()) = signalled_rx => {
            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_seconds = config.server.shutdown_timeout_seconds,
                        "Graceful shutdown timed out; dropping open connections"
                    );
                    Ok(())
                }
            }
        }
    };
    result.map_err(|e| ServiceError::ServerFailed {
        message: e.to_string(),
    })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Session Handlers
// ============================================================================

/// Issue a new session cookie
#[instrument(skip(state))]
async fn create_session(State(state): State<AppState>) -> Result<Response, ApiError> {
    let issued = state.issuer.issue()?;
    let set_cookie = HeaderValue::from_str(&state.config.session.set_cookie_header(&issued.cookie))
        .map_err(|e| ApiError::Internal {
            message: format!("issued cookie is not a valid header value: {}", e),
        })?;

    let body = SessionCreatedResponse {
        session_id: issued.session_id,
        issued_at: Timestamp::now(),
        signing_preview: state.issuer.signing_preview(),
    };

    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    response.headers_mut().insert(header::SET_COOKIE, set_cookie);
    Ok(response)
}

/// Describe the verified session
async fn get_session(Extension(session): Extension<SessionContext>) -> Json<SessionResponse> {
    Json(SessionResponse {
        session_id: session.session_id,
        used_fallback: session.used_fallback,
        resigned: session.resigned,
    })
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let rotation = state.scheduler.state().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rotation,
        valid_secret_count: state.store.valid_secrets().len(),
    })
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// Redacted secret and validation statistics
#[instrument(skip(state))]
async fn get_secret_statistics(State(state): State<AppState>) -> Json<SecretStatisticsResponse> {
    Json(SecretStatisticsResponse {
        secrets: state.store.statistics(),
        validation: state.gateway.statistics(),
        listeners: state.store.notification_hub().listener_count(),
        issuer_refreshes: state.issuer.refresh_count(),
    })
}

/// Scheduler status
#[instrument(skip(state))]
async fn get_rotation_status(State(state): State<AppState>) -> Json<RotationStatus> {
    Json(state.scheduler.status().await)
}

/// Rotate immediately
#[instrument(skip(state))]
async fn force_rotation(State(state): State<AppState>) -> Result<Json<RotationResponse>, ApiError> {
    let rotated = state.scheduler.force_rotation().await?;
    let stats = state.store.statistics();

    info!(
        secret_preview = %rotated.preview(),
        rotation_count = stats.rotation_count,
        "Secret rotated by admin request"
    );

    Ok(Json(RotationResponse {
        rotated_at: stats.last_rotation_at.unwrap_or_else(Timestamp::now),
        current_preview: rotated.preview(),
        rotation_count: stats.rotation_count,
        valid_secret_count: stats.valid_secret_count,
    }))
}

// ============================================================================
// Middleware
// ============================================================================

/// Require the configured admin bearer token
///
/// Without a configured token every admin request is refused.
async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.config.admin.token else {
        warn!("Admin request refused: no admin token configured");
        return Err(ApiError::Forbidden);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let matches: bool = presented.as_bytes().ct_eq(expected.as_bytes()).into();
    if !matches {
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// Request logging middleware with correlation ID tracking
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri().path(),
    correlation_id
))]
async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

// ============================================================================
// Response Types
// ============================================================================

/// Session issuance response
#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: String,
    pub issued_at: Timestamp,
    pub signing_preview: SecretPreview,
}

/// Verified session response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub used_fallback: bool,
    pub resigned: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub version: String,
    pub rotation: SchedulerState,
    pub valid_secret_count: usize,
}

/// Admin statistics response
#[derive(Debug, Serialize)]
pub struct SecretStatisticsResponse {
    pub secrets: SecretStatistics,
    pub validation: GatewayStatistics,
    pub listeners: usize,
    pub issuer_refreshes: u64,
}

/// Forced rotation response
#[derive(Debug, Serialize)]
pub struct RotationResponse {
    pub rotated_at: Timestamp,
    pub current_preview: SecretPreview,
    pub rotation_count: u64,
    pub valid_secret_count: usize,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
