//! Error types for the HTTP service

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use session_keeper_core::{SchedulerError, VerificationError};
use tracing::{error, warn};

/// Request handler errors with HTTP status code mapping
///
/// - `401 Unauthorized`: no session cookie, or one no valid secret verifies
/// - `403 Forbidden`: admin route called without the configured token
/// - `500 Internal Server Error`: unexpected server failures
/// - `503 Service Unavailable`: rotation could not produce a new secret
///
/// Bodies are sanitized: verification details are logged server-side and
/// never echoed to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Session cookie absent
    #[error("Authentication required")]
    Unauthenticated,

    /// Session cookie present but not verifiable
    #[error("Invalid session: {0}")]
    InvalidSession(#[from] VerificationError),

    /// Admin credentials missing or wrong
    #[error("Admin credentials required")]
    Forbidden,

    /// Forced rotation failed
    #[error("Rotation failed: {0}")]
    RotationFailed(#[from] SchedulerError),

    /// Unexpected internal server error
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::InvalidSession(e) => {
                warn!(error = %e, "Session cookie rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "Session is invalid or expired. Please sign in again.".to_string(),
                )
            }
            Self::Forbidden => {
                warn!("Admin request rejected");
                (StatusCode::FORBIDDEN, self.to_string())
            }
            Self::RotationFailed(e) => {
                error!(error = %e, "Forced rotation failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Secret rotation failed. Please try again later.".to_string(),
                )
            }
            Self::Internal { message } => {
                error!(error = %message, "Internal server error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error occurred. Please try again later.".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Cookie"),
            );
        }
        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
