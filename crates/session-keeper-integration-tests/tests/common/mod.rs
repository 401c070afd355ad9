//! Common test utilities for session-keeper integration tests
//!
//! This module provides:
//! - A recording re-sign hook
//! - Builders for fully wired application state
//! - Request and response helpers for the session routes

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
};
use session_keeper_api::{AppState, ServiceConfig};
use session_keeper_core::{
    HmacCookieSigner, NotificationHub, ResignError, RotationScheduler, SecretRotationConfig,
    SecretStore, SecretValidationGateway, SessionResigner,
};
use std::sync::{Arc, Mutex};

pub const ADMIN_TOKEN: &str = "integration-admin-token-0123";

// ============================================================================
// Recording Re-sign Hook
// ============================================================================

/// Re-sign hook that records every call
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingResigner {
    calls: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl RecordingResigner {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Recorded `(session_id, reissued_cookie)` pairs
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SessionResigner for RecordingResigner {
    async fn resign(&self, session_id: &str, reissued_cookie: &str) -> Result<(), ResignError> {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.to_string(), reissued_cookie.to_string()));

        if *self.fail.lock().unwrap() {
            return Err(ResignError::new("session store unavailable"));
        }
        Ok(())
    }
}

// ============================================================================
// Application Builders
// ============================================================================

/// Rotation configuration for tests: no auto rotation, no backup
#[allow(dead_code)]
pub fn rotation_config() -> SecretRotationConfig {
    SecretRotationConfig {
        auto_rotation_enabled: false,
        file_backup_enabled: false,
        ..SecretRotationConfig::default()
    }
}

/// Service configuration with the admin routes enabled behind a token
#[allow(dead_code)]
pub fn service_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.admin.enabled = true;
    config.admin.token = Some(ADMIN_TOKEN.to_string());
    config
}

/// Wire store, scheduler, gateway and HTTP state the way the service does
#[allow(dead_code)]
pub async fn build_state(
    rotation: SecretRotationConfig,
    service: ServiceConfig,
    resigner: Option<Arc<dyn SessionResigner>>,
) -> AppState {
    let store = Arc::new(
        SecretStore::from_config(rotation, Arc::new(NotificationHub::new()))
            .expect("Failed to create secret store"),
    );
    store.initialize().await;

    let scheduler = Arc::new(RotationScheduler::new(store.clone()));
    let mut gateway = SecretValidationGateway::new(store.clone(), Arc::new(HmacCookieSigner::new()));
    if let Some(resigner) = resigner {
        gateway = gateway.with_resigner(resigner);
    }

    AppState::new(service, store, scheduler, Arc::new(gateway))
}

// ============================================================================
// Request Helpers
// ============================================================================

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn session_request(cookie: &str) -> Request<Body> {
    Request::builder()
        .uri("/session")
        .header(header::COOKIE, format!("sid={}", cookie))
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn admin_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
        .body(Body::empty())
        .unwrap()
}

/// Cookie value carried by a `Set-Cookie` response header
#[allow(dead_code)]
pub fn set_cookie_value(response: &Response<Body>) -> Option<String> {
    let header = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = header.split(';').next()?;
    pair.split_once('=').map(|(_, v)| v.to_string())
}

#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
