//! Integration tests for the admin secret endpoints
//!
//! These tests verify:
//! - Forced rotation through HTTP updates the store, issuer and statistics
//! - Rotation status reflects the scheduler lifecycle
//! - Admin responses never carry raw secret values
//! - The admin token is enforced

mod common;

use axum::http::StatusCode;
use common::{
    admin_request, build_state, get, json_body, post, rotation_config, service_config,
    session_request, set_cookie_value,
};
use session_keeper_api::create_router;
use std::time::Duration;
use tower::ServiceExt;

/// Forced rotation demotes the current secret and refreshes the issuer
#[tokio::test]
async fn test_forced_rotation_flows_through_to_statistics() {
    // Arrange
    let state = build_state(rotation_config(), service_config(), None).await;
    let app = create_router(state.clone());
    let before = state.store.current_secret();

    // Act
    let response = app
        .clone()
        .oneshot(admin_request("POST", "/admin/secrets/rotate"))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["rotation_count"], 1);
    assert_eq!(body["valid_secret_count"], 2);
    assert_eq!(
        body["current_preview"],
        state.store.current_secret().preview().as_str()
    );

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/admin/secrets/statistics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["secrets"]["rotation_count"], 1);
    assert_eq!(body["secrets"]["previous_preview"], before.preview().as_str());
    assert_eq!(body["issuer_refreshes"], 1);
    assert!(!body.to_string().contains(before.expose_secret()));
    assert!(!body
        .to_string()
        .contains(state.store.current_secret().expose_secret()));
}

/// Validation counters reflect traffic on the session routes
#[tokio::test]
async fn test_statistics_count_fallback_validations() {
    let state = build_state(rotation_config(), service_config(), None).await;
    let app = create_router(state.clone());

    let response = app.clone().oneshot(post("/session")).await.unwrap();
    let cookie = set_cookie_value(&response).unwrap();
    app.clone().oneshot(session_request(&cookie)).await.unwrap();

    app.clone()
        .oneshot(admin_request("POST", "/admin/secrets/rotate"))
        .await
        .unwrap();
    app.clone().oneshot(session_request(&cookie)).await.unwrap();
    app.clone().oneshot(session_request("s:forged.AAAA")).await.unwrap();

    let response = app
        .oneshot(admin_request("GET", "/admin/secrets/statistics"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["validation"]["validations"], 3);
    assert_eq!(body["validation"]["current_hits"], 1);
    assert_eq!(body["validation"]["fallback_hits"], 1);
    assert_eq!(body["validation"]["failures"], 1);
}

/// Rotation status follows scheduler start and stop
#[tokio::test(start_paused = true)]
async fn test_rotation_status_tracks_scheduler() {
    let state = build_state(rotation_config(), service_config(), None).await;
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/admin/secrets/status"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "idle");

    state
        .scheduler
        .start(Duration::from_secs(60 * 60))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(admin_request("GET", "/admin/secrets/status"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "running");
    assert_eq!(body["interval_seconds"], 3600);

    app.clone()
        .oneshot(admin_request("POST", "/admin/secrets/rotate"))
        .await
        .unwrap();
    state.scheduler.stop().await;

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/admin/secrets/status"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "idle");
    assert_eq!(body["forced_rotations"], 1);
    assert_eq!(body["scheduled_rotations"], 0);

    let response = app.oneshot(get("/health")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["rotation"], "idle");
    assert_eq!(body["valid_secret_count"], 2);
}

/// Requests without the admin token cannot rotate
#[tokio::test]
async fn test_rotation_requires_admin_token() {
    let state = build_state(rotation_config(), service_config(), None).await;
    let app = create_router(state.clone());

    let response = app.oneshot(post("/admin/secrets/rotate")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(state.store.rotation_count(), 0);
}
