//! Tests for layered service configuration loading

use super::*;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for key in [
        "SK__SERVER__PORT",
        "SK__SESSION__COOKIE_NAME",
        "SK__ADMIN__ENABLED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_defaults_without_sources() {
    clear_env();

    let config = load_service_config(None).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.session.cookie_name, "sid");
    assert!(!config.admin.enabled);
}

#[test]
#[serial]
fn test_explicit_file_is_applied() {
    clear_env();
    let file = yaml_file(
        "server:\n  port: 9443\nsession:\n  cookie_name: app_sid\n  secure: false\nadmin:\n  token: yaml-admin-token-0123\n",
    );

    let config = load_service_config(file.path().to_str()).unwrap();

    assert_eq!(config.server.port, 9443);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.session.cookie_name, "app_sid");
    assert!(!config.session.secure);
    assert_eq!(config.admin.token.as_deref(), Some("yaml-admin-token-0123"));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let file = yaml_file("server:\n  port: 9443\n");
    std::env::set_var("SK__SERVER__PORT", "7070");
    std::env::set_var("SK__ADMIN__ENABLED", "true");

    let config = load_service_config(file.path().to_str());
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.server.port, 7070);
    assert!(config.admin.enabled);
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env();

    let result = load_service_config(Some("/nonexistent/session-keeper/service.yaml"));

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_empty_explicit_path_is_ignored() {
    clear_env();

    let config = load_service_config(Some("")).unwrap();

    assert_eq!(config.server.port, 8080);
}

#[test]
#[serial]
fn test_wrong_type_is_an_error() {
    clear_env();
    let file = yaml_file("server:\n  port: not-a-port\n");

    let result = load_service_config(file.path().to_str());

    assert!(result.is_err());
}
