//! Tests for the secret module.

use super::*;

#[test]
fn test_generated_secret_is_64_hex_characters() {
    let secret = generate_secret(DEFAULT_SECRET_BYTES).unwrap();

    assert_eq!(secret.len(), 64);
    assert!(secret
        .expose_secret()
        .chars()
        .all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_consecutive_secrets_differ() {
    let first = generate_secret(DEFAULT_SECRET_BYTES).unwrap();
    let second = generate_secret(DEFAULT_SECRET_BYTES).unwrap();

    assert_ne!(first, second);
}

#[test]
fn test_no_collisions_across_many_generations() {
    let mut seen = std::collections::HashSet::new();
    for _ in 0..500 {
        let secret = generate_secret(DEFAULT_SECRET_BYTES).unwrap();
        assert!(seen.insert(secret.expose_secret().to_string()));
    }
}

#[test]
fn test_zero_length_secret_rejected() {
    let result = generate_secret(0);

    assert!(matches!(result, Err(SecretError::InvalidLength { .. })));
    assert!(!result.unwrap_err().is_fatal());
}

#[test]
fn test_entropy_error_is_fatal() {
    let error = SecretError::EntropyUnavailable {
        message: "no device".to_string(),
    };

    assert!(error.is_fatal());
}

#[test]
fn test_secret_value_debug_is_redacted() {
    let secret = SecretValue::from_string("sensitive-data-1234567890".to_string());

    let debug_output = format!("{:?}", secret);
    assert!(!debug_output.contains("sensitive-data"));
    assert!(debug_output.contains("[REDACTED]"));
    assert_eq!(secret.len(), 25);
}

#[test]
fn test_preview_shows_only_prefix() {
    let secret = SecretValue::from_string("abcdef0123456789abcdef0123456789".to_string());

    let preview = secret.preview();
    assert_eq!(preview.as_str(), "abcdef01...");
    assert!(!preview.as_str().contains("23456789abcdef"));
}

#[test]
fn test_preview_of_short_value_hides_everything() {
    let secret = SecretValue::from_string("short".to_string());

    assert_eq!(secret.preview().as_str(), "***");
}

#[test]
fn test_matches_is_exact() {
    let secret = SecretValue::from_string("abc123".to_string());

    assert!(secret.matches("abc123"));
    assert!(!secret.matches("abc12"));
    assert!(!secret.matches("abc1234"));
    assert!(!secret.matches(""));
}

#[test]
fn test_secret_generate_records_creation_time() {
    let before = Timestamp::now();
    let secret = Secret::generate(16).unwrap();
    let after = Timestamp::now();

    assert!(secret.created_at() >= before);
    assert!(secret.created_at() <= after);
    assert_eq!(secret.value().len(), 32);
}
