//! Tests for the session-keeper-core library module.

use super::*;

#[test]
fn test_timestamp_rfc3339_round_trip() {
    let parsed = Timestamp::from_rfc3339("2024-05-01T12:30:00+00:00").unwrap();

    assert_eq!(parsed.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    assert!(Timestamp::from_rfc3339("yesterday").is_err());
}

#[test]
fn test_timestamp_duration_since_saturates() {
    let earlier = Timestamp::from_rfc3339("2024-05-01T12:00:00Z").unwrap();
    let later = earlier.add_seconds(3600);

    assert_eq!(later.duration_since(earlier), Duration::from_secs(3600));
    assert_eq!(earlier.duration_since(later), Duration::ZERO);
}

#[test]
fn test_timestamp_unix_millis() {
    let ts = Timestamp::from_unix_millis(1_714_566_600_000).unwrap();

    assert_eq!(ts.unix_millis(), 1_714_566_600_000);
    assert_eq!(ts.add_duration(Duration::from_millis(5)).unix_millis(), 1_714_566_600_005);
}

#[test]
fn test_error_category_for_entropy_failure() {
    let error = SessionKeeperError::from(SecretError::EntropyUnavailable {
        message: "getrandom failed".to_string(),
    });

    assert_eq!(error.error_category(), ErrorCategory::Fatal);
}

#[test]
fn test_error_category_for_persistence_failure() {
    let error = SessionKeeperError::from(PersistenceError::Io {
        path: "/tmp/x".to_string(),
        message: "disk full".to_string(),
    });

    assert_eq!(error.error_category(), ErrorCategory::Transient);
}

#[test]
fn test_timestamp_arithmetic_saturates() {
    let now = Timestamp::now();

    let far_future = now.add_duration(Duration::from_secs(10_000_000_000 * 3600));
    assert_eq!(*far_future.as_datetime(), DateTime::<Utc>::MAX_UTC);
    assert_eq!(now.add_seconds(u64::MAX), far_future);
    assert_eq!(far_future.add_seconds(1), far_future);

    let far_past = now.subtract_duration(Duration::from_secs(u64::MAX));
    assert_eq!(*far_past.as_datetime(), DateTime::<Utc>::MIN_UTC);
}
