//! Tests for multi-secret session validation

use super::*;
use crate::{config::SecretRotationConfig, NotificationHub};

fn store() -> Arc<SecretStore> {
    Arc::new(
        SecretStore::new(
            SecretRotationConfig::default(),
            Arc::new(NotificationHub::new()),
            None,
        )
        .unwrap(),
    )
}

fn gateway(store: Arc<SecretStore>) -> SecretValidationGateway {
    SecretValidationGateway::new(store, Arc::new(HmacCookieSigner::new()))
}

fn secret(value: &str) -> SecretValue {
    SecretValue::from_string(value.to_string())
}

// ============================================================================
// HMAC cookie signer
// ============================================================================

mod signer {
    use super::*;

    #[test]
    fn test_signed_cookie_layout() {
        let signer = HmacCookieSigner::new();

        let cookie = signer.sign("session-1", &secret("k".repeat(64).as_str())).unwrap();

        let body = cookie.strip_prefix("s:").unwrap();
        let (sid, signature) = body.rsplit_once('.').unwrap();
        assert_eq!(sid, "session-1");
        assert!(!signature.ends_with('='));
        assert_eq!(STANDARD_NO_PAD.decode(signature).unwrap().len(), 32);
    }

    #[test]
    fn test_verify_round_trip_with_same_secret() {
        let signer = HmacCookieSigner::new();
        let key = secret("alpha-secret-0123456789abcdef0123");
        let cookie = signer.sign("abc.def", &key).unwrap();

        assert_eq!(signer.verify(&cookie, &key).unwrap(), "abc.def");
    }

    #[test]
    fn test_verify_accepts_missing_or_encoded_prefix() {
        let signer = HmacCookieSigner::new();
        let key = secret("alpha-secret-0123456789abcdef0123");
        let cookie = signer.sign("sid-42", &key).unwrap();
        let bare = cookie.strip_prefix("s:").unwrap();

        assert_eq!(signer.verify(bare, &key).unwrap(), "sid-42");
        assert_eq!(signer.verify(&format!("s%3A{}", bare), &key).unwrap(), "sid-42");
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let signer = HmacCookieSigner::new();
        let cookie = signer.sign("sid", &secret("first-secret-0123456789abcdef")).unwrap();

        let result = signer.verify(&cookie, &secret("second-secret-0123456789abcdef"));

        assert_eq!(result, Err(VerificationError::SignatureMismatch));
    }

    #[test]
    fn test_verify_rejects_tampered_session_id() {
        let signer = HmacCookieSigner::new();
        let key = secret("alpha-secret-0123456789abcdef0123");
        let cookie = signer.sign("user-1", &key).unwrap();
        let tampered = cookie.replacen("user-1", "user-2", 1);

        assert_eq!(
            signer.verify(&tampered, &key),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn test_verify_rejects_malformed_cookies() {
        let signer = HmacCookieSigner::new();
        let key = secret("alpha-secret-0123456789abcdef0123");

        for cookie in ["", "s:", "s:no-signature", "s:.c2ln", "s:sid.!!!not-base64!!!"] {
            let result = signer.verify(cookie, &key);
            assert!(
                matches!(result, Err(VerificationError::Malformed { .. })),
                "cookie {:?} gave {:?}",
                cookie,
                result
            );
        }
    }

    #[test]
    fn test_sign_rejects_empty_session_id() {
        let signer = HmacCookieSigner::new();

        let result = signer.sign("", &secret("alpha-secret-0123456789abcdef0123"));

        assert!(matches!(result, Err(VerificationError::Malformed { .. })));
    }
}

// ============================================================================
// Gateway
// ============================================================================

#[tokio::test]
async fn test_cookie_signed_with_current_uses_fast_path() {
    let store = store();
    let gateway = gateway(store.clone());
    let cookie = gateway.issue("session-a").unwrap();

    let outcome = gateway.validate(&cookie).await.unwrap();

    assert_eq!(outcome.session_id, "session-a");
    assert_eq!(outcome.matched, MatchedSecret::Current);
    assert!(!outcome.used_fallback);
    assert!(outcome.reissued_cookie.is_none());
    assert_eq!(outcome.matched_preview, store.current_secret().preview());
}

#[tokio::test]
async fn test_cookie_signed_with_previous_triggers_one_resign() {
    let store = store();
    let signer = HmacCookieSigner::new();
    let old_cookie = signer.sign("session-b", &store.current_secret()).unwrap();
    store.rotate().await.unwrap();
    let expected = signer.sign("session-b", &store.current_secret()).unwrap();

    let mut resigner = MockSessionResigner::new();
    let expected_clone = expected.clone();
    resigner
        .expect_resign()
        .withf(move |sid, cookie| sid == "session-b" && cookie == expected_clone)
        .times(1)
        .returning(|_, _| Ok(()));
    let gateway = gateway(store.clone()).with_resigner(Arc::new(resigner));

    let outcome = gateway.validate(&old_cookie).await.unwrap();

    assert_eq!(outcome.session_id, "session-b");
    assert!(outcome.used_fallback);
    assert_eq!(outcome.matched, MatchedSecret::Fallback { position: 1 });
    assert!(outcome.resigned);
    assert_eq!(outcome.reissued_cookie.as_deref(), Some(expected.as_str()));

    let reissued = outcome.reissued_cookie.unwrap();
    let second = gateway.validate(&reissued).await.unwrap();
    assert!(!second.used_fallback);
}

#[tokio::test]
async fn test_resign_failure_still_validates_session() {
    let store = store();
    let old_cookie = HmacCookieSigner::new()
        .sign("session-c", &store.current_secret())
        .unwrap();
    store.rotate().await.unwrap();

    let mut resigner = MockSessionResigner::new();
    resigner
        .expect_resign()
        .times(1)
        .returning(|_, _| Err(ResignError::new("session store unavailable")));
    let gateway = gateway(store).with_resigner(Arc::new(resigner));

    let outcome = gateway.validate(&old_cookie).await.unwrap();

    assert!(outcome.used_fallback);
    assert!(!outcome.resigned);
    assert!(outcome.reissued_cookie.is_none());
    let stats = gateway.statistics();
    assert_eq!(stats.resign_failures, 1);
    assert_eq!(stats.resign_successes, 0);
}

#[tokio::test]
async fn test_cookie_from_history_within_window_is_accepted() {
    let store = store();
    let ancient = HmacCookieSigner::new()
        .sign("session-d", &store.current_secret())
        .unwrap();
    store.rotate().await.unwrap();
    store.rotate().await.unwrap();
    store.rotate().await.unwrap();
    let gateway = gateway(store);

    let outcome = gateway.validate(&ancient).await.unwrap();

    assert!(outcome.used_fallback);
    assert!(matches!(outcome.matched, MatchedSecret::Fallback { position } if position >= 2));
}

#[tokio::test]
async fn test_unknown_secret_propagates_current_attempt_error() {
    let store = store();
    let foreign = HmacCookieSigner::new()
        .sign("session-e", &secret("some-other-deployment-secret-000000"))
        .unwrap();
    store.rotate().await.unwrap();
    let gateway = gateway(store);

    let result = gateway.validate(&foreign).await;

    assert_eq!(result, Err(VerificationError::SignatureMismatch));
    assert_eq!(gateway.statistics().failures, 1);
}

#[tokio::test]
async fn test_malformed_cookie_fails_without_fallback() {
    let mut resigner = MockSessionResigner::new();
    resigner.expect_resign().times(0);
    let gateway = gateway(store()).with_resigner(Arc::new(resigner));

    let result = gateway.validate("garbage").await;

    assert!(matches!(result, Err(VerificationError::Malformed { .. })));
}

#[tokio::test]
async fn test_statistics_count_each_path() {
    let store = store();
    let gateway = gateway(store.clone());
    let old_cookie = gateway.issue("s1").unwrap();
    store.rotate().await.unwrap();
    let fresh_cookie = gateway.issue("s2").unwrap();

    gateway.validate(&fresh_cookie).await.unwrap();
    gateway.validate(&old_cookie).await.unwrap();
    let _ = gateway.validate("s:s3.AAAA").await;

    assert_eq!(
        gateway.statistics(),
        GatewayStatistics {
            validations: 3,
            current_hits: 1,
            fallback_hits: 1,
            failures: 1,
            resign_successes: 1,
            resign_failures: 0,
        }
    );
}

#[tokio::test]
async fn test_debug_output_contains_no_secret() {
    let store = store();
    let gateway = gateway(store.clone());

    let debug = format!("{:?}", gateway);

    assert!(!debug.contains(store.current_secret().expose_secret()));
}
