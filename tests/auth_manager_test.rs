//! Credential resolution integration tests using wiremock
//!
//! Verifies the refresh tier of `src/auth/manager.rs` against a mock
//! token endpoint:
//!
//! - An expired record is renewed via the refresh exchange and the
//!   renewed record is persisted.
//! - Concurrent resolutions for the same identity/service/scope set share
//!   one refresh exchange (the endpoint sees exactly one request).
//! - An `invalid_grant` rejection deletes the stored record and surfaces
//!   as `AuthError::InvalidGrant` when interactive recovery is disabled.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolgate::auth::{
    AuthManager, AuthManagerOptions, CredentialRecord, CredentialStore, OAuthFlow, SessionCache,
    ServiceKind,
};
use toolgate::config::Config;
use toolgate::error::AuthError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

/// Builds a manager whose token endpoint points at the given mock server.
fn make_manager(
    dir: &std::path::Path,
    token_base: &str,
    api_base: Option<String>,
) -> Arc<AuthManager> {
    let mut config = Config::default();
    config.oauth.client_id = Some("test-client-id".to_string());
    config.oauth.client_secret = Some("test-client-secret".to_string());
    config.oauth.token_endpoint = format!("{token_base}/token");
    // Headless: the consent flow must never run in these tests.
    config.oauth.interactive = false;

    let http = Arc::new(reqwest::Client::new());
    let flow = OAuthFlow::from_config(Arc::clone(&http), &config).expect("flow");

    Arc::new(AuthManager::new(
        http,
        Arc::new(CredentialStore::new(dir).expect("store")),
        Arc::new(SessionCache::new(Duration::minutes(30))),
        Some(Arc::new(flow)),
        AuthManagerOptions {
            single_user: false,
            interactive: false,
            api_base,
            upfront_scopes: Vec::new(),
        },
    ))
}

fn expired_record(identity: &str) -> CredentialRecord {
    CredentialRecord {
        identity: identity.to_string(),
        access_token: "stale_access_token".to_string(),
        refresh_token: Some("refresh_token_abc".to_string()),
        granted_scopes: BTreeSet::from([SCOPE.to_string()]),
        expires_at: Some(Utc::now() - Duration::hours(1)),
    }
}

fn refresh_response_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": "renewed_access_token",
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": SCOPE
    })
}

// ---------------------------------------------------------------------------
// Refresh exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_expired_record_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh_token_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_response_body()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = CredentialStore::new(dir.path()).expect("store");
    store.save(&expired_record("alice@example.com")).expect("seed");

    let manager = make_manager(dir.path(), &server.uri(), None);
    let client = manager
        .resolve(
            Some("alice@example.com"),
            ServiceKind::Sheets,
            "v4",
            &[SCOPE.to_string()],
        )
        .await
        .expect("resolve refreshes");
    assert_eq!(client.identity(), "alice@example.com");

    // The renewed record is on disk with the new access token.
    let persisted = store
        .load("alice@example.com")
        .expect("load")
        .expect("record present");
    assert_eq!(persisted.access_token, "renewed_access_token");
    assert!(!persisted.is_expired());
    assert_eq!(
        persisted.refresh_token.as_deref(),
        Some("refresh_token_abc"),
        "refresh token preserved when the provider does not rotate it",
    );
}

#[tokio::test]
async fn test_concurrent_resolutions_share_one_refresh() {
    let server = MockServer::start().await;
    // The endpoint tolerates exactly one request; a second would fail the
    // mock expectation when the server verifies on drop.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(refresh_response_body())
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    CredentialStore::new(dir.path())
        .expect("store")
        .save(&expired_record("alice@example.com"))
        .expect("seed");

    let manager = make_manager(dir.path(), &server.uri(), None);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            manager
                .resolve(
                    Some("alice@example.com"),
                    ServiceKind::Sheets,
                    "v4",
                    &[SCOPE.to_string()],
                )
                .await
        }));
    }

    for task in tasks {
        let client = task.await.expect("join").expect("resolve");
        assert_eq!(client.identity(), "alice@example.com");
    }
}

#[tokio::test]
async fn test_refresh_outcome_is_cached_for_subsequent_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_response_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    CredentialStore::new(dir.path())
        .expect("store")
        .save(&expired_record("alice@example.com"))
        .expect("seed");

    let manager = make_manager(dir.path(), &server.uri(), None);

    // Sequential calls: the second must come from the session cache.
    for _ in 0..3 {
        manager
            .resolve(
                Some("alice@example.com"),
                ServiceKind::Sheets,
                "v4",
                &[SCOPE.to_string()],
            )
            .await
            .expect("resolve");
    }
}

#[tokio::test]
async fn test_abandoned_caller_does_not_pin_the_resolution_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(refresh_response_body())
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = CredentialStore::new(dir.path()).expect("store");
    store.save(&expired_record("alice@example.com")).expect("seed");

    let manager = make_manager(dir.path(), &server.uri(), None);

    // Start a resolution and abandon it mid-refresh. The refresh itself
    // keeps running on its own task.
    let waiter = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move {
            manager
                .resolve(
                    Some("alice@example.com"),
                    ServiceKind::Sheets,
                    "v4",
                    &[SCOPE.to_string()],
                )
                .await
        }
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    waiter.abort();

    // Let the detached refresh finish, then revoke the identity.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(manager.revoke("alice@example.com").expect("revoke"));

    // Revocation must hold: a finished resolution nobody waited for may
    // not linger and serve this call.
    let err = manager
        .resolve(
            Some("alice@example.com"),
            ServiceKind::Sheets,
            "v4",
            &[SCOPE.to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoCredentials { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// invalid_grant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_grant_deletes_record_and_surfaces_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been revoked"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = CredentialStore::new(dir.path()).expect("store");
    store.save(&expired_record("alice@example.com")).expect("seed");

    let manager = make_manager(dir.path(), &server.uri(), None);
    let err = manager
        .resolve(
            Some("alice@example.com"),
            ServiceKind::Sheets,
            "v4",
            &[SCOPE.to_string()],
        )
        .await
        .unwrap_err();

    match err {
        AuthError::InvalidGrant { identity, detail } => {
            assert_eq!(identity, "alice@example.com");
            assert!(detail.contains("revoked"), "detail carried through: {detail}");
        }
        other => panic!("expected InvalidGrant, got {other:?}"),
    }

    // The dead record was removed so the next attempt starts clean.
    assert!(
        store.load("alice@example.com").expect("load").is_none(),
        "stale record must be deleted after invalid_grant",
    );
}

#[tokio::test]
async fn test_non_invalid_grant_refresh_failure_keeps_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = CredentialStore::new(dir.path()).expect("store");
    store.save(&expired_record("alice@example.com")).expect("seed");

    let manager = make_manager(dir.path(), &server.uri(), None);
    let err = manager
        .resolve(
            Some("alice@example.com"),
            ServiceKind::Sheets,
            "v4",
            &[SCOPE.to_string()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExchange(_)), "got {err:?}");

    // A transient endpoint failure must not destroy the stored record.
    assert!(store.load("alice@example.com").expect("load").is_some());
}
