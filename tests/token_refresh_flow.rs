//! Lazy token refresh over a scriptable platform: skew-triggered refresh,
//! reuse of fresh tokens, and permanent failure handling.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use uuid::Uuid;

use common::{StubPlatform, build_state, grant_expiring_in, seed_connection, setup_db};
use revsync::models::connection::STATUS_ERROR;
use revsync::platforms::UpstreamError;
use revsync::token_refresh::RefreshError;

#[tokio::test]
async fn fresh_token_is_reused_without_refresh() {
    let stub = Arc::new(StubPlatform::new("google"));
    let state = build_state(setup_db().await, vec![Arc::clone(&stub) as _]);

    let connection = seed_connection(&state, Uuid::new_v4(), Uuid::new_v4(), "google", 3600).await;
    let token = state
        .token_manager
        .ensure_access_token(&connection)
        .await
        .unwrap();

    assert_eq!(token, "access-token");
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_inside_skew_window_is_refreshed_and_persisted() {
    let stub = Arc::new(StubPlatform::new("google"));
    let mut refreshed = grant_expiring_in(3600);
    refreshed.access_token = "rotated-token".to_string();
    stub.set_refresh(Ok(refreshed));
    let state = build_state(setup_db().await, vec![Arc::clone(&stub) as _]);

    // 60 seconds left, inside the 300 second skew window.
    let connection = seed_connection(&state, Uuid::new_v4(), Uuid::new_v4(), "google", 60).await;
    let token = state
        .token_manager
        .ensure_access_token(&connection)
        .await
        .unwrap();

    assert_eq!(token, "rotated-token");
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);

    // The stored tokens were rotated too.
    let current = state
        .connection_repo
        .get_by_id(&connection.id)
        .await
        .unwrap()
        .unwrap();
    let (access, _) = state
        .connection_repo
        .decrypt_tokens(&current)
        .await
        .unwrap();
    assert_eq!(access.as_deref(), Some("rotated-token"));

    // A second call uses the rotated token without another refresh.
    let again = state
        .token_manager
        .ensure_access_token(&current)
        .await
        .unwrap();
    assert_eq!(again, "rotated-token");
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_refresh_token_marks_connection_errored() {
    let stub = Arc::new(StubPlatform::new("google"));
    stub.set_refresh(Err(UpstreamError::AuthRejected {
        detail: "invalid_grant".to_string(),
    }));
    let state = build_state(setup_db().await, vec![Arc::clone(&stub) as _]);

    let connection = seed_connection(&state, Uuid::new_v4(), Uuid::new_v4(), "google", -10).await;
    let result = state.token_manager.ensure_access_token(&connection).await;

    assert!(matches!(result, Err(RefreshError::ReauthRequired { .. })));

    let current = state
        .connection_repo
        .get_by_id(&connection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.status, STATUS_ERROR);
}

#[tokio::test]
async fn transient_refresh_failure_keeps_connection_active() {
    let stub = Arc::new(StubPlatform::new("google"));
    stub.set_refresh(Err(UpstreamError::Network {
        detail: "timeout".to_string(),
        retryable: true,
    }));
    let state = build_state(setup_db().await, vec![Arc::clone(&stub) as _]);

    let connection = seed_connection(&state, Uuid::new_v4(), Uuid::new_v4(), "google", -10).await;
    let result = state.token_manager.ensure_access_token(&connection).await;

    assert!(matches!(result, Err(RefreshError::Upstream { .. })));

    let current = state
        .connection_repo
        .get_by_id(&connection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.status, "active");
}

#[tokio::test]
async fn missing_refresh_token_requires_reauthorization() {
    let stub = Arc::new(StubPlatform::new("google"));
    let state = build_state(setup_db().await, vec![Arc::clone(&stub) as _]);

    let mut grant = grant_expiring_in(-10);
    grant.refresh_token = None;
    let connection = state
        .connection_repo
        .upsert_from_grant(Uuid::new_v4(), Uuid::new_v4(), "google", "accounts/a1", &grant)
        .await
        .unwrap();

    let result = state.token_manager.ensure_access_token(&connection).await;
    assert!(matches!(result, Err(RefreshError::ReauthRequired { .. })));
    assert_eq!(stub.refresh_calls.load(Ordering::SeqCst), 0);
}
