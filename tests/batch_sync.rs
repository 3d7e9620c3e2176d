//! Batch orchestration: partial failure survival and cancellation.

mod common;

use std::sync::Arc;

use uuid::Uuid;

use common::{StubPlatform, build_state, remote_location, remote_review, seed_connection, setup_db};
use revsync::platforms::UpstreamError;

#[tokio::test]
async fn one_failing_connection_does_not_abort_the_run() {
    let healthy = Arc::new(StubPlatform::new("google"));
    healthy.set_reviews(vec![remote_review("reviews/r1", "FIVE", "Great")]);

    let broken = Arc::new(StubPlatform::new("broken"));
    broken.fail_accounts(UpstreamError::Http {
        status: 500,
        body: None,
    });
    broken.set_refresh(Err(UpstreamError::AuthRejected {
        detail: "invalid_grant".to_string(),
    }));

    let state = build_state(
        setup_db().await,
        vec![Arc::clone(&healthy) as _, Arc::clone(&broken) as _],
    );

    let tenant_id = Uuid::new_v4();
    seed_connection(&state, tenant_id, Uuid::new_v4(), "google", 3600).await;
    // Expired token whose refresh is rejected: this connection must fail.
    seed_connection(&state, tenant_id, Uuid::new_v4(), "broken", -10).await;

    let summary = state
        .orchestrator
        .sync_all(&state.shutdown)
        .await
        .unwrap();

    assert_eq!(summary.connections_processed, 2);
    assert_eq!(summary.connections_failed, 1);
    assert_eq!(summary.new_reviews, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].platform, "broken");
}

#[tokio::test]
async fn location_failure_is_reported_without_failing_the_connection() {
    let stub = Arc::new(StubPlatform::new("google"));
    stub.set_locations(vec![
        remote_location("locations/l1", "Airport"),
        remote_location("locations/l2", "Harbor"),
        remote_location("locations/l3", "Main Street"),
    ]);
    stub.fail_reviews_for("locations/l2");
    let state = build_state(setup_db().await, vec![stub as _]);

    seed_connection(&state, Uuid::new_v4(), Uuid::new_v4(), "google", 3600).await;

    let summary = state
        .orchestrator
        .sync_all(&state.shutdown)
        .await
        .unwrap();

    // The connection itself succeeded; only the one location is reported.
    assert_eq!(summary.connections_processed, 1);
    assert_eq!(summary.connections_failed, 0);
    assert_eq!(summary.locations_synced, 2);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].platform, "google");
    assert_eq!(summary.errors[0].location.as_deref(), Some("Harbor"));
}

#[tokio::test]
async fn cancelled_run_stops_before_processing() {
    let stub = Arc::new(StubPlatform::new("google"));
    let state = build_state(setup_db().await, vec![stub as _]);

    seed_connection(&state, Uuid::new_v4(), Uuid::new_v4(), "google", 3600).await;

    state.shutdown.cancel();
    let summary = state
        .orchestrator
        .sync_all(&state.shutdown)
        .await
        .unwrap();

    assert_eq!(summary.connections_processed, 0);
    assert_eq!(summary.connections_failed, 0);
}

#[tokio::test]
async fn empty_database_yields_empty_summary() {
    let stub = Arc::new(StubPlatform::new("google"));
    let state = build_state(setup_db().await, vec![stub as _]);

    let summary = state
        .orchestrator
        .sync_all(&state.shutdown)
        .await
        .unwrap();

    assert_eq!(summary.connections_processed, 0);
    assert!(summary.errors.is_empty());
}
