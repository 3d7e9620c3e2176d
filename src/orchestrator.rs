//! # Sync Orchestrator
//!
//! Drives a batch sync across every active connection. Each connection is
//! synced independently: a failure is recorded in the run summary and the
//! remaining connections still run. Pacing between connections keeps the
//! batch from bursting against platform quotas, and a cancellation token
//! stops the run between connections on shutdown.

use metrics::{counter, histogram};
use std::sync::Arc;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::reconcile::{ReconcileError, ReviewReconciler};
use crate::repositories::ConnectionRepository;

/// A failure captured during a batch run. `location` is set when a single
/// location failed while its connection otherwise synced.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct SyncErrorEntry {
    pub connection_id: Uuid,
    pub venue_id: Uuid,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub error: String,
}

/// Aggregate result of one batch sync run
#[derive(Debug, Default, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct SyncRunSummary {
    pub connections_processed: u64,
    pub connections_failed: u64,
    pub locations_synced: u64,
    pub total_reviews: u64,
    pub new_reviews: u64,
    pub updated_reviews: u64,
    pub errors: Vec<SyncErrorEntry>,
}

/// Batch sync driver over all active connections
pub struct SyncOrchestrator {
    config: Arc<AppConfig>,
    connection_repo: Arc<ConnectionRepository>,
    reconciler: Arc<ReviewReconciler>,
}

impl SyncOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        connection_repo: Arc<ConnectionRepository>,
        reconciler: Arc<ReviewReconciler>,
    ) -> Self {
        Self {
            config,
            connection_repo,
            reconciler,
        }
    }

    /// Sync every active connection once.
    #[instrument(skip_all)]
    pub async fn sync_all(&self, shutdown: &CancellationToken) -> anyhow::Result<SyncRunSummary> {
        let started = std::time::Instant::now();
        let connections = self.connection_repo.find_all_active().await?;
        info!(connections = connections.len(), "Starting batch sync run");

        let pace = TokioDuration::from_millis(self.config.sync.pace_ms);
        let mut summary = SyncRunSummary::default();

        for (index, connection) in connections.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!("Batch sync cancelled, stopping between connections");
                break;
            }
            if index > 0 && !pace.is_zero() {
                sleep(pace).await;
            }

            match self.reconciler.sync_connection(connection, shutdown).await {
                Ok(result) => {
                    summary.connections_processed += 1;
                    summary.locations_synced += result.locations_synced;
                    summary.total_reviews += result.reviews.total;
                    summary.new_reviews += result.reviews.new;
                    summary.updated_reviews += result.reviews.updated;
                    for failed in result.location_errors {
                        counter!("sync_location_failures_total").increment(1);
                        summary.errors.push(SyncErrorEntry {
                            connection_id: connection.id,
                            venue_id: connection.venue_id,
                            platform: connection.platform.clone(),
                            location: Some(failed.name),
                            error: failed.error,
                        });
                    }
                }
                Err(err) => {
                    summary.connections_processed += 1;
                    summary.connections_failed += 1;
                    counter!("sync_connection_failures_total").increment(1);
                    error!(
                        connection_id = %connection.id,
                        venue_id = %connection.venue_id,
                        error = %err,
                        "Connection sync failed, continuing with remaining connections"
                    );
                    summary.errors.push(SyncErrorEntry {
                        connection_id: connection.id,
                        venue_id: connection.venue_id,
                        platform: connection.platform.clone(),
                        location: None,
                        error: display_error(&err),
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        histogram!("sync_run_duration_ms").record(elapsed.as_secs_f64() * 1_000.0);
        counter!("sync_runs_total").increment(1);
        info!(
            processed = summary.connections_processed,
            failed = summary.connections_failed,
            new_reviews = summary.new_reviews,
            updated_reviews = summary.updated_reviews,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch sync run finished"
        );

        Ok(summary)
    }
}

fn display_error(err: &ReconcileError) -> String {
    match err {
        ReconcileError::NoAccountsFound { platform } => {
            format!("no accounts found on {}", platform)
        }
        other => other.to_string(),
    }
}
