//! # Jobs API Handlers
//!
//! Operator-triggered batch synchronization across every active connection.

use axum::{extract::State, response::Json};

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::orchestrator::SyncRunSummary;
use crate::server::AppState;

/// Run a batch sync over all active connections
#[utoipa::path(
    post,
    path = "/jobs/sync",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Batch sync run summary, including per-connection failures", body = SyncRunSummary),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn run_sync(
    State(state): State<AppState>,
    _operator: OperatorAuth,
) -> Result<Json<SyncRunSummary>, ApiError> {
    let summary = state.orchestrator.sync_all(&state.shutdown).await?;
    Ok(Json(summary))
}
