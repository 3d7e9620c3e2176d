//! # Venue Sync Handlers
//!
//! On-demand review synchronization for a single venue. Results are
//! reported per location; a location or platform failing does not abort
//! the rest. An optional body narrows the sync to one location.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{CallerExtension, ensure_venue_access};
use crate::error::{ApiError, ErrorType};
use crate::models::location;
use crate::reconcile::LocationSyncReport;
use crate::server::AppState;

/// Optional request body narrowing the sync to one location
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SyncVenueRequest {
    pub location_id: Option<Uuid>,
}

/// A platform or location that failed during a venue sync
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncFailure {
    pub platform: String,
    /// Set when a single location failed; absent for connection-level failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub error: String,
}

/// Response payload for an on-demand venue sync
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncVenueResponse {
    pub venue_id: Uuid,
    /// Per-location results for locations that reconciled successfully
    pub locations: Vec<LocationSyncReport>,
    /// Failures; empty on a fully successful sync
    pub failures: Vec<SyncFailure>,
}

/// Trigger a review sync for a venue, optionally narrowed to one location
#[utoipa::path(
    post,
    path = "/venues/{venue_id}/sync",
    security(("bearer_auth" = [])),
    params(
        ("venue_id" = Uuid, Path, description = "Venue identifier")
    ),
    request_body(content = SyncVenueRequest, description = "Optional location filter"),
    responses(
        (status = 200, description = "Sync completed, possibly with per-location failures", body = SyncVenueResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller has no access to this venue", body = ApiError),
        (status = 404, description = "Venue has no active platform connections, or the location is unknown", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_venue(
    State(state): State<AppState>,
    CallerExtension(caller): CallerExtension,
    Path(venue_id): Path<Uuid>,
    body: Option<Json<SyncVenueRequest>>,
) -> Result<Json<SyncVenueResponse>, ApiError> {
    ensure_venue_access(&state.grant_repo, &caller, venue_id, true).await?;

    let connections = state
        .connection_repo
        .find_active_by_venue(&caller.tenant_id, &venue_id)
        .await?;

    if connections.is_empty() {
        return Err(ApiError::new(
            ErrorType::NotFound.status_code(),
            "NOT_FOUND",
            &format!("venue '{}' has no active platform connections", venue_id),
        ));
    }

    let location_filter = body.and_then(|Json(request)| request.location_id);
    let mut locations = Vec::new();
    let mut failures = Vec::new();

    if let Some(location_id) = location_filter {
        let (connection, location) =
            scoped_location(&state, &connections, venue_id, location_id).await?;

        match state
            .reconciler
            .sync_single_location(connection, &location)
            .await
        {
            Ok(summary) => locations.push(LocationSyncReport {
                location_id: location.id,
                name: location.display_name.clone(),
                reviews: summary,
            }),
            Err(err) => failures.push(SyncFailure {
                platform: connection.platform.clone(),
                location: Some(location.display_name.clone()),
                error: err.to_string(),
            }),
        }
    } else {
        for connection in &connections {
            match state
                .reconciler
                .sync_connection(connection, &state.shutdown)
                .await
            {
                Ok(summary) => {
                    locations.extend(summary.locations);
                    failures.extend(summary.location_errors.into_iter().map(|failed| {
                        SyncFailure {
                            platform: connection.platform.clone(),
                            location: Some(failed.name),
                            error: failed.error,
                        }
                    }));
                }
                Err(err) => {
                    tracing::warn!(
                        venue_id = %venue_id,
                        platform = %connection.platform,
                        error = %err,
                        "Venue sync failed for one platform"
                    );
                    failures.push(SyncFailure {
                        platform: connection.platform.clone(),
                        location: None,
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    Ok(Json(SyncVenueResponse {
        venue_id,
        locations,
        failures,
    }))
}

/// Resolves a requested location against the venue's connections, rejecting
/// ids that belong to another venue or are soft-disabled.
async fn scoped_location<'a>(
    state: &AppState,
    connections: &'a [crate::models::connection::Model],
    venue_id: Uuid,
    location_id: Uuid,
) -> Result<(&'a crate::models::connection::Model, location::Model), ApiError> {
    let not_found = || {
        ApiError::new(
            ErrorType::NotFound.status_code(),
            "NOT_FOUND",
            &format!(
                "venue '{}' has no active location '{}'",
                venue_id, location_id
            ),
        )
    };

    let location = state
        .location_repo
        .get_by_id(&location_id)
        .await?
        .filter(|l| l.is_active)
        .ok_or_else(not_found)?;

    let connection = connections
        .iter()
        .find(|c| c.id == location.connection_id)
        .ok_or_else(not_found)?;

    Ok((connection, location))
}
