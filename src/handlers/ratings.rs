//! # Rating Handlers
//!
//! Aggregate venue rating lookups backed by the rating cache.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{CallerExtension, ensure_venue_access};
use crate::error::ApiError;
use crate::rating_cache::{RatingError, RatingResult};
use crate::server::AppState;

/// Query parameters for the rating endpoint
#[derive(Debug, Default, Deserialize)]
pub struct RatingQuery {
    /// Bypass the freshness window and fetch live
    #[serde(default)]
    pub force_refresh: bool,
}

/// Fetch the aggregate rating for a venue on one platform
#[utoipa::path(
    get,
    path = "/venues/{venue_id}/ratings/{platform}",
    security(("bearer_auth" = [])),
    params(
        ("venue_id" = Uuid, Path, description = "Venue identifier"),
        ("platform" = String, Path, description = "Platform slug (e.g. 'google')"),
        ("force_refresh" = Option<bool>, Query, description = "Bypass the freshness window")
    ),
    responses(
        (status = 200, description = "Aggregate rating, cached or live", body = RatingResult),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller has no access to this venue", body = ApiError),
        (status = 404, description = "Venue has no connection for this platform", body = ApiError),
        (status = 503, description = "Live fetch failed and nothing is cached", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "ratings"
)]
pub async fn get_rating(
    State(state): State<AppState>,
    CallerExtension(caller): CallerExtension,
    Path((venue_id, platform)): Path<(Uuid, String)>,
    Query(query): Query<RatingQuery>,
) -> Result<Json<RatingResult>, ApiError> {
    ensure_venue_access(&state.grant_repo, &caller, venue_id, false).await?;

    let result = state
        .rating_cache
        .get_rating(caller.tenant_id, venue_id, &platform, query.force_refresh)
        .await
        .map_err(|err| match err {
            RatingError::NotConnected { venue_id, platform } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("venue '{}' has no {} connection", venue_id, platform),
            ),
            RatingError::Unavailable { reason } => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "TEMPORARILY_UNAVAILABLE",
                "Rating is temporarily unavailable",
            )
            .with_details(json!({ "status": "temporarily_unavailable", "reason": reason })),
            RatingError::Store(err) => err.into(),
        })?;

    Ok(Json(result))
}
