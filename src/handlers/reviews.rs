//! # Review Handlers
//!
//! Listing synced reviews for a venue and publishing replies. Replies are
//! guarded against double-posting: a review that already carries a reply is
//! rejected locally without an upstream call.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{CallerExtension, ensure_venue_access};
use crate::error::{self, ApiError, validation_error};
use crate::models::{connection, location, review};
use crate::repositories::ReviewFilter;
use crate::server::AppState;

/// Maximum reply length accepted by the API
pub const MAX_REPLY_LENGTH: usize = 4096;

/// Query parameters for listing reviews
#[derive(Debug, Default, Deserialize)]
pub struct ListReviewsQuery {
    /// Response-state filter (one of: all, unresponded, responded)
    #[serde(default)]
    pub filter: ReviewFilter,
    /// Restrict the listing to a single location
    pub location_id: Option<Uuid>,
}

/// A synced review as returned by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewInfo {
    pub id: Uuid,
    pub location_id: Uuid,
    pub platform: String,
    pub reviewer_name: Option<String>,
    pub reviewer_photo_url: Option<String>,
    /// Star rating 1..=5; null when the platform value was unparseable
    pub rating: Option<i16>,
    pub body: Option<String>,
    pub submitted_at: Option<String>,
    pub reply_text: Option<String>,
    pub replied_at: Option<String>,
    pub is_replied: bool,
}

impl ReviewInfo {
    fn from_model(model: review::Model, platform: String) -> Self {
        Self {
            id: model.id,
            location_id: model.location_id,
            platform,
            reviewer_name: model.reviewer_name,
            reviewer_photo_url: model.reviewer_photo_url,
            rating: model.rating,
            body: model.body,
            submitted_at: model.submitted_at.map(|dt| dt.to_rfc3339()),
            reply_text: model.reply_text,
            replied_at: model.replied_at.map(|dt| dt.to_rfc3339()),
            is_replied: model.is_replied,
        }
    }
}

/// Aggregate figures over the returned reviews
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewStats {
    pub total: u64,
    pub unresponded: u64,
    pub responded: u64,
    /// Mean star rating over rated reviews; null when none carry a rating
    pub avg_rating: Option<f64>,
    /// Review counts per star value, index 0 holding one-star reviews
    pub rating_breakdown: [u64; 5],
}

/// Response payload for the review listing endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewsResponse {
    pub reviews: Vec<ReviewInfo>,
    pub stats: ReviewStats,
}

fn compute_stats(reviews: &[review::Model]) -> ReviewStats {
    let mut stats = ReviewStats {
        total: reviews.len() as u64,
        unresponded: 0,
        responded: 0,
        avg_rating: None,
        rating_breakdown: [0; 5],
    };

    let mut rating_sum = 0i64;
    let mut rated = 0u64;

    for review in reviews {
        if review.is_replied {
            stats.responded += 1;
        } else {
            stats.unresponded += 1;
        }
        if let Some(rating) = review.rating
            && (1..=5).contains(&rating)
        {
            stats.rating_breakdown[(rating - 1) as usize] += 1;
            rating_sum += rating as i64;
            rated += 1;
        }
    }

    if rated > 0 {
        stats.avg_rating = Some((rating_sum as f64 / rated as f64 * 100.0).round() / 100.0);
    }

    stats
}

/// Resolves the venue's active locations, keyed by location id to platform slug.
async fn venue_locations(
    state: &AppState,
    tenant_id: &Uuid,
    venue_id: &Uuid,
) -> Result<(Vec<location::Model>, HashMap<Uuid, String>), ApiError> {
    let connections = state
        .connection_repo
        .find_active_by_venue(tenant_id, venue_id)
        .await?;

    let mut locations = Vec::new();
    let mut platforms = HashMap::new();
    for connection in &connections {
        for location in state
            .location_repo
            .find_active_by_connection(&connection.id)
            .await?
        {
            platforms.insert(location.id, connection.platform.clone());
            locations.push(location);
        }
    }

    Ok((locations, platforms))
}

/// List the synced reviews for a venue
#[utoipa::path(
    get,
    path = "/venues/{venue_id}/reviews",
    security(("bearer_auth" = [])),
    params(
        ("venue_id" = Uuid, Path, description = "Venue identifier"),
        ("filter" = Option<String>, Query, description = "Response-state filter: all, unresponded, responded"),
        ("location_id" = Option<Uuid>, Query, description = "Restrict to a single location")
    ),
    responses(
        (status = 200, description = "Reviews with aggregate stats", body = ReviewsResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller has no access to this venue", body = ApiError),
        (status = 404, description = "Location does not belong to this venue", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    CallerExtension(caller): CallerExtension,
    Path(venue_id): Path<Uuid>,
    Query(query): Query<ListReviewsQuery>,
) -> Result<Json<ReviewsResponse>, ApiError> {
    ensure_venue_access(&state.grant_repo, &caller, venue_id, false).await?;

    let (locations, platforms) = venue_locations(&state, &caller.tenant_id, &venue_id).await?;

    let location_ids: Vec<Uuid> = match query.location_id {
        Some(requested) => {
            if !locations.iter().any(|l| l.id == requested) {
                return Err(ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    &format!("location '{}' not found for this venue", requested),
                ));
            }
            vec![requested]
        }
        None => locations.iter().map(|l| l.id).collect(),
    };

    let models = state
        .review_repo
        .list_for_locations(&location_ids, query.filter)
        .await?;

    let stats = compute_stats(&models);
    let reviews = models
        .into_iter()
        .map(|model| {
            let platform = platforms
                .get(&model.location_id)
                .cloned()
                .unwrap_or_default();
            ReviewInfo::from_model(model, platform)
        })
        .collect();

    Ok(Json(ReviewsResponse { reviews, stats }))
}

/// Request body for publishing a reply
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplyRequest {
    /// Reply text, 1 to 4096 characters after trimming
    pub body: String,
}

/// Loads a review and checks it belongs to the given tenant and venue.
async fn load_scoped_review(
    state: &AppState,
    tenant_id: &Uuid,
    venue_id: &Uuid,
    review_id: &Uuid,
) -> Result<(review::Model, connection::Model), ApiError> {
    let not_found = || {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("review '{}' not found for this venue", review_id),
        )
    };

    let review = state
        .review_repo
        .get_by_id(review_id)
        .await?
        .ok_or_else(not_found)?;
    let location = state
        .location_repo
        .get_by_id(&review.location_id)
        .await?
        .ok_or_else(not_found)?;
    let connection = state
        .connection_repo
        .get_by_id(&location.connection_id)
        .await?
        .ok_or_else(not_found)?;

    // Scope check before any other response so cross-tenant probes always 404.
    if connection.tenant_id != *tenant_id || connection.venue_id != *venue_id {
        return Err(not_found());
    }

    Ok((review, connection))
}

/// Publish a reply to a review on its platform
#[utoipa::path(
    post,
    path = "/venues/{venue_id}/reviews/{review_id}/reply",
    security(("bearer_auth" = [])),
    params(
        ("venue_id" = Uuid, Path, description = "Venue identifier"),
        ("review_id" = Uuid, Path, description = "Review identifier")
    ),
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply published", body = ReviewInfo),
        (status = 400, description = "Reply body is empty or too long", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not manage reviews for this venue", body = ApiError),
        (status = 404, description = "Review not found for this venue", body = ApiError),
        (status = 409, description = "Review already has a reply", body = ApiError),
        (status = 502, description = "Platform rejected the reply", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "reviews"
)]
pub async fn reply_to_review(
    State(state): State<AppState>,
    CallerExtension(caller): CallerExtension,
    Path((venue_id, review_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReplyRequest>,
) -> Result<Json<ReviewInfo>, ApiError> {
    ensure_venue_access(&state.grant_repo, &caller, venue_id, true).await?;

    let body = payload.body.trim();
    if body.is_empty() {
        return Err(validation_error(
            "Reply body must not be empty",
            json!({ "body": "must not be empty" }),
        ));
    }
    if body.chars().count() > MAX_REPLY_LENGTH {
        return Err(validation_error(
            "Reply body is too long",
            json!({ "body": format!("must not exceed {} characters", MAX_REPLY_LENGTH) }),
        ));
    }

    let (review, connection) =
        load_scoped_review(&state, &caller.tenant_id, &venue_id, &review_id).await?;

    // Local guard first: never hit the platform for an already-replied review.
    if review.is_replied {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "ALREADY_REPLIED",
            "This review already has a reply",
        ));
    }

    let platform = state
        .registry
        .get(&connection.platform)
        .map_err(|e| anyhow::anyhow!(e))?;
    let access_token = state.token_manager.ensure_access_token(&connection).await?;

    platform
        .post_reply(&access_token, &review.remote_review_id, body)
        .await
        .map_err(|err| {
            tracing::warn!(
                review_id = %review_id,
                platform = %connection.platform,
                error = %err,
                "Publishing reply failed upstream"
            );
            let mut api_err = error::platform_error(
                &connection.platform,
                err.reason_code(),
                Some(err.to_string()),
            );
            if let Some(seconds) = err.retry_after() {
                api_err = api_err.with_retry_after(seconds);
            }
            api_err
        })?;

    let updated = state
        .review_repo
        .set_reply(&review_id, body, Utc::now())
        .await?;

    tracing::info!(
        review_id = %review_id,
        platform = %connection.platform,
        "Reply published"
    );
    metrics::counter!("review_replies_total").increment(1);

    Ok(Json(ReviewInfo::from_model(
        updated,
        connection.platform.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::prelude::DateTimeWithTimeZone;

    fn review_with(rating: Option<i16>, is_replied: bool) -> review::Model {
        let now: DateTimeWithTimeZone = Utc::now().into();
        review::Model {
            id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            remote_review_id: format!("reviews/{}", Uuid::new_v4()),
            reviewer_name: None,
            reviewer_photo_url: None,
            rating,
            body: None,
            submitted_at: Some(now),
            reply_text: is_replied.then(|| "thanks".to_string()),
            replied_at: is_replied.then(|| now),
            is_replied,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stats_counts_and_breakdown() {
        let reviews = vec![
            review_with(Some(5), true),
            review_with(Some(5), false),
            review_with(Some(2), false),
            review_with(None, false),
        ];
        let stats = compute_stats(&reviews);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.responded, 1);
        assert_eq!(stats.unresponded, 3);
        assert_eq!(stats.rating_breakdown, [0, 1, 0, 0, 2]);
        // (5 + 5 + 2) / 3 = 4.0; the unrated review is excluded
        assert_eq!(stats.avg_rating, Some(4.0));
    }

    #[test]
    fn test_stats_without_rated_reviews() {
        let reviews = vec![review_with(None, false), review_with(None, true)];
        let stats = compute_stats(&reviews);
        assert_eq!(stats.avg_rating, None);
        assert_eq!(stats.rating_breakdown, [0; 5]);
    }

    #[test]
    fn test_stats_empty() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_rating, None);
    }

    #[test]
    fn test_avg_rating_rounds_to_two_decimals() {
        let reviews = vec![
            review_with(Some(5), false),
            review_with(Some(4), false),
            review_with(Some(4), false),
        ];
        let stats = compute_stats(&reviews);
        // 13 / 3 = 4.333...
        assert_eq!(stats.avg_rating, Some(4.33));
    }
}
