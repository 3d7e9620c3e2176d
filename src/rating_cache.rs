//! # Rating Cache
//!
//! Cache-aside storage for aggregate venue ratings with a freshness TTL.
//! A fresh cached value is served without touching the platform. When a
//! live fetch fails, any cached value is served regardless of age and
//! flagged stale; callers only see an error when there is nothing cached
//! at all.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::connection::STATUS_ACTIVE;
use crate::platforms::PlatformRegistry;
use crate::repositories::{CachedRatingRepository, ConnectionRepository, LocationRepository};
use crate::token_refresh::{RefreshError, TokenRefreshManager};

/// Errors from a rating lookup
#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    /// The venue has no connection for this platform
    #[error("venue {venue_id} has no {platform} connection")]
    NotConnected { venue_id: Uuid, platform: String },
    /// Live fetch failed and nothing is cached; `reason` is the stable
    /// classification surfaced to clients
    #[error("rating temporarily unavailable ({reason})")]
    Unavailable { reason: &'static str },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A rating lookup result, cached or live
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct RatingResult {
    pub platform: String,
    pub rating: f64,
    pub rating_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// True when served from the cache rather than a live fetch
    pub cached: bool,
    /// True when the cached value is older than the TTL (stale fallback)
    pub stale: bool,
}

/// Whether a cached value fetched at `fetched_at` is still inside the TTL.
pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
    now - fetched_at < Duration::seconds(ttl_seconds as i64)
}

/// Cache-aside aggregate rating lookups with stale fallback
pub struct RatingCache {
    config: Arc<AppConfig>,
    connection_repo: Arc<ConnectionRepository>,
    location_repo: Arc<LocationRepository>,
    rating_repo: Arc<CachedRatingRepository>,
    registry: Arc<PlatformRegistry>,
    token_manager: Arc<TokenRefreshManager>,
}

impl RatingCache {
    pub fn new(
        config: Arc<AppConfig>,
        connection_repo: Arc<ConnectionRepository>,
        location_repo: Arc<LocationRepository>,
        rating_repo: Arc<CachedRatingRepository>,
        registry: Arc<PlatformRegistry>,
        token_manager: Arc<TokenRefreshManager>,
    ) -> Self {
        Self {
            config,
            connection_repo,
            location_repo,
            rating_repo,
            registry,
            token_manager,
        }
    }

    /// Look up the aggregate rating for a venue on one platform.
    ///
    /// `force_refresh` bypasses the freshness check but keeps the stale
    /// fallback behavior on fetch failure.
    #[instrument(skip_all, fields(venue_id = %venue_id, platform = %platform_slug))]
    pub async fn get_rating(
        &self,
        tenant_id: Uuid,
        venue_id: Uuid,
        platform_slug: &str,
        force_refresh: bool,
    ) -> Result<RatingResult, RatingError> {
        let now = Utc::now();
        let ttl = self.config.rating_cache.ttl_seconds;

        let cached = self.rating_repo.find(&venue_id, platform_slug).await?;

        if !force_refresh
            && let Some(ref model) = cached
            && is_fresh(model.fetched_at.into(), now, ttl)
        {
            counter!("rating_cache_hits_total").increment(1);
            return Ok(Self::result_from_cache(platform_slug, model, false));
        }

        match self.fetch_live(tenant_id, venue_id, platform_slug).await {
            Ok(result) => {
                counter!("rating_cache_refreshes_total").increment(1);
                Ok(result)
            }
            Err(RatingError::NotConnected { venue_id, platform }) => {
                Err(RatingError::NotConnected { venue_id, platform })
            }
            Err(RatingError::Store(err)) => Err(RatingError::Store(err)),
            Err(RatingError::Unavailable { reason }) => {
                // Serve whatever we have, however old, before failing.
                if let Some(ref model) = cached {
                    warn!(reason, "Live rating fetch failed, serving stale cache");
                    counter!("rating_cache_stale_served_total").increment(1);
                    return Ok(Self::result_from_cache(platform_slug, model, true));
                }
                counter!("rating_cache_misses_total").increment(1);
                Err(RatingError::Unavailable { reason })
            }
        }
    }

    async fn fetch_live(
        &self,
        tenant_id: Uuid,
        venue_id: Uuid,
        platform_slug: &str,
    ) -> Result<RatingResult, RatingError> {
        let connection = self
            .connection_repo
            .find_by_venue_platform(&tenant_id, &venue_id, platform_slug)
            .await?
            .filter(|c| c.status == STATUS_ACTIVE)
            .ok_or_else(|| RatingError::NotConnected {
                venue_id,
                platform: platform_slug.to_string(),
            })?;

        let platform = self
            .registry
            .get(platform_slug)
            .map_err(|e| anyhow::anyhow!(e))?;

        let access_token = match self.token_manager.ensure_access_token(&connection).await {
            Ok(token) => token,
            Err(RefreshError::Store(err)) => return Err(err.into()),
            Err(RefreshError::Upstream { source, .. }) => {
                return Err(RatingError::Unavailable {
                    reason: source.reason_code(),
                });
            }
            Err(RefreshError::ReauthRequired { .. }) => {
                return Err(RatingError::Unavailable {
                    reason: "unknown_error",
                });
            }
        };

        // The venue's primary location carries the aggregate figure.
        let location = self
            .location_repo
            .find_active_by_connection(&connection.id)
            .await?
            .into_iter()
            .next()
            .ok_or(RatingError::Unavailable {
                reason: "invalid_id",
            })?;

        let remote = platform
            .fetch_rating(&access_token, &location.remote_location_id)
            .await
            .map_err(|err| {
                debug!(error = %err, "Aggregate rating fetch failed");
                RatingError::Unavailable {
                    reason: err.reason_code(),
                }
            })?;

        let now = Utc::now();
        let stored = self
            .rating_repo
            .upsert(tenant_id, venue_id, platform_slug, &remote, now)
            .await?;

        Ok(RatingResult {
            platform: platform_slug.to_string(),
            rating: stored.rating,
            rating_count: stored.rating_count,
            attribution: stored.attribution,
            fetched_at: stored.fetched_at.into(),
            cached: false,
            stale: false,
        })
    }

    fn result_from_cache(
        platform_slug: &str,
        model: &crate::models::cached_rating::Model,
        stale: bool,
    ) -> RatingResult {
        RatingResult {
            platform: platform_slug.to_string(),
            rating: model.rating,
            rating_count: model.rating_count,
            attribution: model.attribution.clone(),
            fetched_at: model.fetched_at.into(),
            cached: true,
            stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86400;

    #[test]
    fn test_value_inside_ttl_is_fresh() {
        let now = Utc::now();
        // 23h59m old with a 24h TTL
        let fetched_at = now - Duration::seconds((DAY - 60) as i64);
        assert!(is_fresh(fetched_at, now, DAY));
    }

    #[test]
    fn test_value_at_ttl_boundary_is_stale() {
        let now = Utc::now();
        let fetched_at = now - Duration::seconds(DAY as i64);
        assert!(!is_fresh(fetched_at, now, DAY));
    }

    #[test]
    fn test_value_past_ttl_is_stale() {
        let now = Utc::now();
        // 24h01m old with a 24h TTL
        let fetched_at = now - Duration::seconds((DAY + 60) as i64);
        assert!(!is_fresh(fetched_at, now, DAY));
    }

    #[test]
    fn test_just_fetched_value_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh(now, now, DAY));
    }
}
