//! # Review Reconciliation
//!
//! Pulls reviews from a platform and reconciles them into local storage.
//! Upserts are keyed on the remote review identifier: a review is new on
//! first sight and counts as updated on every later pass. Each location is
//! reconciled independently, so one location failing upstream never stops
//! its siblings. Location discovery lives here too: accounts are listed,
//! their locations upserted, and locations the platform stopped reporting
//! are soft-disabled.

use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{connection, location};
use crate::platforms::{PlatformRegistry, ReviewPlatform, UpstreamError};
use crate::repositories::{
    ConnectionRepository, LocationRepository, ReviewRepository, UpsertOutcome,
};
use crate::token_refresh::{RefreshError, TokenRefreshManager};

/// Errors from a reconciliation run
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("the authorized identity manages no accounts on {platform}")]
    NoAccountsFound { platform: String },
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("upstream call failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Counters from reconciling one or more locations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct ReconcileSummary {
    /// Reviews seen upstream
    pub total: u64,
    /// Reviews inserted for the first time
    pub new: u64,
    /// Existing reviews whose content changed
    pub updated: u64,
    /// Reviews stored with a NULL rating because the upstream value was unparseable
    pub unrated: u64,
}

impl ReconcileSummary {
    pub fn absorb(&mut self, other: ReconcileSummary) {
        self.total += other.total;
        self.new += other.new;
        self.updated += other.updated;
        self.unrated += other.unrated;
    }
}

/// Per-location result inside a connection sync
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LocationSyncReport {
    pub location_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub reviews: ReconcileSummary,
}

/// A location that failed to reconcile during a connection sync
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LocationSyncError {
    pub location_id: Uuid,
    pub name: String,
    pub error: String,
}

/// Result of syncing a single connection
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ConnectionSyncSummary {
    pub connection_id: Uuid,
    pub platform: String,
    pub locations_synced: u64,
    pub locations: Vec<LocationSyncReport>,
    /// Locations that failed; their siblings still reconciled
    pub location_errors: Vec<LocationSyncError>,
    #[serde(flatten)]
    pub reviews: ReconcileSummary,
}

/// Normalize a platform rating value to a 1..=5 star count.
///
/// Accepts the Google star enum ("ONE".."FIVE") and integer or decimal
/// strings. Anything else maps to `None` and the review is stored unrated.
pub fn normalize_rating(raw: Option<&str>) -> Option<i16> {
    let raw = raw?.trim();
    match raw.to_ascii_uppercase().as_str() {
        "ONE" => return Some(1),
        "TWO" => return Some(2),
        "THREE" => return Some(3),
        "FOUR" => return Some(4),
        "FIVE" => return Some(5),
        _ => {}
    }

    let value: f64 = raw.parse().ok()?;
    if !(1.0..=5.0).contains(&value) {
        return None;
    }
    Some(value.round() as i16)
}

/// Reconciles upstream reviews and locations into local storage
pub struct ReviewReconciler {
    config: Arc<AppConfig>,
    connection_repo: Arc<ConnectionRepository>,
    location_repo: Arc<LocationRepository>,
    review_repo: Arc<ReviewRepository>,
    registry: Arc<PlatformRegistry>,
    token_manager: Arc<TokenRefreshManager>,
    /// Per-location sync locks so overlapping syncs of the same location serialize
    location_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ReviewReconciler {
    pub fn new(
        config: Arc<AppConfig>,
        connection_repo: Arc<ConnectionRepository>,
        location_repo: Arc<LocationRepository>,
        review_repo: Arc<ReviewRepository>,
        registry: Arc<PlatformRegistry>,
        token_manager: Arc<TokenRefreshManager>,
    ) -> Self {
        Self {
            config,
            connection_repo,
            location_repo,
            review_repo,
            registry,
            token_manager,
            location_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sync one connection end to end: refresh credentials if needed,
    /// rediscover locations, then reconcile reviews per active location
    /// with pacing between upstream fetches.
    ///
    /// A location failing upstream is recorded in the summary and its
    /// siblings still reconcile. `cancel` is checked between locations so
    /// an in-flight sync stops cleanly at shutdown.
    #[instrument(skip_all, fields(connection_id = %connection.id, platform = %connection.platform))]
    pub async fn sync_connection(
        &self,
        connection: &connection::Model,
        cancel: &CancellationToken,
    ) -> Result<ConnectionSyncSummary, ReconcileError> {
        let platform = self
            .registry
            .get(&connection.platform)
            .map_err(|e| anyhow::anyhow!(e))?;
        let access_token = self.token_manager.ensure_access_token(connection).await?;

        let locations = self
            .discover_locations(connection, platform.as_ref(), &access_token)
            .await?;

        let pace = TokioDuration::from_millis(self.config.sync.pace_ms);
        let mut reviews = ReconcileSummary::default();
        let mut reports = Vec::new();
        let mut location_errors = Vec::new();

        for (index, location) in locations.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Connection sync cancelled, stopping between locations");
                break;
            }
            if index > 0 && !pace.is_zero() {
                sleep(pace).await;
            }
            match self
                .reconcile_location(platform.as_ref(), &access_token, location)
                .await
            {
                Ok(summary) => {
                    reviews.absorb(summary);
                    reports.push(LocationSyncReport {
                        location_id: location.id,
                        name: location.display_name.clone(),
                        reviews: summary,
                    });
                }
                Err(err) => {
                    warn!(
                        location_id = %location.id,
                        error = %err,
                        "Location reconcile failed, continuing with remaining locations"
                    );
                    counter!("location_sync_failures_total").increment(1);
                    location_errors.push(LocationSyncError {
                        location_id: location.id,
                        name: location.display_name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let locations_synced = reports.len() as u64;
        info!(
            locations = locations_synced,
            failed_locations = location_errors.len(),
            total = reviews.total,
            new = reviews.new,
            updated = reviews.updated,
            "Connection sync complete"
        );

        Ok(ConnectionSyncSummary {
            connection_id: connection.id,
            platform: connection.platform.clone(),
            locations_synced,
            locations: reports,
            location_errors,
            reviews,
        })
    }

    /// Reconcile exactly one known location, refreshing credentials if
    /// needed. Used by the on-demand venue sync when a location is named.
    pub async fn sync_single_location(
        &self,
        connection: &connection::Model,
        location: &location::Model,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let platform = self
            .registry
            .get(&connection.platform)
            .map_err(|e| anyhow::anyhow!(e))?;
        let access_token = self.token_manager.ensure_access_token(connection).await?;
        self.reconcile_location(platform.as_ref(), &access_token, location)
            .await
    }

    /// Rediscover the locations reachable through a connection.
    ///
    /// Locations missing from the latest listing are soft-disabled, never
    /// deleted. A connection whose identity manages no accounts at all is an
    /// error the caller surfaces, but the connection row is kept.
    #[instrument(skip_all, fields(connection_id = %connection.id))]
    pub async fn discover_locations(
        &self,
        connection: &connection::Model,
        platform: &dyn ReviewPlatform,
        access_token: &str,
    ) -> Result<Vec<location::Model>, ReconcileError> {
        let account_ids: Vec<String> = if connection.platform_account_id.is_empty() {
            let accounts = platform.list_accounts(access_token).await?;
            if accounts.is_empty() {
                return Err(ReconcileError::NoAccountsFound {
                    platform: connection.platform.clone(),
                });
            }
            accounts.into_iter().map(|a| a.remote_account_id).collect()
        } else {
            vec![connection.platform_account_id.clone()]
        };

        let mut seen_remote_ids = Vec::new();
        let mut discovered = 0u64;

        for account_id in &account_ids {
            let remote_locations = platform.list_locations(access_token, account_id).await?;
            for remote in &remote_locations {
                let (_, created) = self
                    .location_repo
                    .upsert_remote(connection.id, remote)
                    .await?;
                if created {
                    discovered += 1;
                }
                seen_remote_ids.push(remote.remote_location_id.clone());
            }
        }

        let disabled = self
            .location_repo
            .deactivate_missing(&connection.id, &seen_remote_ids)
            .await?;

        if discovered > 0 || disabled > 0 {
            info!(discovered, disabled, "Location discovery applied changes");
            counter!("locations_discovered_total").increment(discovered);
            counter!("locations_disabled_total").increment(disabled);
        }

        Ok(self
            .location_repo
            .find_active_by_connection(&connection.id)
            .await?)
    }

    /// Reconcile every review page for one location.
    #[instrument(skip_all, fields(location_id = %location.id))]
    pub async fn reconcile_location(
        &self,
        platform: &dyn ReviewPlatform,
        access_token: &str,
        location: &location::Model,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let lock = self.lock_for(location.id).await;
        let _guard = lock.lock().await;

        let mut summary = ReconcileSummary::default();
        let mut page_token: Option<String> = None;
        let max_pages = self.config.sync.max_pages;

        for page_index in 0..max_pages {
            let page = platform
                .list_reviews(access_token, &location.remote_location_id, page_token.as_deref())
                .await?;

            for remote in &page.reviews {
                summary.total += 1;

                let rating = normalize_rating(remote.rating_raw.as_deref());
                if rating.is_none() && remote.rating_raw.is_some() {
                    warn!(
                        remote_review_id = %remote.remote_review_id,
                        rating_raw = ?remote.rating_raw,
                        "Unrecognized rating value, storing review unrated"
                    );
                    summary.unrated += 1;
                    counter!("reviews_unrated_total").increment(1);
                }

                let (_, outcome) = self
                    .review_repo
                    .upsert_remote(location.id, remote, rating)
                    .await?;
                match outcome {
                    UpsertOutcome::Created => summary.new += 1,
                    UpsertOutcome::Updated => summary.updated += 1,
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if page_index + 1 == max_pages {
                        warn!(max_pages, "Review pagination hit the page cap, stopping early");
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        self.location_repo
            .mark_synced(&location.id, chrono::Utc::now())
            .await?;

        counter!("reviews_synced_total").increment(summary.total);
        counter!("reviews_created_total").increment(summary.new);
        counter!("reviews_updated_total").increment(summary.updated);
        debug!(?summary, "Location reconciled");

        Ok(summary)
    }

    async fn lock_for(&self, location_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.location_locks.lock().await;
        locks
            .entry(location_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_enum_values() {
        assert_eq!(normalize_rating(Some("ONE")), Some(1));
        assert_eq!(normalize_rating(Some("TWO")), Some(2));
        assert_eq!(normalize_rating(Some("THREE")), Some(3));
        assert_eq!(normalize_rating(Some("FOUR")), Some(4));
        assert_eq!(normalize_rating(Some("FIVE")), Some(5));
        assert_eq!(normalize_rating(Some("five")), Some(5));
    }

    #[test]
    fn test_numeric_strings() {
        assert_eq!(normalize_rating(Some("4")), Some(4));
        assert_eq!(normalize_rating(Some("4.0")), Some(4));
        assert_eq!(normalize_rating(Some("3.6")), Some(4));
        assert_eq!(normalize_rating(Some(" 5 ")), Some(5));
    }

    #[test]
    fn test_out_of_range_and_garbage_map_to_none() {
        assert_eq!(normalize_rating(Some("0")), None);
        assert_eq!(normalize_rating(Some("6")), None);
        assert_eq!(normalize_rating(Some("-1")), None);
        assert_eq!(normalize_rating(Some("SIX")), None);
        assert_eq!(normalize_rating(Some("great")), None);
        assert_eq!(normalize_rating(Some("")), None);
        assert_eq!(normalize_rating(None), None);
    }

    #[test]
    fn test_summary_absorb() {
        let mut a = ReconcileSummary {
            total: 3,
            new: 2,
            updated: 1,
            unrated: 0,
        };
        a.absorb(ReconcileSummary {
            total: 2,
            new: 0,
            updated: 1,
            unrated: 1,
        });
        assert_eq!(
            a,
            ReconcileSummary {
                total: 5,
                new: 2,
                updated: 2,
                unrated: 1
            }
        );
    }
}
