//! # Token Refresh Manager
//!
//! Lazy, on-demand OAuth token refresh. Every operation that needs an access
//! token goes through [`TokenRefreshManager::ensure_access_token`], which
//! refreshes when the stored token is inside the expiry skew window.
//! Refreshes are single-flight per connection: concurrent callers for the
//! same connection serialize on a per-connection lock and the winner's
//! result is reused by the rest.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{self, ApiError};
use crate::models::connection;
use crate::platforms::{PlatformRegistry, UpstreamError};
use crate::repositories::ConnectionRepository;

/// Errors from the refresh path
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The refresh token is missing or was rejected; only the venue owner
    /// re-authorizing can recover this connection.
    #[error("connection {connection_id} requires re-authorization: {detail}")]
    ReauthRequired {
        connection_id: Uuid,
        platform: String,
        detail: String,
    },
    /// Transient upstream failure; the stored tokens are untouched.
    #[error("token refresh failed upstream: {source}")]
    Upstream {
        platform: String,
        #[source]
        source: UpstreamError,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::ReauthRequired { platform, .. } => error::reauth_required(&platform),
            RefreshError::Upstream { platform, source } => {
                error::platform_error(&platform, source.reason_code(), Some(source.to_string()))
            }
            RefreshError::Store(err) => err.into(),
        }
    }
}

/// Whether a token expiring at `expires_at` must be refreshed before use.
///
/// A token inside the skew window counts as expired. Tokens without a
/// recorded expiry are used as-is until the platform rejects them.
pub fn needs_refresh(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    skew_seconds: u64,
) -> bool {
    match expires_at {
        Some(expires_at) => expires_at <= now + Duration::seconds(skew_seconds as i64),
        None => false,
    }
}

/// On-demand token refresh with per-connection single-flight protection
pub struct TokenRefreshManager {
    config: Arc<AppConfig>,
    connection_repo: Arc<ConnectionRepository>,
    registry: Arc<PlatformRegistry>,
    /// Per-connection refresh locks; entries are created lazily and reused
    refresh_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TokenRefreshManager {
    pub fn new(
        config: Arc<AppConfig>,
        connection_repo: Arc<ConnectionRepository>,
        registry: Arc<PlatformRegistry>,
    ) -> Self {
        Self {
            config,
            connection_repo,
            registry,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a usable access token for the connection, refreshing first
    /// when the stored token is expired or inside the skew window.
    #[instrument(skip_all, fields(connection_id = %connection.id, platform = %connection.platform))]
    pub async fn ensure_access_token(
        &self,
        connection: &connection::Model,
    ) -> Result<String, RefreshError> {
        let now = Utc::now();
        let skew = self.config.token_refresh.skew_seconds;

        let (access_token, _) = self.connection_repo.decrypt_tokens(connection).await?;

        if let Some(token) = access_token
            && !needs_refresh(connection.expires_at.map(Into::into), now, skew)
        {
            return Ok(token);
        }

        let lock = self.lock_for(connection.id).await;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited on the lock;
        // re-read the row before doing any upstream work.
        let current = self
            .connection_repo
            .get_by_id(&connection.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection {} disappeared", connection.id))?;

        let (access_token, refresh_token) = self.connection_repo.decrypt_tokens(&current).await?;

        if let Some(token) = access_token
            && !needs_refresh(current.expires_at.map(Into::into), Utc::now(), skew)
        {
            debug!("Token already refreshed by concurrent caller");
            return Ok(token);
        }

        self.refresh_now(&current, refresh_token).await
    }

    async fn refresh_now(
        &self,
        connection: &connection::Model,
        refresh_token: Option<String>,
    ) -> Result<String, RefreshError> {
        counter!("token_refresh_attempts_total").increment(1);

        let Some(refresh_token) = refresh_token else {
            warn!("Connection has no refresh token; marking errored");
            self.connection_repo.mark_error(&connection.id).await?;
            counter!("token_refresh_failures_total").increment(1);
            return Err(RefreshError::ReauthRequired {
                connection_id: connection.id,
                platform: connection.platform.clone(),
                detail: "no refresh token stored".to_string(),
            });
        };

        let platform = self
            .registry
            .get(&connection.platform)
            .map_err(|e| anyhow::anyhow!(e))?;

        match platform.refresh_token(&refresh_token).await {
            Ok(grant) => {
                let updated = self
                    .connection_repo
                    .apply_refreshed_tokens(&connection.id, &grant)
                    .await?;
                counter!("token_refresh_successes_total").increment(1);
                info!(
                    expires_at = ?updated.expires_at,
                    "Access token refreshed"
                );
                Ok(grant.access_token)
            }
            Err(UpstreamError::AuthRejected { detail }) => {
                // Dead refresh token. Persisting the error status stops the
                // batch sync from hammering this connection.
                warn!(detail = %detail, "Refresh token rejected; marking connection errored");
                self.connection_repo.mark_error(&connection.id).await?;
                counter!("token_refresh_failures_total").increment(1);
                Err(RefreshError::ReauthRequired {
                    connection_id: connection.id,
                    platform: connection.platform.clone(),
                    detail,
                })
            }
            Err(err) => {
                counter!("token_refresh_failures_total").increment(1);
                Err(RefreshError::Upstream {
                    platform: connection.platform.clone(),
                    source: err,
                })
            }
        }
    }

    async fn lock_for(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
