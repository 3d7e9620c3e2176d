//! Review platform trait definition
//!
//! Defines the standard interface that every review platform integration
//! implements, plus the typed upstream error every operation returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

/// Typed error for upstream platform calls.
///
/// Carriers of upstream failure detail. Callers branch on the variant, not
/// on string matching, and [`UpstreamError::reason_code`] provides the
/// stable reason string surfaced in API responses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Quota or rate limit hit upstream
    #[error("rate limited by platform{}", retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },
    /// Credentials rejected (401/403); the connection likely needs re-authorization
    #[error("platform rejected credentials: {detail}")]
    AuthRejected { detail: String },
    /// The referenced remote resource does not exist (404)
    #[error("remote resource not found: {detail}")]
    InvalidResource { detail: String },
    /// Transport-level failure (DNS, connect, timeout)
    #[error("network error: {detail}")]
    Network { detail: String, retryable: bool },
    /// Any other upstream HTTP error status
    #[error("platform returned HTTP {status}")]
    Http { status: u16, body: Option<String> },
    /// Response body did not match the expected shape
    #[error("malformed platform response: {detail}")]
    Malformed { detail: String },
}

impl UpstreamError {
    /// Stable reason code surfaced in API error payloads.
    pub fn reason_code(&self) -> &'static str {
        match self {
            UpstreamError::RateLimited { .. } => "quota_exceeded",
            UpstreamError::InvalidResource { .. } => "invalid_id",
            UpstreamError::Network { .. } => "network_error",
            UpstreamError::AuthRejected { .. }
            | UpstreamError::Http { .. }
            | UpstreamError::Malformed { .. } => "unknown_error",
        }
    }

    /// True when retrying the same call cannot succeed without intervention.
    pub fn is_permanent(&self) -> bool {
        match self {
            UpstreamError::AuthRejected { .. } | UpstreamError::InvalidResource { .. } => true,
            UpstreamError::Network { retryable, .. } => !retryable,
            UpstreamError::Http { status, .. } => (400..500).contains(status),
            UpstreamError::RateLimited { .. } | UpstreamError::Malformed { .. } => false,
        }
    }

    /// Suggested retry delay, when the platform provided one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            UpstreamError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Parameters for building an authorization URL
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub tenant_id: Uuid,
    pub redirect_uri: String,
    pub state: String,
}

/// Token material returned by an OAuth code exchange or refresh
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent on refresh when the platform does not rotate refresh tokens
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
}

/// An account the authorized identity can manage
#[derive(Debug, Clone)]
pub struct RemoteAccount {
    pub remote_account_id: String,
    pub display_name: Option<String>,
}

/// A business location listed under an account
#[derive(Debug, Clone)]
pub struct RemoteLocation {
    pub remote_location_id: String,
    pub display_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

/// A review as reported by the platform, prior to normalization
#[derive(Debug, Clone)]
pub struct RemoteReview {
    pub remote_review_id: String,
    pub reviewer_name: Option<String>,
    pub reviewer_photo_url: Option<String>,
    /// Raw rating value as the platform encodes it ("FIVE", "4", "4.0", ...)
    pub rating_raw: Option<String>,
    pub body: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reply_text: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
}

/// One page of reviews plus the aggregate figures the listing endpoint reports
#[derive(Debug, Clone)]
pub struct ReviewPage {
    pub reviews: Vec<RemoteReview>,
    pub next_page_token: Option<String>,
    pub average_rating: Option<f64>,
    pub total_review_count: Option<i64>,
}

/// Aggregate rating for one location
#[derive(Debug, Clone)]
pub struct RemoteRating {
    pub rating: f64,
    pub rating_count: i64,
    pub attribution: Option<String>,
}

#[async_trait]
pub trait ReviewPlatform: Send + Sync {
    /// Stable platform identifier used in routes and connection rows.
    fn slug(&self) -> &'static str;

    /// Build the URL the venue owner visits to authorize access.
    fn authorize_url(&self, params: AuthorizeParams) -> Result<Url, UpstreamError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, UpstreamError>;

    /// Refresh an access token using the stored refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, UpstreamError>;

    /// List the accounts the authorized identity can manage.
    async fn list_accounts(&self, access_token: &str) -> Result<Vec<RemoteAccount>, UpstreamError>;

    /// List the business locations under an account.
    async fn list_locations(
        &self,
        access_token: &str,
        remote_account_id: &str,
    ) -> Result<Vec<RemoteLocation>, UpstreamError>;

    /// Fetch one page of reviews for a location.
    async fn list_reviews(
        &self,
        access_token: &str,
        remote_location_id: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewPage, UpstreamError>;

    /// Fetch the aggregate rating for a location.
    async fn fetch_rating(
        &self,
        access_token: &str,
        remote_location_id: &str,
    ) -> Result<RemoteRating, UpstreamError>;

    /// Publish a reply to a review.
    async fn post_reply(
        &self,
        access_token: &str,
        remote_review_id: &str,
        body: &str,
    ) -> Result<(), UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(
            UpstreamError::RateLimited {
                retry_after_secs: Some(30)
            }
            .reason_code(),
            "quota_exceeded"
        );
        assert_eq!(
            UpstreamError::InvalidResource {
                detail: "gone".into()
            }
            .reason_code(),
            "invalid_id"
        );
        assert_eq!(
            UpstreamError::Network {
                detail: "timeout".into(),
                retryable: true
            }
            .reason_code(),
            "network_error"
        );
        assert_eq!(
            UpstreamError::Http {
                status: 500,
                body: None
            }
            .reason_code(),
            "unknown_error"
        );
        assert_eq!(
            UpstreamError::Malformed {
                detail: "bad json".into()
            }
            .reason_code(),
            "unknown_error"
        );
    }

    #[test]
    fn test_permanence_classification() {
        assert!(
            UpstreamError::AuthRejected {
                detail: "revoked".into()
            }
            .is_permanent()
        );
        assert!(
            UpstreamError::InvalidResource {
                detail: "gone".into()
            }
            .is_permanent()
        );
        assert!(
            UpstreamError::Http {
                status: 404,
                body: None
            }
            .is_permanent()
        );
        assert!(
            !UpstreamError::Http {
                status: 503,
                body: None
            }
            .is_permanent()
        );
        assert!(
            !UpstreamError::RateLimited {
                retry_after_secs: None
            }
            .is_permanent()
        );
        assert!(
            !UpstreamError::Network {
                detail: "timeout".into(),
                retryable: true
            }
            .is_permanent()
        );
        assert!(
            UpstreamError::Network {
                detail: "dns".into(),
                retryable: false
            }
            .is_permanent()
        );
    }

    #[test]
    fn test_retry_after_hint() {
        let err = UpstreamError::RateLimited {
            retry_after_secs: Some(45),
        };
        assert_eq!(err.retry_after(), Some(45));

        let err = UpstreamError::Http {
            status: 500,
            body: None,
        };
        assert_eq!(err.retry_after(), None);
    }
}
