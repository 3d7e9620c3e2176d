//! Google Business Profile platform implementation
//!
//! Implements OAuth code exchange and refresh against the Google OAuth
//! endpoints, and account/location/review operations against the Business
//! Profile APIs. Base URLs are configurable so tests can point at a mock
//! server.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use url::Url;

use crate::platforms::trait_::{
    AuthorizeParams, RemoteAccount, RemoteLocation, RemoteRating, RemoteReview, ReviewPage,
    ReviewPlatform, TokenGrant, UpstreamError,
};

pub const GOOGLE_PLATFORM_SLUG: &str = "google";

const DEFAULT_AUTHORIZE_BASE: &str = "https://accounts.google.com";
const DEFAULT_OAUTH_BASE: &str = "https://oauth2.googleapis.com";
const DEFAULT_API_BASE: &str = "https://mybusiness.googleapis.com";

const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/business.manage";

/// Google Business Profile platform client
pub struct GooglePlatform {
    client_id: String,
    client_secret: String,
    authorize_base: String,
    oauth_base: String,
    api_base: String,
    http: reqwest::Client,
}

impl GooglePlatform {
    /// Builds a client; `timeout` bounds every outbound call so a hung
    /// upstream cannot stall a sync run.
    pub fn new(
        client_id: String,
        client_secret: String,
        authorize_base: Option<String>,
        oauth_base: Option<String>,
        api_base: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client_id,
            client_secret,
            authorize_base: authorize_base.unwrap_or_else(|| DEFAULT_AUTHORIZE_BASE.to_string()),
            oauth_base: oauth_base.unwrap_or_else(|| DEFAULT_OAUTH_BASE.to_string()),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            http,
        })
    }

    fn network_error(err: reqwest::Error) -> UpstreamError {
        UpstreamError::Network {
            detail: err.to_string(),
            retryable: err.is_timeout() || err.is_connect(),
        }
    }

    /// Map a non-success upstream response to a typed error.
    async fn classify_response(response: reqwest::Response) -> UpstreamError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.ok();

        match status.as_u16() {
            401 | 403 => UpstreamError::AuthRejected {
                detail: body.unwrap_or_else(|| status.to_string()),
            },
            404 => UpstreamError::InvalidResource {
                detail: body.unwrap_or_else(|| status.to_string()),
            },
            429 => UpstreamError::RateLimited { retry_after_secs },
            code => UpstreamError::Http { status: code, body },
        }
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UpstreamError> {
        if !response.status().is_success() {
            return Err(Self::classify_response(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Malformed {
                detail: e.to_string(),
            })
    }

    fn grant_from_token_response(response: TokenResponse) -> TokenGrant {
        TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            scopes: response.scope,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<GoogleAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAccount {
    name: String,
    account_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    locations: Vec<GoogleLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleLocation {
    name: String,
    title: Option<String>,
    storefront_address: Option<GoogleAddress>,
    primary_phone: Option<String>,
    website_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAddress {
    #[serde(default)]
    address_lines: Vec<String>,
    locality: Option<String>,
    administrative_area: Option<String>,
    postal_code: Option<String>,
}

impl GoogleAddress {
    /// Flatten the structured address into one display string.
    fn flatten(&self) -> Option<String> {
        let mut parts: Vec<String> = self.address_lines.clone();
        parts.extend(self.locality.clone());
        parts.extend(self.administrative_area.clone());
        parts.extend(self.postal_code.clone());
        parts.retain(|p| !p.trim().is_empty());
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewsResponse {
    #[serde(default)]
    reviews: Vec<GoogleReview>,
    next_page_token: Option<String>,
    average_rating: Option<f64>,
    total_review_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleReview {
    name: String,
    reviewer: Option<GoogleReviewer>,
    star_rating: Option<String>,
    comment: Option<String>,
    create_time: Option<chrono::DateTime<Utc>>,
    review_reply: Option<GoogleReviewReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleReviewer {
    display_name: Option<String>,
    profile_photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleReviewReply {
    comment: Option<String>,
    update_time: Option<chrono::DateTime<Utc>>,
}

impl From<GoogleReview> for RemoteReview {
    fn from(review: GoogleReview) -> Self {
        let (reviewer_name, reviewer_photo_url) = review
            .reviewer
            .map(|r| (r.display_name, r.profile_photo_url))
            .unwrap_or((None, None));
        let (reply_text, replied_at) = review
            .review_reply
            .map(|r| (r.comment, r.update_time))
            .unwrap_or((None, None));

        RemoteReview {
            remote_review_id: review.name,
            reviewer_name,
            reviewer_photo_url,
            rating_raw: review.star_rating,
            body: review.comment,
            submitted_at: review.create_time,
            reply_text,
            replied_at,
        }
    }
}

#[async_trait]
impl ReviewPlatform for GooglePlatform {
    fn slug(&self) -> &'static str {
        GOOGLE_PLATFORM_SLUG
    }

    fn authorize_url(&self, params: AuthorizeParams) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", self.authorize_base)).map_err(
            |e| UpstreamError::Malformed {
                detail: format!("invalid authorize base: {}", e),
            },
        )?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", OAUTH_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &params.state);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, UpstreamError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(Self::network_error)?;

        let token: TokenResponse = Self::parse_json(response).await?;
        Ok(Self::grant_from_token_response(token))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, UpstreamError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(Self::network_error)?;

        let token: TokenResponse = Self::parse_json(response).await?;
        Ok(Self::grant_from_token_response(token))
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<RemoteAccount>, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/v1/accounts", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(Self::network_error)?;

        let accounts: AccountsResponse = Self::parse_json(response).await?;
        Ok(accounts
            .accounts
            .into_iter()
            .map(|a| RemoteAccount {
                remote_account_id: a.name,
                display_name: a.account_name,
            })
            .collect())
    }

    async fn list_locations(
        &self,
        access_token: &str,
        remote_account_id: &str,
    ) -> Result<Vec<RemoteLocation>, UpstreamError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/{}/locations",
                self.api_base, remote_account_id
            ))
            .bearer_auth(access_token)
            .query(&[(
                "readMask",
                "name,title,storefrontAddress,primaryPhone,websiteUri",
            )])
            .send()
            .await
            .map_err(Self::network_error)?;

        let locations: LocationsResponse = Self::parse_json(response).await?;
        Ok(locations
            .locations
            .into_iter()
            .map(|l| RemoteLocation {
                address: l.storefront_address.as_ref().and_then(|a| a.flatten()),
                remote_location_id: l.name.clone(),
                display_name: l.title.unwrap_or(l.name),
                phone: l.primary_phone,
                website: l.website_uri,
            })
            .collect())
    }

    async fn list_reviews(
        &self,
        access_token: &str,
        remote_location_id: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewPage, UpstreamError> {
        let mut request = self
            .http
            .get(format!(
                "{}/v4/{}/reviews",
                self.api_base, remote_location_id
            ))
            .bearer_auth(access_token);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(Self::network_error)?;
        let page: ReviewsResponse = Self::parse_json(response).await?;

        Ok(ReviewPage {
            reviews: page.reviews.into_iter().map(RemoteReview::from).collect(),
            next_page_token: page.next_page_token,
            average_rating: page.average_rating,
            total_review_count: page.total_review_count,
        })
    }

    async fn fetch_rating(
        &self,
        access_token: &str,
        remote_location_id: &str,
    ) -> Result<RemoteRating, UpstreamError> {
        // The reviews listing carries the aggregate figures; one minimal page
        // is enough.
        let response = self
            .http
            .get(format!(
                "{}/v4/{}/reviews",
                self.api_base, remote_location_id
            ))
            .bearer_auth(access_token)
            .query(&[("pageSize", "1")])
            .send()
            .await
            .map_err(Self::network_error)?;

        let page: ReviewsResponse = Self::parse_json(response).await?;
        let rating = page.average_rating.ok_or_else(|| UpstreamError::Malformed {
            detail: "reviews response missing averageRating".to_string(),
        })?;

        Ok(RemoteRating {
            rating,
            rating_count: page.total_review_count.unwrap_or(0),
            attribution: Some("Powered by Google".to_string()),
        })
    }

    async fn post_reply(
        &self,
        access_token: &str,
        remote_review_id: &str,
        body: &str,
    ) -> Result<(), UpstreamError> {
        let response = self
            .http
            .put(format!(
                "{}/v4/{}/reply",
                self.api_base, remote_review_id
            ))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "comment": body }))
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::classify_response(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn platform() -> GooglePlatform {
        GooglePlatform::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            None,
            None,
            None,
            std::time::Duration::from_secs(5),
        )
        .expect("client builds")
    }

    #[test]
    fn test_authorize_url_contains_offline_consent() {
        let url = platform()
            .authorize_url(AuthorizeParams {
                tenant_id: Uuid::new_v4(),
                redirect_uri: "https://app.example.com/callback".to_string(),
                state: "signed-state".to_string(),
            })
            .expect("url builds");

        assert!(url.as_str().starts_with(
            "https://accounts.google.com/o/oauth2/v2/auth?"
        ));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("prompt".to_string(), "consent".to_string())));
        assert!(pairs.contains(&("state".to_string(), "signed-state".to_string())));
        assert!(pairs.iter().any(|(k, v)| k == "scope" && v.contains("business.manage")));
    }

    #[test]
    fn test_address_flattening() {
        let address = GoogleAddress {
            address_lines: vec!["1 Main St".to_string(), "Suite 4".to_string()],
            locality: Some("Springfield".to_string()),
            administrative_area: Some("IL".to_string()),
            postal_code: Some("62701".to_string()),
        };
        assert_eq!(
            address.flatten().as_deref(),
            Some("1 Main St, Suite 4, Springfield, IL, 62701")
        );

        let empty = GoogleAddress::default();
        assert_eq!(empty.flatten(), None);
    }

    #[test]
    fn test_review_conversion_carries_reply() {
        let review = GoogleReview {
            name: "accounts/1/locations/2/reviews/3".to_string(),
            reviewer: Some(GoogleReviewer {
                display_name: Some("Ada".to_string()),
                profile_photo_url: None,
            }),
            star_rating: Some("FIVE".to_string()),
            comment: Some("Great".to_string()),
            create_time: None,
            review_reply: Some(GoogleReviewReply {
                comment: Some("Thanks!".to_string()),
                update_time: None,
            }),
        };

        let remote: RemoteReview = review.into();
        assert_eq!(remote.remote_review_id, "accounts/1/locations/2/reviews/3");
        assert_eq!(remote.rating_raw.as_deref(), Some("FIVE"));
        assert_eq!(remote.reply_text.as_deref(), Some("Thanks!"));
        assert_eq!(remote.reviewer_name.as_deref(), Some("Ada"));
    }
}
