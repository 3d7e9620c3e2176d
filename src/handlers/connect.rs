//! # Connection Handlers
//!
//! OAuth connect flow for review platforms: starting authorization,
//! handling the provider callback, and disconnecting a venue. Caller
//! context travels through the redirect round trip inside a signed state
//! blob, so the callback needs no session.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{CallerExtension, ConnectState, ensure_owner_level, sign_connect_state, verify_connect_state};
use crate::error::ApiError;
use crate::platforms::AuthorizeParams;
use crate::reconcile::ReconcileError;
use crate::server::AppState;

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    /// Complete authorization URL for user redirection
    pub authorize_url: String,
}

fn callback_uri(public_base_url: &str, platform: &str) -> String {
    format!(
        "{}/connect/{}/callback",
        public_base_url.trim_end_matches('/'),
        platform
    )
}

/// Builds the settings-page redirect carrying the flow outcome.
fn settings_redirect(settings_url: &str, params: &[(&str, &str)]) -> Redirect {
    match Url::parse(settings_url) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params.iter().copied());
            Redirect::to(url.as_str())
        }
        Err(_) => Redirect::to(settings_url),
    }
}

/// Validate an authorization URL before handing it to a client
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must use HTTPS",
        ));
    }
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must not include a fragment",
        ));
    }
    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL exceeds 2048 characters",
        ));
    }
    Ok(())
}

/// Start the OAuth flow connecting a venue to a platform
#[utoipa::path(
    post,
    path = "/venues/{venue_id}/connect/{platform}",
    security(("bearer_auth" = [])),
    params(
        ("venue_id" = Uuid, Path, description = "Venue identifier"),
        ("platform" = String, Path, description = "Platform slug (e.g. 'google')")
    ),
    responses(
        (status = 200, description = "OAuth authorization URL generated", body = AuthorizeUrlResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller does not hold an owner-level role", body = ApiError),
        (status = 404, description = "Platform not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn start_connect(
    State(state): State<AppState>,
    CallerExtension(caller): CallerExtension,
    Path((venue_id, platform_slug)): Path<(Uuid, String)>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    ensure_owner_level(&caller)?;

    let platform = state.registry.get(&platform_slug).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("platform '{}' not found", platform_slug),
        )
    })?;

    let state_secret = state
        .config
        .state_secret
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("state secret is not configured"))?;

    let connect_state = ConnectState {
        user_id: caller.user_id,
        tenant_id: caller.tenant_id,
        venue_id,
        platform: platform_slug.clone(),
        issued_at: Utc::now().timestamp(),
    };
    let state_blob = sign_connect_state(state_secret, &connect_state)?;

    let authorize_url = platform
        .authorize_url(AuthorizeParams {
            tenant_id: caller.tenant_id,
            redirect_uri: callback_uri(&state.config.public_base_url, &platform_slug),
            state: state_blob,
        })
        .map_err(|err| {
            tracing::error!(
                platform = %platform_slug,
                error = %err,
                "Failed to build authorization URL"
            );
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to generate authorization URL",
            )
        })?;

    validate_authorize_url(&authorize_url)?;

    tracing::info!(
        venue_id = %venue_id,
        platform = %platform_slug,
        "OAuth flow initiated"
    );

    Ok(Json(AuthorizeUrlResponse {
        authorize_url: authorize_url.to_string(),
    }))
}

/// Query parameters the provider appends to the callback redirect
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// OAuth callback completing the connect flow.
///
/// Always redirects back to the settings page; failures are carried as an
/// `error` query parameter instead of an API error body since the browser
/// is mid-redirect.
#[utoipa::path(
    get,
    path = "/connect/{platform}/callback",
    params(
        ("platform" = String, Path, description = "Platform slug"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "Signed state blob"),
        ("error" = Option<String>, Query, description = "Provider error code")
    ),
    responses(
        (status = 303, description = "Redirect to the settings page with the flow outcome")
    ),
    tag = "connections"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(platform_slug): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let settings_url = state.config.settings_redirect_url.clone();
    let fail = |reason: &str| settings_redirect(&settings_url, &[("error", reason)]);

    if let Some(provider_error) = query.error {
        tracing::info!(
            platform = %platform_slug,
            error = %provider_error,
            "Provider reported an authorization error"
        );
        return fail("denied");
    }

    let Some(state_secret) = state.config.state_secret.as_deref() else {
        tracing::error!("State secret is not configured; cannot verify callback");
        return fail("invalid_state");
    };

    let connect_state = match query
        .state
        .as_deref()
        .ok_or(crate::auth::StateError::Malformed)
        .and_then(|blob| verify_connect_state(state_secret, blob, Utc::now()))
    {
        Ok(verified) => verified,
        Err(err) => {
            tracing::warn!(platform = %platform_slug, error = %err, "Callback state rejected");
            return fail("invalid_state");
        }
    };

    if connect_state.platform != platform_slug {
        tracing::warn!(
            expected = %connect_state.platform,
            got = %platform_slug,
            "Callback platform does not match state"
        );
        return fail("invalid_state");
    }

    let Some(code) = query.code.as_deref() else {
        return fail("missing_code");
    };

    let Ok(platform) = state.registry.get(&platform_slug) else {
        return fail("unknown_platform");
    };

    let redirect_uri = callback_uri(&state.config.public_base_url, &platform_slug);
    let grant = match platform.exchange_code(code, &redirect_uri).await {
        Ok(grant) => grant,
        Err(err) => {
            tracing::warn!(platform = %platform_slug, error = %err, "Code exchange failed");
            return fail("exchange_failed");
        }
    };

    let accounts = match platform.list_accounts(&grant.access_token).await {
        Ok(accounts) => accounts,
        Err(err) => {
            tracing::warn!(
                platform = %platform_slug,
                error = %err,
                "Account listing failed during connect; storing connection without an account"
            );
            Vec::new()
        }
    };
    let account_id = accounts
        .first()
        .map(|a| a.remote_account_id.clone())
        .unwrap_or_default();

    let connection = match state
        .connection_repo
        .upsert_from_grant(
            connect_state.tenant_id,
            connect_state.venue_id,
            &platform_slug,
            &account_id,
            &grant,
        )
        .await
    {
        Ok(connection) => connection,
        Err(err) => {
            tracing::error!(error = %err, "Failed to persist connection");
            return fail("store_failed");
        }
    };

    // Discover locations right away so the venue is usable without waiting
    // for the next batch sync. The connection survives discovery failures.
    match state
        .reconciler
        .discover_locations(&connection, platform.as_ref(), &grant.access_token)
        .await
    {
        Ok(locations) => {
            tracing::info!(
                venue_id = %connect_state.venue_id,
                platform = %platform_slug,
                locations = locations.len(),
                "Connection established"
            );
        }
        Err(ReconcileError::NoAccountsFound { .. }) => {
            tracing::warn!(
                venue_id = %connect_state.venue_id,
                platform = %platform_slug,
                "Connected identity manages no accounts"
            );
            return settings_redirect(
                &settings_url,
                &[
                    ("error", "no_accounts"),
                    ("venue_id", &connect_state.venue_id.to_string()),
                ],
            );
        }
        Err(err) => {
            tracing::warn!(
                venue_id = %connect_state.venue_id,
                platform = %platform_slug,
                error = %err,
                "Initial location discovery failed; connection kept"
            );
        }
    }

    settings_redirect(
        &settings_url,
        &[
            ("connected", platform_slug.as_str()),
            ("venue_id", &connect_state.venue_id.to_string()),
        ],
    )
}

/// Disconnect a venue from a platform
#[utoipa::path(
    delete,
    path = "/venues/{venue_id}/connections/{platform}",
    security(("bearer_auth" = [])),
    params(
        ("venue_id" = Uuid, Path, description = "Venue identifier"),
        ("platform" = String, Path, description = "Platform slug")
    ),
    responses(
        (status = 204, description = "Connection removed"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller does not hold an owner-level role", body = ApiError),
        (status = 404, description = "No connection for this venue and platform", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    CallerExtension(caller): CallerExtension,
    Path((venue_id, platform_slug)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    ensure_owner_level(&caller)?;

    let deleted = state
        .connection_repo
        .delete_by_venue_platform(&caller.tenant_id, &venue_id, &platform_slug)
        .await?;

    if !deleted {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!(
                "venue '{}' has no {} connection",
                venue_id, platform_slug
            ),
        ));
    }

    tracing::info!(
        venue_id = %venue_id,
        platform = %platform_slug,
        "Connection removed"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_uri_joins_cleanly() {
        assert_eq!(
            callback_uri("https://api.example.com", "google"),
            "https://api.example.com/connect/google/callback"
        );
        assert_eq!(
            callback_uri("https://api.example.com/", "google"),
            "https://api.example.com/connect/google/callback"
        );
    }

    #[test]
    fn test_validate_authorize_url() {
        let valid = Url::parse("https://accounts.google.com/o/oauth2/v2/auth?state=abc").unwrap();
        assert!(validate_authorize_url(&valid).is_ok());

        let http = Url::parse("http://accounts.google.com/o/oauth2/v2/auth").unwrap();
        assert!(validate_authorize_url(&http).is_err());

        let fragment = Url::parse("https://accounts.google.com/auth#frag").unwrap();
        assert!(validate_authorize_url(&fragment).is_err());

        let mut long = "https://accounts.google.com/auth?".to_string();
        long.push_str(&"a".repeat(2048));
        let long = Url::parse(&long).unwrap();
        assert!(validate_authorize_url(&long).is_err());
    }
}
