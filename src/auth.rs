//! # Authentication and Authorization
//!
//! JWT bearer authentication for user-facing endpoints, operator bearer
//! authentication for the batch sync trigger, the venue access gate, and
//! the signed state blob that carries caller context through the OAuth
//! redirect round trip.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, forbidden, unauthorized, unauthorized_with_trace_id};
use crate::repositories::VenueGrantRepository;
use crate::telemetry::TraceContext;

/// Caller role carried in JWT claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform staff; access to every venue in every tenant
    Admin,
    /// Tenant owner; access to every venue in their tenant
    Owner,
    /// Needs an explicit venue grant, and the manage-reviews flag for writes
    Manager,
}

/// JWT claims for user requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    /// Expiry as unix seconds
    pub exp: i64,
}

/// Authenticated caller identity extracted from a validated JWT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
}

/// Extractor for the caller identity from request extensions
#[derive(Debug, Clone)]
pub struct CallerExtension(pub CallerIdentity);

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

impl FromRef<crate::server::AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &crate::server::AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware validating user JWTs
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token(&headers, trace_id)?;
    let caller = validate_jwt(&config, token)?;
    tracing::debug!(
        user_id = %caller.user_id,
        tenant_id = %caller.tenant_id,
        role = ?caller.role,
        "Authenticated user request"
    );

    let mut request = request;
    request.extensions_mut().insert(CallerExtension(caller));

    Ok(next.run(request).await)
}

/// Operator authentication middleware for the batch sync trigger
pub async fn operator_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token(&headers, trace_id)?;
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());
    if !is_valid {
        return Err(unauthorized(Some("Invalid operator token")));
    }

    let mut request = request;
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(
    headers: &HeaderMap,
    trace_id: Option<String>,
) -> Result<&str, ApiError> {
    let fail = |message: &str, trace_id: Option<String>| {
        if let Some(trace_id) = trace_id {
            unauthorized_with_trace_id(Some(message), trace_id)
        } else {
            unauthorized(Some(message))
        }
    };

    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| fail("Missing Authorization header", trace_id.clone()))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| fail("Invalid Authorization header", trace_id.clone()))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| fail("Authorization header must use Bearer scheme", trace_id))
        })
}

fn validate_jwt(config: &AppConfig, token: &str) -> Result<CallerIdentity, ApiError> {
    let secret = config
        .auth_jwt_secret
        .as_deref()
        .ok_or_else(|| unauthorized(Some("Authentication is not configured")))?;

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| unauthorized(Some("Invalid bearer token")))?;

    Ok(CallerIdentity {
        user_id: data.claims.sub,
        tenant_id: data.claims.tenant_id,
        role: data.claims.role,
    })
}

/// Issue a signed JWT for the given identity. Used by tests and tooling.
pub fn issue_jwt(
    secret: &str,
    user_id: Uuid,
    tenant_id: Uuid,
    role: Role,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        tenant_id,
        role,
        exp: expires_at.timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Venue access gate.
///
/// Admins pass unconditionally. Owners pass for venues in their own tenant
/// (every venue-scoped query is additionally tenant-filtered in the
/// repository layer). Managers need a venue grant, and the manage-reviews
/// flag when the action writes (sync, reply, connect, disconnect).
pub async fn ensure_venue_access(
    grant_repo: &VenueGrantRepository,
    caller: &CallerIdentity,
    venue_id: Uuid,
    needs_review_management: bool,
) -> Result<(), ApiError> {
    match caller.role {
        Role::Admin | Role::Owner => Ok(()),
        Role::Manager => {
            let grant = grant_repo
                .find(&caller.user_id, &venue_id)
                .await?
                .filter(|g| g.tenant_id == caller.tenant_id);

            match grant {
                Some(grant) if !needs_review_management || grant.can_manage_reviews => Ok(()),
                Some(_) => Err(forbidden(Some(
                    "Managing reviews for this venue is not permitted",
                ))),
                None => Err(forbidden(Some("No access to this venue"))),
            }
        }
    }
}

/// Connection lifecycle gate: connecting and disconnecting platforms are
/// owner-level actions. Managers are rejected even with a review grant.
pub fn ensure_owner_level(caller: &CallerIdentity) -> Result<(), ApiError> {
    match caller.role {
        Role::Admin | Role::Owner => Ok(()),
        Role::Manager => Err(forbidden(Some(
            "Managing platform connections requires an owner role",
        ))),
    }
}

impl<S> FromRequestParts<S> for CallerExtension
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerExtension>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

// --- OAuth state blob -------------------------------------------------------

/// Maximum age of a connect state blob before the callback rejects it
pub const CONNECT_STATE_MAX_AGE_SECONDS: i64 = 900;

/// Caller context carried through the OAuth redirect as a signed blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectState {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub venue_id: Uuid,
    pub platform: String,
    /// Unix seconds at issuance
    pub issued_at: i64,
}

/// Errors from state blob verification
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("malformed state")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state expired")]
    Expired,
}

type HmacSha256 = Hmac<Sha256>;

/// Sign a connect state blob as `base64url(json) "." hex(hmac)`.
pub fn sign_connect_state(secret: &str, state: &ConnectState) -> anyhow::Result<String> {
    let payload = serde_json::to_vec(state)?;
    let encoded = base64_url::encode(&payload);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid state secret: {}", e))?;
    mac.update(encoded.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", encoded, signature))
}

/// Verify a connect state blob's signature and age.
pub fn verify_connect_state(
    secret: &str,
    blob: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<ConnectState, StateError> {
    let (encoded, signature) = blob.split_once('.').ok_or(StateError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| StateError::Malformed)?;
    mac.update(encoded.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    let matches: bool =
        ConstantTimeEq::ct_eq(signature.as_bytes(), expected.as_bytes()).into();
    if !matches {
        return Err(StateError::BadSignature);
    }

    let payload = base64_url::decode(encoded).map_err(|_| StateError::Malformed)?;
    let state: ConnectState =
        serde_json::from_slice(&payload).map_err(|_| StateError::Malformed)?;

    if now.timestamp() - state.issued_at > CONNECT_STATE_MAX_AGE_SECONDS {
        return Err(StateError::Expired);
    }

    Ok(state)
}
