//! Shared test harness: in-memory database, a scriptable review platform,
//! and application state wiring.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{Database, DatabaseConnection};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use revsync::config::AppConfig;
use revsync::crypto::CryptoKey;
use revsync::migration::{Migrator, MigratorTrait};
use revsync::models::connection;
use revsync::orchestrator::SyncOrchestrator;
use revsync::platforms::{
    AuthorizeParams, PlatformRegistry, RemoteAccount, RemoteLocation, RemoteRating, RemoteReview,
    ReviewPage, ReviewPlatform, TokenGrant, UpstreamError,
};
use revsync::rating_cache::RatingCache;
use revsync::reconcile::ReviewReconciler;
use revsync::repositories::{
    CachedRatingRepository, ConnectionRepository, LocationRepository, ReviewRepository,
    VenueGrantRepository,
};
use revsync::server::AppState;
use revsync::token_refresh::TokenRefreshManager;

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

/// A scriptable in-process platform. Every operation returns whatever the
/// test loaded into the corresponding slot.
pub struct StubPlatform {
    slug: &'static str,
    pub accounts: Mutex<Result<Vec<RemoteAccount>, UpstreamError>>,
    pub locations: Mutex<Result<Vec<RemoteLocation>, UpstreamError>>,
    /// Review pages served in order; page tokens are page indexes
    pub review_pages: Mutex<Vec<ReviewPage>>,
    /// When set, review listings for this remote location id fail
    pub failing_location: Mutex<Option<String>>,
    pub rating: Mutex<Result<RemoteRating, UpstreamError>>,
    pub refresh_result: Mutex<Result<TokenGrant, UpstreamError>>,
    pub reply_result: Mutex<Result<(), UpstreamError>>,
    pub refresh_calls: AtomicUsize,
    pub reply_calls: AtomicUsize,
}

pub fn account(id: &str) -> RemoteAccount {
    RemoteAccount {
        remote_account_id: id.to_string(),
        display_name: Some("Test Account".to_string()),
    }
}

pub fn remote_location(id: &str, name: &str) -> RemoteLocation {
    RemoteLocation {
        remote_location_id: id.to_string(),
        display_name: name.to_string(),
        address: Some("1 Main St, Springfield".to_string()),
        phone: None,
        website: None,
    }
}

pub fn remote_review(id: &str, rating: &str, body: &str) -> RemoteReview {
    RemoteReview {
        remote_review_id: id.to_string(),
        reviewer_name: Some("Ada".to_string()),
        reviewer_photo_url: None,
        rating_raw: Some(rating.to_string()),
        body: Some(body.to_string()),
        submitted_at: Some(Utc::now()),
        reply_text: None,
        replied_at: None,
    }
}

pub fn single_page(reviews: Vec<RemoteReview>) -> Vec<ReviewPage> {
    vec![ReviewPage {
        reviews,
        next_page_token: None,
        average_rating: None,
        total_review_count: None,
    }]
}

/// Chains pages so each points at the next by index.
pub fn chained_pages(pages: Vec<Vec<RemoteReview>>) -> Vec<ReviewPage> {
    let count = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(index, reviews)| ReviewPage {
            reviews,
            next_page_token: (index + 1 < count).then(|| (index + 1).to_string()),
            average_rating: None,
            total_review_count: None,
        })
        .collect()
}

pub fn grant_expiring_in(seconds: i64) -> TokenGrant {
    TokenGrant {
        access_token: "access-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Some(Utc::now() + Duration::seconds(seconds)),
        scopes: None,
    }
}

impl StubPlatform {
    pub fn new(slug: &'static str) -> Self {
        Self {
            slug,
            accounts: Mutex::new(Ok(vec![account("accounts/a1")])),
            locations: Mutex::new(Ok(vec![remote_location("locations/l1", "Main Street")])),
            review_pages: Mutex::new(single_page(Vec::new())),
            failing_location: Mutex::new(None),
            rating: Mutex::new(Ok(RemoteRating {
                rating: 4.5,
                rating_count: 10,
                attribution: Some("Powered by Test".to_string()),
            })),
            refresh_result: Mutex::new(Ok(grant_expiring_in(3600))),
            reply_result: Mutex::new(Ok(())),
            refresh_calls: AtomicUsize::new(0),
            reply_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reviews(&self, reviews: Vec<RemoteReview>) {
        *self.review_pages.lock().unwrap() = single_page(reviews);
    }

    pub fn set_pages(&self, pages: Vec<ReviewPage>) {
        *self.review_pages.lock().unwrap() = pages;
    }

    pub fn set_locations(&self, locations: Vec<RemoteLocation>) {
        *self.locations.lock().unwrap() = Ok(locations);
    }

    pub fn set_accounts(&self, accounts: Vec<RemoteAccount>) {
        *self.accounts.lock().unwrap() = Ok(accounts);
    }

    pub fn fail_accounts(&self, err: UpstreamError) {
        *self.accounts.lock().unwrap() = Err(err);
    }

    pub fn fail_reviews_for(&self, remote_location_id: &str) {
        *self.failing_location.lock().unwrap() = Some(remote_location_id.to_string());
    }

    pub fn set_rating(&self, result: Result<RemoteRating, UpstreamError>) {
        *self.rating.lock().unwrap() = result;
    }

    pub fn set_refresh(&self, result: Result<TokenGrant, UpstreamError>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    pub fn set_reply(&self, result: Result<(), UpstreamError>) {
        *self.reply_result.lock().unwrap() = result;
    }
}

#[async_trait]
impl ReviewPlatform for StubPlatform {
    fn slug(&self) -> &'static str {
        self.slug
    }

    fn authorize_url(&self, params: AuthorizeParams) -> Result<Url, UpstreamError> {
        let mut url = Url::parse("https://auth.example.com/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("state", &params.state);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, UpstreamError> {
        Ok(grant_expiring_in(3600))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, UpstreamError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_result.lock().unwrap().clone()
    }

    async fn list_accounts(
        &self,
        _access_token: &str,
    ) -> Result<Vec<RemoteAccount>, UpstreamError> {
        self.accounts.lock().unwrap().clone()
    }

    async fn list_locations(
        &self,
        _access_token: &str,
        _remote_account_id: &str,
    ) -> Result<Vec<RemoteLocation>, UpstreamError> {
        self.locations.lock().unwrap().clone()
    }

    async fn list_reviews(
        &self,
        _access_token: &str,
        remote_location_id: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewPage, UpstreamError> {
        if self
            .failing_location
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|id| id == remote_location_id)
        {
            return Err(UpstreamError::Http {
                status: 500,
                body: None,
            });
        }
        let index = page_token
            .map(|t| t.parse::<usize>().unwrap_or(0))
            .unwrap_or(0);
        self.review_pages
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .ok_or_else(|| UpstreamError::InvalidResource {
                detail: format!("no page {}", index),
            })
    }

    async fn fetch_rating(
        &self,
        _access_token: &str,
        _remote_location_id: &str,
    ) -> Result<RemoteRating, UpstreamError> {
        self.rating.lock().unwrap().clone()
    }

    async fn post_reply(
        &self,
        _access_token: &str,
        _remote_review_id: &str,
        _body: &str,
    ) -> Result<(), UpstreamError> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        self.reply_result.lock().unwrap().clone()
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec!["op-token".to_string()],
        crypto_key: Some(vec![7u8; 32]),
        auth_jwt_secret: Some("jwt-test-secret".to_string()),
        state_secret: Some("state-test-secret".to_string()),
        ..AppConfig::default()
    };
    // No pacing in tests
    config.sync.pace_ms = 0;
    config
}

/// Wires an [`AppState`] over the given database with the provided platforms
/// registered.
pub fn build_state(
    db: DatabaseConnection,
    platforms: Vec<Arc<dyn ReviewPlatform>>,
) -> AppState {
    let config = Arc::new(test_config());
    let db = Arc::new(db);

    let mut registry = PlatformRegistry::new();
    for platform in platforms {
        registry.register(platform);
    }
    let registry = Arc::new(registry);

    let crypto_key = CryptoKey::new(config.crypto_key.clone().unwrap()).unwrap();
    let connection_repo = Arc::new(ConnectionRepository::new(Arc::clone(&db), crypto_key));
    let location_repo = Arc::new(LocationRepository::new(Arc::clone(&db)));
    let review_repo = Arc::new(ReviewRepository::new(Arc::clone(&db)));
    let rating_repo = Arc::new(CachedRatingRepository::new(Arc::clone(&db)));
    let grant_repo = Arc::new(VenueGrantRepository::new(Arc::clone(&db)));

    let token_manager = Arc::new(TokenRefreshManager::new(
        Arc::clone(&config),
        Arc::clone(&connection_repo),
        Arc::clone(&registry),
    ));
    let reconciler = Arc::new(ReviewReconciler::new(
        Arc::clone(&config),
        Arc::clone(&connection_repo),
        Arc::clone(&location_repo),
        Arc::clone(&review_repo),
        Arc::clone(&registry),
        Arc::clone(&token_manager),
    ));
    let rating_cache = Arc::new(RatingCache::new(
        Arc::clone(&config),
        Arc::clone(&connection_repo),
        Arc::clone(&location_repo),
        Arc::clone(&rating_repo),
        Arc::clone(&registry),
        Arc::clone(&token_manager),
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&config),
        Arc::clone(&connection_repo),
        Arc::clone(&reconciler),
    ));

    AppState {
        config,
        db,
        registry,
        connection_repo,
        location_repo,
        review_repo,
        rating_repo,
        grant_repo,
        token_manager,
        reconciler,
        rating_cache,
        orchestrator,
        shutdown: CancellationToken::new(),
    }
}

/// Seeds an active connection for the venue, tokens expiring in
/// `expires_in_secs` seconds.
pub async fn seed_connection(
    state: &AppState,
    tenant_id: Uuid,
    venue_id: Uuid,
    platform: &str,
    expires_in_secs: i64,
) -> connection::Model {
    state
        .connection_repo
        .upsert_from_grant(
            tenant_id,
            venue_id,
            platform,
            "accounts/a1",
            &grant_expiring_in(expires_in_secs),
        )
        .await
        .expect("seed connection")
}
