//! # Server Configuration
//!
//! Application state wiring, router construction, and the serve loop with
//! graceful shutdown.

use std::sync::Arc;

use axum::{
    Router,
    middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::orchestrator::SyncOrchestrator;
use crate::platforms::PlatformRegistry;
use crate::rating_cache::RatingCache;
use crate::reconcile::ReviewReconciler;
use crate::repositories::{
    CachedRatingRepository, ConnectionRepository, LocationRepository, ReviewRepository,
    VenueGrantRepository,
};
use crate::telemetry::trace_middleware;
use crate::token_refresh::TokenRefreshManager;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub registry: Arc<PlatformRegistry>,
    pub connection_repo: Arc<ConnectionRepository>,
    pub location_repo: Arc<LocationRepository>,
    pub review_repo: Arc<ReviewRepository>,
    pub rating_repo: Arc<CachedRatingRepository>,
    pub grant_repo: Arc<VenueGrantRepository>,
    pub token_manager: Arc<TokenRefreshManager>,
    pub reconciler: Arc<ReviewReconciler>,
    pub rating_cache: Arc<RatingCache>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires every component from configuration and an open database pool.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> anyhow::Result<Self> {
        let db = Arc::new(db);

        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("crypto key is not configured"))?;
        let crypto_key =
            CryptoKey::new(key_bytes).map_err(|e| anyhow::anyhow!("invalid crypto key: {}", e))?;

        let registry = Arc::new(PlatformRegistry::from_config(&config)?);
        if registry.is_empty() {
            tracing::warn!("No review platforms registered; connect and sync will be unavailable");
        }

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

        Ok(Self {
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
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/venues/{venue_id}/sync", post(handlers::sync::sync_venue))
        .route(
            "/venues/{venue_id}/reviews",
            get(handlers::reviews::list_reviews),
        )
        .route(
            "/venues/{venue_id}/reviews/{review_id}/reply",
            post(handlers::reviews::reply_to_review),
        )
        .route(
            "/venues/{venue_id}/ratings/{platform}",
            get(handlers::ratings::get_rating),
        )
        .route(
            "/venues/{venue_id}/connect/{platform}",
            post(handlers::connect::start_connect),
        )
        .route(
            "/venues/{venue_id}/connections/{platform}",
            delete(handlers::connect::disconnect),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            crate::auth::auth_middleware,
        ));

    let operator_routes = Router::new()
        .route("/jobs/sync", post(handlers::jobs::run_sync))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            crate::auth::operator_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/connect/{platform}/callback",
            get(handlers::connect::oauth_callback),
        )
        .merge(user_routes)
        .merge(operator_routes)
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server and blocks until shutdown.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("invalid server address: {}", e))?;

    let state = AppState::new(Arc::new(config), db)?;
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::sync::sync_venue,
        crate::handlers::reviews::list_reviews,
        crate::handlers::reviews::reply_to_review,
        crate::handlers::ratings::get_rating,
        crate::handlers::connect::start_connect,
        crate::handlers::connect::oauth_callback,
        crate::handlers::connect::disconnect,
        crate::handlers::jobs::run_sync,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::sync::SyncVenueRequest,
            crate::handlers::sync::SyncVenueResponse,
            crate::handlers::sync::SyncFailure,
            crate::handlers::reviews::ReviewsResponse,
            crate::handlers::reviews::ReviewInfo,
            crate::handlers::reviews::ReviewStats,
            crate::handlers::reviews::ReplyRequest,
            crate::handlers::connect::AuthorizeUrlResponse,
            crate::rating_cache::RatingResult,
            crate::reconcile::ConnectionSyncSummary,
            crate::reconcile::LocationSyncReport,
            crate::reconcile::LocationSyncError,
            crate::reconcile::ReconcileSummary,
            crate::orchestrator::SyncRunSummary,
            crate::orchestrator::SyncErrorEntry,
        )
    ),
    info(
        title = "Revsync API",
        description = "External rating and review synchronization service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
