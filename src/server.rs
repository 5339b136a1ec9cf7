//! # Server Configuration
//!
//! This module contains the server setup and configuration for the authgate API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth;
use crate::cleanup::CleanupScheduler;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::db;
use crate::handlers;
use crate::oauth::OAuthFlowCoordinator;
use crate::oauth::provider::{IdentityProvider, OAuth2Provider};
use crate::rate_limit::RateLimiter;
use crate::repositories::{OAuthStateRepository, SessionRepository, UserRepository};
use crate::session::SessionService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub sessions: Arc<SessionService>,
    pub coordinator: Arc<OAuthFlowCoordinator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire the services up from configuration, a connection pool, and an
    /// identity-provider client.
    pub fn build(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("AUTHGATE_CRYPTO_KEY is required"))?;
        let crypto_key = CryptoKey::new(key_bytes)?;

        let sessions = Arc::new(SessionService::new(
            SessionRepository::new(Arc::clone(&db)),
            crypto_key,
            config.session.clone(),
        ));

        let coordinator = Arc::new(OAuthFlowCoordinator::new(
            provider,
            OAuthStateRepository::new(Arc::clone(&db)),
            UserRepository::new(Arc::clone(&db)),
            Arc::clone(&sessions),
            config.provider.redirect_uri.clone().unwrap_or_default(),
            config.provider.allowed_redirect_uris.clone(),
            config.session.state_ttl_seconds,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config,
            db,
            sessions,
            coordinator,
            rate_limiter,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/session", get(handlers::auth::session_info))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/auth/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::callback))
        .route("/auth/logout", post(handlers::auth::logout))
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);

    let db = Arc::new(db::init_pool(&config).await?);
    Migrator::up(db.as_ref(), None).await?;

    let provider: Arc<dyn IdentityProvider> =
        Arc::new(OAuth2Provider::from_config(&config.provider)?);
    let state = AppState::build(Arc::clone(&config), Arc::clone(&db), provider)?;

    let shutdown = CancellationToken::new();
    let cleanup = CleanupScheduler::new(
        config.cleanup.clone(),
        OAuthStateRepository::new(Arc::clone(&db)),
        SessionRepository::new(Arc::clone(&db)),
        Arc::clone(&state.rate_limiter),
    );
    let cleanup_handle = tokio::spawn(cleanup.run(shutdown.clone()));

    let app = create_app(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    let _ = cleanup_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?err, "Failed to listen for shutdown signal");
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::auth::login,
        crate::handlers::auth::callback,
        crate::handlers::auth::session_info,
        crate::handlers::auth::logout,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::SessionResponse,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Authgate API",
        description = "Authentication and session lifecycle service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
