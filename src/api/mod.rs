//! API layer - HTTP handlers and routing
//!
//! All endpoints are JSON under `/api`:
//! - Token issuance, refresh and registration (public)
//! - Article endpoints, including the review actions
//! - Newsletter endpoints
//! - Publisher, journalist and subscription endpoints
//!
//! `/health` sits outside `/api` and needs no token.

pub mod articles;
pub mod auth;
pub mod common;
pub mod middleware;
pub mod newsletters;
pub mod publishers;


use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxNewsletterRepository, SqlxPublisherRepository,
    SqlxSubscriptionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::events::{EventBus, EventKind, PRIORITY_DEFAULT, PRIORITY_LATE};
use crate::services::{
    ArticleService, JwtService, LoginRateLimiter, Mailer, NewsletterService,
    NotificationDispatcher, PublisherService, TwitterAnnouncer, UserService,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Wire repositories, services and approval handlers into the shared state
pub async fn build_state(
    pool: DynDatabasePool,
    config: &Config,
    mailer: Arc<dyn Mailer>,
) -> Result<AppState> {
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let publisher_repo = SqlxPublisherRepository::boxed(pool.clone());
    let subscription_repo = SqlxSubscriptionRepository::boxed(pool.clone());
    let article_repo = SqlxArticleRepository::boxed(pool.clone());
    let newsletter_repo = SqlxNewsletterRepository::boxed(pool.clone());

    let events = Arc::new(EventBus::new());
    let dispatcher = NotificationDispatcher::new(
        subscription_repo.clone(),
        mailer,
        config.mail.site_url.clone(),
    );
    events
        .subscribe(EventKind::ArticleApproved, Arc::new(dispatcher), PRIORITY_DEFAULT)
        .await;

    if let Some(token) = config
        .social
        .twitter_bearer_token
        .as_ref()
        .filter(|t| !t.trim().is_empty())
    {
        let announcer = TwitterAnnouncer::new(token.clone())?;
        events
            .subscribe(EventKind::ArticleApproved, Arc::new(announcer), PRIORITY_LATE)
            .await;
        tracing::info!("Twitter announcements enabled");
    }

    let user_service = Arc::new(UserService::new(
        user_repo.clone(),
        JwtService::from_config(&config.auth),
    ));
    let publisher_service = Arc::new(PublisherService::new(
        publisher_repo.clone(),
        subscription_repo,
        user_repo,
    ));
    let article_service = Arc::new(ArticleService::new(
        article_repo.clone(),
        publisher_repo,
        events,
    ));
    let newsletter_service = Arc::new(NewsletterService::new(newsletter_repo, article_repo));

    Ok(AppState {
        pool,
        user_service,
        publisher_service,
        article_service,
        newsletter_service,
        rate_limiter: Arc::new(LoginRateLimiter::new()),
    })
}

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid access token)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .nest("/articles", articles::router())
        .nest("/newsletters", newsletters::router())
        .nest("/publishers", publishers::publisher_router())
        .nest("/journalists", publishers::journalist_router())
        .route("/subscriptions/", get(publishers::list_subscriptions))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(auth::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            tracing::warn!("Invalid CORS origin '{}': {}, allowing any", cors_origin, e);
            AllowOrigin::any()
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness plus database ping
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.pool.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "ok" })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unreachable" })),
            )
        }
    }
}
