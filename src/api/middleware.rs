//! API middleware
//!
//! Contains:
//! - Application state shared by all handlers
//! - `ApiError`, the JSON error body and its status mapping
//! - Bearer token authentication
//! - Extractors for the authenticated user and the client IP

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ArticleService, ArticleServiceError, LoginRateLimiter, NewsletterService,
    NewsletterServiceError, PublisherService, PublisherServiceError, UserService,
    UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub publisher_service: Arc<PublisherService>,
    pub article_service: Arc<ArticleService>,
    pub newsletter_service: Arc<NewsletterService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Client address: the socket peer, else the proxy headers
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(peer.or_else(|| forwarded_ip(&parts.headers))))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // First hop is the client
            if let Some(ip) = forwarded_str.split(',').next() {
                return ip.trim().parse().ok();
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new("INVALID_TRANSITION", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    /// Log the cause and return an opaque 500
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" | "INVALID_TRANSITION" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User not found: {}", id)),
            UserServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<PublisherServiceError> for ApiError {
    fn from(e: PublisherServiceError) -> Self {
        match e {
            PublisherServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PublisherServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            PublisherServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            PublisherServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ArticleServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            ArticleServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            e @ ArticleServiceError::InvalidTransition { .. } => {
                ApiError::invalid_transition(e.to_string())
            }
            ArticleServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<NewsletterServiceError> for ApiError {
    fn from(e: NewsletterServiceError) -> Self {
        match e {
            NewsletterServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            NewsletterServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            NewsletterServiceError::NotFound(id) => {
                ApiError::not_found(format!("Newsletter not found: {}", id))
            }
            NewsletterServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
///
/// Accepts only access tokens; a refresh token is rejected with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = match state.user_service.authenticate_token(token).await {
        Ok(user) => user,
        Err(UserServiceError::InternalError(e)) => return Err(ApiError::internal_error(e)),
        Err(e) => {
            tracing::debug!("Rejected bearer token: {}", e);
            return Err(ApiError::unauthorized("Invalid or expired token"));
        }
    };

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}
