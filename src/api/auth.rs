//! Authentication API endpoints
//!
//! - POST /api/token/ - Issue an access/refresh token pair
//! - POST /api/token/refresh/ - Exchange a refresh token for an access token
//! - POST /api/register/ - User registration
//! - GET /api/me/ - Get current user

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, ClientIp};
use crate::models::{CreateUserInput, User};
use crate::services::UserServiceError;

/// Request body for the token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessResponse {
    pub access: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/token/", post(issue_token))
        .route("/token/refresh/", post(refresh_token))
        .route("/register/", post(register))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/me/", get(get_current_user))
}

/// POST /api/token/
///
/// Limited to 10 requests per IP per minute and 5 failures per username
/// per 15 minutes.
async fn issue_token(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if let Some(ip) = ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Token request rate limited by IP");
            return Err(ApiError::rate_limited(
                "Too many requests. Please try again later.",
                60,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_username_limited(&body.username).await {
        tracing::warn!(username = %body.username, "Token request rate limited by username");
        return Err(ApiError::rate_limited(
            "Too many failed login attempts. Please try again in 15 minutes.",
            900,
        ));
    }

    match state
        .user_service
        .authenticate(&body.username, &body.password)
        .await
    {
        Ok((user, pair)) => {
            state
                .rate_limiter
                .clear_username_attempts(&body.username)
                .await;
            tracing::info!(user_id = user.id, "Token pair issued");
            Ok(Json(TokenResponse {
                access: pair.access,
                refresh: pair.refresh,
            }))
        }
        Err(e @ UserServiceError::AuthenticationError(_)) => {
            state.rate_limiter.record_failed_attempt(&body.username).await;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/token/refresh/
async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AccessResponse>, ApiError> {
    let access = state.user_service.refresh(&body.refresh)?;
    Ok(Json(AccessResponse { access }))
}

/// POST /api/register/
///
/// Public registration never grants staff.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.user_service.register(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/me/
async fn get_current_user(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}
