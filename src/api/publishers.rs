//! Publisher, journalist and subscription endpoints
//!
//! - GET/POST /api/publishers/, GET /api/publishers/{id}/
//! - POST /api/publishers/{id}/join/, /leave/, /subscribe/
//! - GET /api/journalists/, POST /api/journalists/{id}/subscribe/
//! - GET /api/subscriptions/

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::optional_json;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreatePublisherInput, Publisher, PublisherDetail, PublisherWithCounts, Role,
    SubscriptionState, SubscriptionSummary, UserSummary,
};

/// Optional body for joining a publisher
#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    /// Defaults to the caller's own role
    #[serde(default)]
    pub role: Option<Role>,
}

pub fn publisher_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_publishers).post(create_publisher))
        .route("/{id}/", get(get_publisher))
        .route("/{id}/join/", post(join_publisher))
        .route("/{id}/leave/", post(leave_publisher))
        .route("/{id}/subscribe/", post(toggle_publisher_subscription))
}

pub fn journalist_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_journalists))
        .route("/{id}/subscribe/", post(toggle_journalist_subscription))
}

async fn list_publishers(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> Result<Json<Vec<PublisherWithCounts>>, ApiError> {
    Ok(Json(state.publisher_service.list().await?))
}

/// POST /api/publishers/ (staff only)
async fn create_publisher(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreatePublisherInput>,
) -> Result<(StatusCode, Json<Publisher>), ApiError> {
    let publisher = state.publisher_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(publisher)))
}

async fn get_publisher(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PublisherDetail>, ApiError> {
    Ok(Json(state.publisher_service.detail(id).await?))
}

async fn join_publisher(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<PublisherDetail>, ApiError> {
    let request: JoinRequest = optional_json(&body)?;
    Ok(Json(
        state.publisher_service.join(id, &user, request.role).await?,
    ))
}

async fn leave_publisher(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PublisherDetail>, ApiError> {
    Ok(Json(state.publisher_service.leave(id, &user).await?))
}

/// POST /api/publishers/{id}/subscribe/ (toggle)
async fn toggle_publisher_subscription(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionState>, ApiError> {
    Ok(Json(
        state
            .publisher_service
            .toggle_publisher_subscription(id, &user)
            .await?,
    ))
}

async fn list_journalists(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.user_service.list_journalists().await?))
}

/// POST /api/journalists/{id}/subscribe/ (toggle)
async fn toggle_journalist_subscription(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionState>, ApiError> {
    Ok(Json(
        state
            .publisher_service
            .toggle_journalist_subscription(id, &user)
            .await?,
    ))
}

/// GET /api/subscriptions/
pub async fn list_subscriptions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    Ok(Json(state.publisher_service.subscriptions(&user).await?))
}
