//! Article API endpoints
//!
//! - GET/POST /api/articles/
//! - GET /api/articles/subscribed/
//! - GET/PUT/DELETE /api/articles/{id}/
//! - POST /api/articles/{id}/approve/, /reject/, /resubmit/
//!
//! All routes require authentication. Listing is filtered by the caller's
//! role, and articles the caller may not see answer 404.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{optional_json, PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Article, CreateArticleInput, UpdateArticleInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_articles).post(create_article))
        .route("/subscribed/", get(list_subscribed_articles))
        .route(
            "/{id}/",
            get(get_article).put(update_article).delete(delete_article),
        )
        .route("/{id}/approve/", post(approve_article))
        .route("/{id}/reject/", post(reject_article))
        .route("/{id}/resubmit/", post(resubmit_article))
}

/// GET /api/articles/
async fn list_articles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<Article>>, ApiError> {
    let page = state.article_service.list(&user, &query.params()).await?;
    Ok(Json(page.into()))
}

/// GET /api/articles/subscribed/
async fn list_subscribed_articles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<Article>>, ApiError> {
    let page = state
        .article_service
        .list_subscribed(&user, &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// POST /api/articles/
async fn create_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateArticleInput>,
) -> Result<(StatusCode, Json<Article>), ApiError> {
    let article = state.article_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(article)))
}

async fn get_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.get(&user, id).await?))
}

async fn update_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArticleInput>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.update(&user, id, body).await?))
}

async fn delete_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/articles/{id}/approve/
///
/// Returns once subscriber notifications have been attempted.
async fn approve_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.approve(&user, id).await?))
}

async fn reject_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.reject(&user, id).await?))
}

/// POST /api/articles/{id}/resubmit/
///
/// The body is optional; when present it carries title/content edits.
async fn resubmit_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Article>, ApiError> {
    let changes: UpdateArticleInput = optional_json(&body)?;
    Ok(Json(
        state.article_service.resubmit(&user, id, changes).await?,
    ))
}
