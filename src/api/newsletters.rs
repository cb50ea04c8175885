//! Newsletter API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateNewsletterInput, Newsletter, UpdateNewsletterInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_newsletters).post(create_newsletter))
        .route(
            "/{id}/",
            get(get_newsletter)
                .put(update_newsletter)
                .delete(delete_newsletter),
        )
}

async fn list_newsletters(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<Newsletter>>, ApiError> {
    let page = state.newsletter_service.list(&user, &query.params()).await?;
    Ok(Json(page.into()))
}

async fn create_newsletter(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateNewsletterInput>,
) -> Result<(StatusCode, Json<Newsletter>), ApiError> {
    let newsletter = state.newsletter_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(newsletter)))
}

async fn get_newsletter(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Newsletter>, ApiError> {
    Ok(Json(state.newsletter_service.get(&user, id).await?))
}

/// PUT /api/newsletters/{id}/
///
/// A present `article_ids` replaces the newsletter's article set.
async fn update_newsletter(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNewsletterInput>,
) -> Result<Json<Newsletter>, ApiError> {
    Ok(Json(state.newsletter_service.update(&user, id, body).await?))
}

async fn delete_newsletter(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.newsletter_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
