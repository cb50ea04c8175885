//! Article service
//!
//! Article authoring and the editorial review lifecycle:
//!
//! ```text
//! pending --approve--> approved
//! pending --reject---> rejected --resubmit--> pending
//! ```
//!
//! Approval commits first and then publishes [`ContentEvent::ArticleApproved`]
//! on the event bus. Handler failures (mail, announcements) never undo an
//! approval and are not reported to the editor.

use crate::db::repositories::{ArticleFields, ArticleRepository, PublisherRepository};
use crate::events::{ContentEvent, EventBus};
use crate::models::{
    Article, ArticleStatus, CreateArticleInput, ListParams, PagedResult, Permission,
    ReviewDecision, Role, Transition, UpdateArticleInput, User,
};
use crate::services::permissions::{self, Denied};
use anyhow::Context;
use std::sync::Arc;

const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The requested status change is not reachable from the current status
    #[error("Cannot {action} an article that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: ArticleStatus,
    },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<Denied> for ArticleServiceError {
    fn from(denied: Denied) -> Self {
        Self::PermissionDenied(denied.0)
    }
}

fn article_not_found(id: i64) -> ArticleServiceError {
    ArticleServiceError::NotFound(format!("Article {}", id))
}

pub struct ArticleService {
    article_repo: Arc<dyn ArticleRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    events: Arc<EventBus>,
}

impl ArticleService {
    pub fn new(
        article_repo: Arc<dyn ArticleRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            article_repo,
            publisher_repo,
            events,
        }
    }

    /// Create a pending article.
    ///
    /// The author does not need to be a member of the publisher.
    pub async fn create(
        &self,
        actor: &User,
        input: CreateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        permissions::can_create_article(actor)?;

        let fields = ArticleFields {
            title: input.title.trim().to_string(),
            content: input.content,
            publisher_id: input.publisher_id,
        };
        self.validate_fields(&fields).await?;

        let article = self
            .article_repo
            .create(actor.id, &fields)
            .await
            .context("Failed to create article")?;

        tracing::info!(
            article_id = article.id,
            author = actor.id,
            publisher = ?article.publisher_id,
            "Article submitted for review"
        );
        Ok(article)
    }

    /// Get an article the actor may see. Invisible articles are not found.
    pub async fn get(&self, actor: &User, id: i64) -> Result<Article, ArticleServiceError> {
        let article = self.require_article(id).await?;
        if !self.can_view(actor, &article).await? {
            return Err(article_not_found(id));
        }
        Ok(article)
    }

    pub async fn list(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let (items, total) = self
            .article_repo
            .list_visible(permissions::article_visibility(actor), params)
            .await
            .context("Failed to list articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Approved articles from publishers and journalists the actor follows
    pub async fn list_subscribed(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let (items, total) = self
            .article_repo
            .list_subscribed(actor.id, params)
            .await
            .context("Failed to list subscribed articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Edit an article. Never changes its status.
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let article = self
            .require_writable(actor, id, Permission::ChangeArticle, |a| {
                permissions::can_modify_article(actor, a, Permission::ChangeArticle)
            })
            .await?;
        self.apply_changes(article, input).await
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), ArticleServiceError> {
        self.require_writable(actor, id, Permission::DeleteArticle, |a| {
            permissions::can_modify_article(actor, a, Permission::DeleteArticle)
        })
        .await?;

        if !self
            .article_repo
            .delete(id)
            .await
            .context("Failed to delete article")?
        {
            return Err(article_not_found(id));
        }

        tracing::info!(article_id = id, actor = actor.id, "Article deleted");
        Ok(())
    }

    /// Approve a pending article and notify its subscribers.
    ///
    /// Approving an already approved article returns it unchanged and
    /// notifies no one.
    pub async fn approve(&self, actor: &User, id: i64) -> Result<Article, ArticleServiceError> {
        let (article, changed) = self.review(actor, id, ReviewDecision::Approve).await?;

        if changed {
            let failures = self
                .events
                .publish(ContentEvent::ArticleApproved {
                    article: article.clone(),
                    reviewer_id: actor.id,
                })
                .await;
            if failures > 0 {
                tracing::warn!(article_id = id, failures, "Approval handlers reported failures");
            }
        }

        Ok(article)
    }

    pub async fn reject(&self, actor: &User, id: i64) -> Result<Article, ArticleServiceError> {
        let (article, _) = self.review(actor, id, ReviewDecision::Reject).await?;
        Ok(article)
    }

    /// Send a rejected article back to review, optionally with edits.
    pub async fn resubmit(
        &self,
        actor: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let article = self
            .require_writable(actor, id, Permission::ChangeArticle, |a| {
                permissions::can_resubmit_article(actor, a)
            })
            .await?;

        if article.status != ArticleStatus::Rejected {
            return Err(ArticleServiceError::InvalidTransition {
                action: "resubmit",
                status: article.status,
            });
        }

        if !input.is_empty() {
            self.apply_changes(article, input).await?;
        }

        let moved = self
            .article_repo
            .transition(id, ArticleStatus::Rejected, ArticleStatus::Pending, None)
            .await
            .context("Failed to resubmit article")?;
        let article = self.require_article(id).await?;
        if !moved {
            return Err(ArticleServiceError::InvalidTransition {
                action: "resubmit",
                status: article.status,
            });
        }

        tracing::info!(article_id = id, author = actor.id, "Article resubmitted for review");
        Ok(article)
    }

    /// Apply an editorial decision. Returns the article and whether this call
    /// changed its status.
    async fn review(
        &self,
        actor: &User,
        id: i64,
        decision: ReviewDecision,
    ) -> Result<(Article, bool), ArticleServiceError> {
        let article = self.require_article(id).await?;

        let is_publisher_editor = match article.publisher_id {
            Some(publisher_id) => self.is_editor_of(actor, publisher_id).await?,
            None => false,
        };
        permissions::can_review_article(actor, &article, is_publisher_editor)?;

        let action = match decision {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
        };

        let target = match article.status.review(decision) {
            Transition::Apply(target) => target,
            Transition::Unchanged => return Ok((article, false)),
            Transition::Invalid => {
                return Err(ArticleServiceError::InvalidTransition {
                    action,
                    status: article.status,
                })
            }
        };

        let moved = self
            .article_repo
            .transition(id, ArticleStatus::Pending, target, Some(actor.id))
            .await
            .context("Failed to change article status")?;
        let article = self.require_article(id).await?;

        if !moved {
            // Another review won the race
            return match article.status.review(decision) {
                Transition::Unchanged => Ok((article, false)),
                _ => Err(ArticleServiceError::InvalidTransition {
                    action,
                    status: article.status,
                }),
            };
        }

        tracing::info!(
            article_id = id,
            reviewer = actor.id,
            status = %article.status,
            "Article reviewed"
        );
        Ok((article, true))
    }

    async fn apply_changes(
        &self,
        article: Article,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let fields = ArticleFields {
            title: input
                .title
                .map(|t| t.trim().to_string())
                .unwrap_or(article.title),
            content: input.content.unwrap_or(article.content),
            publisher_id: match (article.publisher_id, input.publisher_id) {
                (Some(current), Some(requested)) if current != requested => {
                    return Err(ArticleServiceError::ValidationError(
                        "An article's publisher cannot be changed once set".to_string(),
                    ))
                }
                (current, requested) => current.or(requested),
            },
        };
        self.validate_fields(&fields).await?;

        self.article_repo
            .update(article.id, &fields)
            .await
            .context("Failed to update article")?
            .ok_or_else(|| article_not_found(article.id))
    }

    async fn validate_fields(&self, fields: &ArticleFields) -> Result<(), ArticleServiceError> {
        if fields.title.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }
        if fields.title.chars().count() > MAX_TITLE_LEN {
            return Err(ArticleServiceError::ValidationError(format!(
                "Title cannot exceed {} characters",
                MAX_TITLE_LEN
            )));
        }
        if fields.content.trim().is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "Content cannot be empty".to_string(),
            ));
        }

        if let Some(publisher_id) = fields.publisher_id {
            self.publisher_repo
                .get_by_id(publisher_id)
                .await
                .context("Failed to get publisher")?
                .ok_or_else(|| {
                    ArticleServiceError::NotFound(format!("Publisher {}", publisher_id))
                })?;
        }
        Ok(())
    }

    async fn can_view(&self, actor: &User, article: &Article) -> Result<bool, ArticleServiceError> {
        let editor_publishers = if actor.role == Role::Editor && !article.is_approved() {
            self.publisher_repo
                .editor_publisher_ids(actor.id)
                .await
                .context("Failed to load editor memberships")?
        } else {
            Vec::new()
        };
        Ok(permissions::can_view_article(actor, article, &editor_publishers))
    }

    /// Load an article for a write and run `check` on it.
    ///
    /// A failed check is a 404 when the actor lacks `permission` and cannot
    /// see the article either, otherwise a permission error.
    async fn require_writable<F>(
        &self,
        actor: &User,
        id: i64,
        permission: Permission,
        check: F,
    ) -> Result<Article, ArticleServiceError>
    where
        F: FnOnce(&Article) -> permissions::Check,
    {
        let article = self.require_article(id).await?;
        if let Err(denied) = check(&article) {
            if !actor.has_permission(permission) && !self.can_view(actor, &article).await? {
                return Err(article_not_found(id));
            }
            return Err(denied.into());
        }
        Ok(article)
    }

    async fn is_editor_of(&self, actor: &User, publisher_id: i64) -> Result<bool, ArticleServiceError> {
        let membership = self
            .publisher_repo
            .get_membership(publisher_id, actor.id)
            .await
            .context("Failed to get membership")?;
        Ok(membership.is_some_and(|m| m.role == Role::Editor))
    }

    async fn require_article(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.article_repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or_else(|| article_not_found(id))
    }
}
