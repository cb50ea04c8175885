//! Newsletter service
//!
//! Newsletters bundle existing articles. They have no review step.

use crate::db::repositories::{ArticleRepository, NewsletterFields, NewsletterRepository};
use crate::models::{
    CreateNewsletterInput, ListParams, Newsletter, PagedResult, Permission, UpdateNewsletterInput,
    User,
};
use crate::services::permissions::{self, Denied};
use anyhow::Context;
use std::collections::BTreeSet;
use std::sync::Arc;

const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum NewsletterServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Newsletter not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<Denied> for NewsletterServiceError {
    fn from(denied: Denied) -> Self {
        Self::PermissionDenied(denied.0)
    }
}

pub struct NewsletterService {
    newsletter_repo: Arc<dyn NewsletterRepository>,
    article_repo: Arc<dyn ArticleRepository>,
}

impl NewsletterService {
    pub fn new(
        newsletter_repo: Arc<dyn NewsletterRepository>,
        article_repo: Arc<dyn ArticleRepository>,
    ) -> Self {
        Self {
            newsletter_repo,
            article_repo,
        }
    }

    pub async fn create(
        &self,
        actor: &User,
        input: CreateNewsletterInput,
    ) -> Result<Newsletter, NewsletterServiceError> {
        permissions::can_create_newsletter(actor)?;

        let fields = NewsletterFields {
            title: input.title.trim().to_string(),
            description: input.description,
            article_ids: self.checked_article_ids(input.article_ids).await?,
        };
        validate_title(&fields.title)?;

        let newsletter = self
            .newsletter_repo
            .create(actor.id, &fields)
            .await
            .context("Failed to create newsletter")?;

        tracing::info!(
            newsletter_id = newsletter.id,
            author = actor.id,
            articles = newsletter.article_ids.len(),
            "Newsletter created"
        );
        Ok(newsletter)
    }

    pub async fn get(&self, actor: &User, id: i64) -> Result<Newsletter, NewsletterServiceError> {
        permissions::require(actor, Permission::ViewNewsletter)?;
        self.require_newsletter(id).await
    }

    pub async fn list(
        &self,
        actor: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Newsletter>, NewsletterServiceError> {
        permissions::require(actor, Permission::ViewNewsletter)?;
        let (items, total) = self
            .newsletter_repo
            .list(params)
            .await
            .context("Failed to list newsletters")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Update a newsletter. A present `article_ids` replaces the whole set.
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateNewsletterInput,
    ) -> Result<Newsletter, NewsletterServiceError> {
        let newsletter = self.require_newsletter(id).await?;
        permissions::can_modify_newsletter(actor, &newsletter, Permission::ChangeNewsletter)?;

        let article_ids = match input.article_ids {
            Some(ids) => self.checked_article_ids(ids).await?,
            None => newsletter.article_ids,
        };
        let fields = NewsletterFields {
            title: input
                .title
                .map(|t| t.trim().to_string())
                .unwrap_or(newsletter.title),
            description: input.description.unwrap_or(newsletter.description),
            article_ids,
        };
        validate_title(&fields.title)?;

        self.newsletter_repo
            .update(id, &fields)
            .await
            .context("Failed to update newsletter")?
            .ok_or(NewsletterServiceError::NotFound(id))
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), NewsletterServiceError> {
        let newsletter = self.require_newsletter(id).await?;
        permissions::can_modify_newsletter(actor, &newsletter, Permission::DeleteNewsletter)?;

        self.newsletter_repo
            .delete(id)
            .await
            .context("Failed to delete newsletter")?;

        tracing::info!(newsletter_id = id, actor = actor.id, "Newsletter deleted");
        Ok(())
    }

    /// Deduplicate and sort ids, failing if any article does not exist
    async fn checked_article_ids(&self, ids: Vec<i64>) -> Result<Vec<i64>, NewsletterServiceError> {
        let wanted: Vec<i64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let found = self
            .article_repo
            .existing_ids(&wanted)
            .await
            .context("Failed to check newsletter articles")?;

        if found.len() != wanted.len() {
            let missing: Vec<String> = wanted
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(NewsletterServiceError::ValidationError(format!(
                "Unknown article ids: {}",
                missing.join(", ")
            )));
        }
        Ok(wanted)
    }

    async fn require_newsletter(&self, id: i64) -> Result<Newsletter, NewsletterServiceError> {
        self.newsletter_repo
            .get_by_id(id)
            .await
            .context("Failed to get newsletter")?
            .ok_or(NewsletterServiceError::NotFound(id))
    }
}

fn validate_title(title: &str) -> Result<(), NewsletterServiceError> {
    if title.is_empty() {
        return Err(NewsletterServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(NewsletterServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ArticleFields, SqlxArticleRepository, SqlxNewsletterRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::Role;

    struct Fixture {
        service: NewsletterService,
        users: Arc<dyn UserRepository>,
        articles: Arc<dyn ArticleRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let articles = SqlxArticleRepository::boxed(pool.clone());
        Fixture {
            service: NewsletterService::new(
                SqlxNewsletterRepository::boxed(pool.clone()),
                articles.clone(),
            ),
            users: SqlxUserRepository::boxed(pool),
            articles,
        }
    }

    async fn user(f: &Fixture, name: &str, role: Role) -> User {
        f.users
            .create(&User::new(name.into(), format!("{}@example.com", name), "h".into(), role))
            .await
            .unwrap()
    }

    async fn article(f: &Fixture, author: &User) -> i64 {
        let fields = ArticleFields {
            title: "Story".into(),
            content: "Body".into(),
            publisher_id: None,
        };
        f.articles.create(author.id, &fields).await.unwrap().id
    }

    fn input(title: &str, article_ids: Vec<i64>) -> CreateNewsletterInput {
        CreateNewsletterInput {
            title: title.into(),
            description: String::new(),
            article_ids,
        }
    }

    #[tokio::test]
    async fn test_create_dedupes_and_checks_articles() {
        let f = setup().await;
        let journalist = user(&f, "jane", Role::Journalist).await;
        let a = article(&f, &journalist).await;
        let b = article(&f, &journalist).await;

        let newsletter = f
            .service
            .create(&journalist, input("Weekly", vec![b, a, b]))
            .await
            .unwrap();
        assert_eq!(newsletter.article_ids, vec![a, b]);

        assert!(matches!(
            f.service.create(&journalist, input("Weekly", vec![a, 999])).await,
            Err(NewsletterServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_only_journalists_create() {
        let f = setup().await;
        let reader = user(&f, "rita", Role::Reader).await;
        let editor = user(&f, "ed", Role::Editor).await;

        for actor in [&reader, &editor] {
            assert!(matches!(
                f.service.create(actor, input("Weekly", vec![])).await,
                Err(NewsletterServiceError::PermissionDenied(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_modify_rules() {
        let f = setup().await;
        let author = user(&f, "jane", Role::Journalist).await;
        let other = user(&f, "joe", Role::Journalist).await;
        let editor = user(&f, "ed", Role::Editor).await;
        let reader = user(&f, "rita", Role::Reader).await;
        let a = article(&f, &author).await;

        let newsletter = f.service.create(&author, input("Weekly", vec![a])).await.unwrap();

        let rename = UpdateNewsletterInput {
            title: Some("Monthly".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(&other, newsletter.id, rename.clone()).await,
            Err(NewsletterServiceError::PermissionDenied(_))
        ));
        let renamed = f.service.update(&author, newsletter.id, rename).await.unwrap();
        assert_eq!(renamed.title, "Monthly");
        assert_eq!(renamed.article_ids, vec![a]);

        let clear = UpdateNewsletterInput {
            article_ids: Some(vec![]),
            ..Default::default()
        };
        let cleared = f.service.update(&editor, newsletter.id, clear).await.unwrap();
        assert!(cleared.article_ids.is_empty());

        assert!(f.service.get(&reader, newsletter.id).await.is_ok());
        assert!(matches!(
            f.service.delete(&reader, newsletter.id).await,
            Err(NewsletterServiceError::PermissionDenied(_))
        ));
        f.service.delete(&editor, newsletter.id).await.unwrap();
        assert!(matches!(
            f.service.get(&reader, newsletter.id).await,
            Err(NewsletterServiceError::NotFound(_))
        ));
    }
}
