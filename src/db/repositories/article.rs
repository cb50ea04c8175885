//! Article repository
//!
//! Status changes go through [`ArticleRepository::transition`], a conditional
//! update on the current status, so two concurrent reviews of the same article
//! cannot both succeed.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Article, ArticleStatus, ArticleVisibility, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Fields written on create and update
#[derive(Debug, Clone)]
pub struct ArticleFields {
    pub title: String,
    pub content: String,
    pub publisher_id: Option<i64>,
}

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert a pending article
    async fn create(&self, author_id: i64, fields: &ArticleFields) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Overwrite title, content and publisher. Status is untouched.
    async fn update(&self, id: i64, fields: &ArticleFields) -> Result<Option<Article>>;

    /// Returns false if no such article existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Move the article from `from` to `to` if it is still in `from`.
    ///
    /// Returns true if this call performed the transition.
    async fn transition(
        &self,
        id: i64,
        from: ArticleStatus,
        to: ArticleStatus,
        reviewer_id: Option<i64>,
    ) -> Result<bool>;

    /// List articles visible under `visibility`, newest first
    async fn list_visible(
        &self,
        visibility: ArticleVisibility,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)>;

    /// Approved articles by journalists or publishers the reader follows
    async fn list_subscribed(&self, reader_id: i64, params: &ListParams)
        -> Result<(Vec<Article>, i64)>;

    /// The subset of `ids` that exist
    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>>;
}

pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.title, a.content, a.author_id, u.username AS author_username,
        a.publisher_id, p.name AS publisher_name, a.status, a.reviewed_by, a.reviewed_at,
        a.created_at, a.updated_at
    FROM articles a
    JOIN users u ON u.id = a.author_id
    LEFT JOIN publishers p ON p.id = a.publisher_id
"#;

/// WHERE clause and the user id it binds, once per `?`
fn visibility_filter(visibility: ArticleVisibility) -> (&'static str, Vec<i64>) {
    match visibility {
        ArticleVisibility::Approved => ("a.status = 'approved'", vec![]),
        ArticleVisibility::ApprovedOrAuthoredBy(user_id) => {
            ("(a.status = 'approved' OR a.author_id = ?)", vec![user_id])
        }
        ArticleVisibility::ApprovedOrReviewableBy(user_id) => (
            r#"(a.status = 'approved' OR (a.status = 'pending' AND (a.publisher_id IS NULL
                OR a.publisher_id IN (SELECT m.publisher_id FROM publisher_members m
                    WHERE m.user_id = ? AND m.member_role = 'editor'))))"#,
            vec![user_id],
        ),
    }
}

const SUBSCRIBED_FILTER: &str = r#"a.status = 'approved' AND (
    a.author_id IN (SELECT s.journalist_id FROM journalist_subscriptions s WHERE s.reader_id = ?)
    OR a.publisher_id IN (SELECT s.publisher_id FROM publisher_subscriptions s WHERE s.reader_id = ?))"#;

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, author_id: i64, fields: &ArticleFields) -> Result<Article> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO articles (title, content, author_id, publisher_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
        "#;
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&fields.title)
                .bind(&fields.content)
                .bind(author_id)
                .bind(fields.publisher_id)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create article")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&fields.title)
                .bind(&fields.content)
                .bind(author_id)
                .bind(fields.publisher_id)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create article")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Article not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let sql = format!("{} WHERE a.id = ?", ARTICLE_SELECT);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get article")?;
                row.as_ref().map(row_to_article_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get article")?;
                row.as_ref().map(row_to_article_mysql).transpose()
            }
        }
    }

    async fn update(&self, id: i64, fields: &ArticleFields) -> Result<Option<Article>> {
        let sql = "UPDATE articles SET title = ?, content = ?, publisher_id = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&fields.title)
                .bind(&fields.content)
                .bind(fields.publisher_id)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update article")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&fields.title)
                .bind(&fields.content)
                .bind(fields.publisher_id)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update article")?
                .rows_affected(),
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM articles WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn transition(
        &self,
        id: i64,
        from: ArticleStatus,
        to: ArticleStatus,
        reviewer_id: Option<i64>,
    ) -> Result<bool> {
        let now = Utc::now();
        let reviewed_at = reviewer_id.map(|_| now);
        let sql = r#"
            UPDATE articles
            SET status = ?, reviewed_by = ?, reviewed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
        "#;
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(to.as_str())
                .bind(reviewer_id)
                .bind(reviewed_at)
                .bind(now)
                .bind(id)
                .bind(from.as_str())
                .execute(pool)
                .await
                .context("Failed to change article status")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(to.as_str())
                .bind(reviewer_id)
                .bind(reviewed_at)
                .bind(now)
                .bind(id)
                .bind(from.as_str())
                .execute(pool)
                .await
                .context("Failed to change article status")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }

    async fn list_visible(
        &self,
        visibility: ArticleVisibility,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)> {
        let (filter, binds) = visibility_filter(visibility);
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_articles_sqlite(pool, filter, &binds, params).await,
            Backend::Mysql(pool) => list_articles_mysql(pool, filter, &binds, params).await,
        }
    }

    async fn list_subscribed(
        &self,
        reader_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)> {
        let binds = [reader_id, reader_id];
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                list_articles_sqlite(pool, SUBSCRIBED_FILTER, &binds, params).await
            }
            Backend::Mysql(pool) => {
                list_articles_mysql(pool, SUBSCRIBED_FILTER, &binds, params).await
            }
        }
    }

    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM articles WHERE id IN ({}) ORDER BY id",
            placeholders
        );
        let found = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to look up articles")?
                    .iter()
                    .map(|row| row.get("id"))
                    .collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to look up articles")?
                    .iter()
                    .map(|row| row.get("id"))
                    .collect()
            }
        };
        Ok(found)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_articles_sqlite(
    pool: &SqlitePool,
    filter: &str,
    binds: &[i64],
    params: &ListParams,
) -> Result<(Vec<Article>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM articles a WHERE {}", filter);
    let mut count_query = sqlx::query(&count_sql);
    for value in binds {
        count_query = count_query.bind(*value);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?
        .get("count");

    let list_sql = format!(
        "{} WHERE {} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
        ARTICLE_SELECT, filter
    );
    let mut list_query = sqlx::query(&list_sql);
    for value in binds {
        list_query = list_query.bind(*value);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    let articles = rows
        .iter()
        .map(row_to_article_sqlite)
        .collect::<Result<Vec<_>>>()?;
    Ok((articles, total))
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status_str: String = row.get("status");
    let status = ArticleStatus::from_str(&status_str)
        .with_context(|| format!("Invalid article status in database: {}", status_str))?;

    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        publisher_id: row.get("publisher_id"),
        publisher_name: row.get("publisher_name"),
        status,
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_articles_mysql(
    pool: &MySqlPool,
    filter: &str,
    binds: &[i64],
    params: &ListParams,
) -> Result<(Vec<Article>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM articles a WHERE {}", filter);
    let mut count_query = sqlx::query(&count_sql);
    for value in binds {
        count_query = count_query.bind(*value);
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?
        .get("count");

    let list_sql = format!(
        "{} WHERE {} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
        ARTICLE_SELECT, filter
    );
    let mut list_query = sqlx::query(&list_sql);
    for value in binds {
        list_query = list_query.bind(*value);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    let articles = rows
        .iter()
        .map(row_to_article_mysql)
        .collect::<Result<Vec<_>>>()?;
    Ok((articles, total))
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let status_str: String = row.get("status");
    let status = ArticleStatus::from_str(&status_str)
        .with_context(|| format!("Invalid article status in database: {}", status_str))?;

    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        publisher_id: row.get("publisher_id"),
        publisher_name: row.get("publisher_name"),
        status,
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        PublisherRepository, SqlxPublisherRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Role, User};

    struct Fixture {
        articles: SqlxArticleRepository,
        users: SqlxUserRepository,
        publishers: SqlxPublisherRepository,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        Fixture {
            articles: SqlxArticleRepository::new(pool.clone()),
            users: SqlxUserRepository::new(pool.clone()),
            publishers: SqlxPublisherRepository::new(pool),
        }
    }

    async fn user(f: &Fixture, name: &str, role: Role) -> User {
        f.users
            .create(&User::new(
                name.into(),
                format!("{}@example.com", name),
                "hash".into(),
                role,
            ))
            .await
            .unwrap()
    }

    fn fields(title: &str, publisher_id: Option<i64>) -> ArticleFields {
        ArticleFields {
            title: title.into(),
            content: "Body".into(),
            publisher_id,
        }
    }

    #[tokio::test]
    async fn test_create_is_pending_and_joined() {
        let f = setup().await;
        let j = user(&f, "jane", Role::Journalist).await;
        let p = f.publishers.create("Daily").await.unwrap();

        let article = f.articles.create(j.id, &fields("Hello", Some(p.id))).await.unwrap();
        assert_eq!(article.status, ArticleStatus::Pending);
        assert_eq!(article.author_username, "jane");
        assert_eq!(article.publisher_name.as_deref(), Some("Daily"));
        assert!(article.reviewed_by.is_none());
    }

    #[tokio::test]
    async fn test_transition_only_from_expected_status() {
        let f = setup().await;
        let j = user(&f, "jane", Role::Journalist).await;
        let e = user(&f, "perry", Role::Editor).await;
        let article = f.articles.create(j.id, &fields("Hello", None)).await.unwrap();

        let first = f
            .articles
            .transition(article.id, ArticleStatus::Pending, ArticleStatus::Approved, Some(e.id))
            .await
            .unwrap();
        let second = f
            .articles
            .transition(article.id, ArticleStatus::Pending, ArticleStatus::Approved, Some(e.id))
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        let stored = f.articles.get_by_id(article.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArticleStatus::Approved);
        assert_eq!(stored.reviewed_by, Some(e.id));
        assert!(stored.reviewed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_keeps_status() {
        let f = setup().await;
        let j = user(&f, "jane", Role::Journalist).await;
        let article = f.articles.create(j.id, &fields("Hello", None)).await.unwrap();

        let updated = f
            .articles
            .update(article.id, &fields("Changed", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Changed");
        assert_eq!(updated.status, ArticleStatus::Pending);
        assert!(f.articles.update(999, &fields("x", None)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_visibility_filters() {
        let f = setup().await;
        let j = user(&f, "jane", Role::Journalist).await;
        let other = user(&f, "otto", Role::Journalist).await;
        let e = user(&f, "perry", Role::Editor).await;
        let mine = f.publishers.create("Mine").await.unwrap();
        let theirs = f.publishers.create("Theirs").await.unwrap();
        f.publishers.add_member(mine.id, e.id, Role::Editor).await.unwrap();

        let approved = f.articles.create(other.id, &fields("approved", None)).await.unwrap();
        f.articles
            .transition(approved.id, ArticleStatus::Pending, ArticleStatus::Approved, Some(e.id))
            .await
            .unwrap();
        f.articles.create(j.id, &fields("own pending", Some(theirs.id))).await.unwrap();
        f.articles.create(other.id, &fields("in scope", Some(mine.id))).await.unwrap();
        f.articles.create(other.id, &fields("unaffiliated", None)).await.unwrap();

        let params = ListParams::default();
        let titles = |articles: Vec<Article>| {
            let mut t: Vec<String> = articles.into_iter().map(|a| a.title).collect();
            t.sort();
            t
        };

        let (reader_view, total) = f
            .articles
            .list_visible(ArticleVisibility::Approved, &params)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(titles(reader_view), vec!["approved"]);

        let (journalist_view, _) = f
            .articles
            .list_visible(ArticleVisibility::ApprovedOrAuthoredBy(j.id), &params)
            .await
            .unwrap();
        assert_eq!(titles(journalist_view), vec!["approved", "own pending"]);

        let (editor_view, total) = f
            .articles
            .list_visible(ArticleVisibility::ApprovedOrReviewableBy(e.id), &params)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(titles(editor_view), vec!["approved", "in scope", "unaffiliated"]);
    }

    #[tokio::test]
    async fn test_pagination() {
        let f = setup().await;
        let j = user(&f, "jane", Role::Journalist).await;
        for i in 0..5 {
            f.articles
                .create(j.id, &fields(&format!("a{}", i), None))
                .await
                .unwrap();
        }

        let (page, total) = f
            .articles
            .list_visible(ArticleVisibility::ApprovedOrAuthoredBy(j.id), &ListParams::new(2, 2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_ids() {
        let f = setup().await;
        let j = user(&f, "jane", Role::Journalist).await;
        let a = f.articles.create(j.id, &fields("a", None)).await.unwrap();

        assert_eq!(f.articles.existing_ids(&[a.id, 999]).await.unwrap(), vec![a.id]);
        assert!(f.articles.existing_ids(&[]).await.unwrap().is_empty());
        assert!(f.articles.delete(a.id).await.unwrap());
        assert!(!f.articles.delete(a.id).await.unwrap());
    }
}
