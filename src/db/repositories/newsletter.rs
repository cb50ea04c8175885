//! Newsletter repository
//!
//! A newsletter row and its article links are written in one transaction.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, Newsletter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

/// Fields written on create and update
#[derive(Debug, Clone)]
pub struct NewsletterFields {
    pub title: String,
    pub description: String,
    pub article_ids: Vec<i64>,
}

#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    async fn create(&self, author_id: i64, fields: &NewsletterFields) -> Result<Newsletter>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>>;

    /// Replace title, description and the article set
    async fn update(&self, id: i64, fields: &NewsletterFields) -> Result<Option<Newsletter>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Newsletters newest first
    async fn list(&self, params: &ListParams) -> Result<(Vec<Newsletter>, i64)>;
}

pub struct SqlxNewsletterRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsletterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(pool))
    }
}

const NEWSLETTER_SELECT: &str = r#"
    SELECT n.id, n.title, n.description, n.author_id, u.username AS author_username,
        n.created_at, n.updated_at
    FROM newsletters n
    JOIN users u ON u.id = n.author_id
"#;

/// Newsletter row before its article ids are attached
struct NewsletterRow {
    id: i64,
    title: String,
    description: String,
    author_id: i64,
    author_username: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NewsletterRow {
    fn with_articles(self, article_ids: Vec<i64>) -> Newsletter {
        Newsletter {
            id: self.id,
            title: self.title,
            description: self.description,
            author_id: self.author_id,
            author_username: self.author_username,
            article_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

macro_rules! newsletter_row {
    ($row:expr) => {
        NewsletterRow {
            id: $row.get("id"),
            title: $row.get("title"),
            description: $row.get("description"),
            author_id: $row.get("author_id"),
            author_username: $row.get("author_username"),
            created_at: $row.get("created_at"),
            updated_at: $row.get("updated_at"),
        }
    };
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn create(&self, author_id: i64, fields: &NewsletterFields) -> Result<Newsletter> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_newsletter_sqlite(pool, author_id, fields).await?,
            Backend::Mysql(pool) => create_newsletter_mysql(pool, author_id, fields).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Newsletter not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>> {
        let sql = format!("{} WHERE n.id = ?", NEWSLETTER_SELECT);
        let row = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get newsletter")?
                .map(|row| newsletter_row!(row)),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get newsletter")?
                .map(|row| newsletter_row!(row)),
        };

        match row {
            Some(row) => {
                let mut links = self.article_links(&[row.id]).await?;
                let ids = links.remove(&row.id).unwrap_or_default();
                Ok(Some(row.with_articles(ids)))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, id: i64, fields: &NewsletterFields) -> Result<Option<Newsletter>> {
        let updated = match self.pool.backend() {
            Backend::Sqlite(pool) => update_newsletter_sqlite(pool, id, fields).await?,
            Backend::Mysql(pool) => update_newsletter_mysql(pool, id, fields).await?,
        };
        if !updated {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM newsletters WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete newsletter")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete newsletter")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Newsletter>, i64)> {
        let count_sql = "SELECT COUNT(*) AS count FROM newsletters";
        let list_sql = format!(
            "{} ORDER BY n.created_at DESC, n.id DESC LIMIT ? OFFSET ?",
            NEWSLETTER_SELECT
        );

        let (rows, total): (Vec<NewsletterRow>, i64) = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count newsletters")?
                    .get("count");
                let rows = sqlx::query(&list_sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list newsletters")?;
                (rows.iter().map(|row| newsletter_row!(row)).collect(), total)
            }
            Backend::Mysql(pool) => {
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count newsletters")?
                    .get("count");
                let rows = sqlx::query(&list_sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list newsletters")?;
                (rows.iter().map(|row| newsletter_row!(row)).collect(), total)
            }
        };

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut links = self.article_links(&ids).await?;
        let newsletters = rows
            .into_iter()
            .map(|row| {
                let article_ids = links.remove(&row.id).unwrap_or_default();
                row.with_articles(article_ids)
            })
            .collect();

        Ok((newsletters, total))
    }
}

impl SqlxNewsletterRepository {
    /// Article ids per newsletter, ascending
    async fn article_links(&self, newsletter_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>> {
        let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
        if newsletter_ids.is_empty() {
            return Ok(links);
        }

        let sql = format!(
            "SELECT newsletter_id, article_id FROM newsletter_articles WHERE newsletter_id IN ({}) ORDER BY newsletter_id, article_id",
            vec!["?"; newsletter_ids.len()].join(", ")
        );
        let pairs: Vec<(i64, i64)> = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                for id in newsletter_ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to load newsletter articles")?
                    .iter()
                    .map(|row| (row.get("newsletter_id"), row.get("article_id")))
                    .collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                for id in newsletter_ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(pool)
                    .await
                    .context("Failed to load newsletter articles")?
                    .iter()
                    .map(|row| (row.get("newsletter_id"), row.get("article_id")))
                    .collect()
            }
        };

        for (newsletter_id, article_id) in pairs {
            links.entry(newsletter_id).or_default().push(article_id);
        }
        Ok(links)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_newsletter_sqlite(
    pool: &SqlitePool,
    author_id: i64,
    fields: &NewsletterFields,
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        "INSERT INTO newsletters (title, description, author_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create newsletter")?
    .last_insert_rowid();

    link_articles_sqlite(&mut tx, id, &fields.article_ids).await?;
    tx.commit().await.context("Failed to commit newsletter")?;
    Ok(id)
}

async fn update_newsletter_sqlite(
    pool: &SqlitePool,
    id: i64,
    fields: &NewsletterFields,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(
        "UPDATE newsletters SET title = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to update newsletter")?
    .rows_affected();

    if affected == 0 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    sqlx::query("DELETE FROM newsletter_articles WHERE newsletter_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear newsletter articles")?;
    link_articles_sqlite(&mut tx, id, &fields.article_ids).await?;

    tx.commit().await.context("Failed to commit newsletter")?;
    Ok(true)
}

async fn link_articles_sqlite(
    tx: &mut Transaction<'_, Sqlite>,
    newsletter_id: i64,
    article_ids: &[i64],
) -> Result<()> {
    for article_id in article_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO newsletter_articles (newsletter_id, article_id) VALUES (?, ?)",
        )
        .bind(newsletter_id)
        .bind(*article_id)
        .execute(&mut **tx)
        .await
        .context("Failed to link newsletter article")?;
    }
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_newsletter_mysql(
    pool: &MySqlPool,
    author_id: i64,
    fields: &NewsletterFields,
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        "INSERT INTO newsletters (title, description, author_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create newsletter")?
    .last_insert_id() as i64;

    link_articles_mysql(&mut tx, id, &fields.article_ids).await?;
    tx.commit().await.context("Failed to commit newsletter")?;
    Ok(id)
}

async fn update_newsletter_mysql(
    pool: &MySqlPool,
    id: i64,
    fields: &NewsletterFields,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let exists = sqlx::query("SELECT id FROM newsletters WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock newsletter")?
        .is_some();
    if !exists {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    // MySQL reports zero affected rows when values are unchanged, hence the lock above
    sqlx::query("UPDATE newsletters SET title = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update newsletter")?;

    sqlx::query("DELETE FROM newsletter_articles WHERE newsletter_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear newsletter articles")?;
    link_articles_mysql(&mut tx, id, &fields.article_ids).await?;

    tx.commit().await.context("Failed to commit newsletter")?;
    Ok(true)
}

async fn link_articles_mysql(
    tx: &mut Transaction<'_, MySql>,
    newsletter_id: i64,
    article_ids: &[i64],
) -> Result<()> {
    for article_id in article_ids {
        sqlx::query(
            "INSERT IGNORE INTO newsletter_articles (newsletter_id, article_id) VALUES (?, ?)",
        )
        .bind(newsletter_id)
        .bind(*article_id)
        .execute(&mut **tx)
        .await
        .context("Failed to link newsletter article")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ArticleFields, ArticleRepository, SqlxArticleRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Role, User};

    struct Fixture {
        newsletters: SqlxNewsletterRepository,
        articles: SqlxArticleRepository,
        author_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::new(pool.clone());
        let author = users
            .create(&User::new(
                "jane".into(),
                "jane@example.com".into(),
                "hash".into(),
                Role::Journalist,
            ))
            .await
            .unwrap();
        Fixture {
            newsletters: SqlxNewsletterRepository::new(pool.clone()),
            articles: SqlxArticleRepository::new(pool),
            author_id: author.id,
        }
    }

    async fn article(f: &Fixture, title: &str) -> i64 {
        f.articles
            .create(
                f.author_id,
                &ArticleFields {
                    title: title.into(),
                    content: "Body".into(),
                    publisher_id: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_create_with_articles() {
        let f = setup().await;
        let a = article(&f, "a").await;
        let b = article(&f, "b").await;

        let created = f
            .newsletters
            .create(
                f.author_id,
                &NewsletterFields {
                    title: "Weekly".into(),
                    description: "Roundup".into(),
                    article_ids: vec![b, a, a],
                },
            )
            .await
            .unwrap();

        assert_eq!(created.title, "Weekly");
        assert_eq!(created.author_username, "jane");
        assert_eq!(created.article_ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_update_replaces_article_set() {
        let f = setup().await;
        let a = article(&f, "a").await;
        let b = article(&f, "b").await;
        let created = f
            .newsletters
            .create(
                f.author_id,
                &NewsletterFields {
                    title: "Weekly".into(),
                    description: String::new(),
                    article_ids: vec![a],
                },
            )
            .await
            .unwrap();

        let updated = f
            .newsletters
            .update(
                created.id,
                &NewsletterFields {
                    title: "Weekly".into(),
                    description: "now with b".into(),
                    article_ids: vec![b],
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.article_ids, vec![b]);
        assert_eq!(updated.description, "now with b");

        let missing = f
            .newsletters
            .update(
                999,
                &NewsletterFields {
                    title: "x".into(),
                    description: String::new(),
                    article_ids: vec![],
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let f = setup().await;
        let a = article(&f, "a").await;
        for title in ["one", "two"] {
            f.newsletters
                .create(
                    f.author_id,
                    &NewsletterFields {
                        title: title.into(),
                        description: String::new(),
                        article_ids: vec![a],
                    },
                )
                .await
                .unwrap();
        }

        let (items, total) = f.newsletters.list(&ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert!(items.iter().all(|n| n.article_ids == vec![a]));

        assert!(f.newsletters.delete(items[0].id).await.unwrap());
        let (_, total) = f.newsletters.list(&ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
    }
}
