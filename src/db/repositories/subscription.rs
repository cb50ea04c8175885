//! Subscription repository
//!
//! Reader subscriptions to publishers and journalists, and the recipient
//! query used when an article is approved.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Publisher, Recipient, Role, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Which subscription relation a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Publisher(i64),
    Journalist(i64),
}

impl SubscriptionTarget {
    fn table(&self) -> &'static str {
        match self {
            SubscriptionTarget::Publisher(_) => "publisher_subscriptions",
            SubscriptionTarget::Journalist(_) => "journalist_subscriptions",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            SubscriptionTarget::Publisher(_) => "publisher_id",
            SubscriptionTarget::Journalist(_) => "journalist_id",
        }
    }

    fn id(&self) -> i64 {
        match self {
            SubscriptionTarget::Publisher(id) | SubscriptionTarget::Journalist(id) => *id,
        }
    }
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Flip the subscription edge. Returns true if the reader is now subscribed.
    async fn toggle(&self, reader_id: i64, target: SubscriptionTarget) -> Result<bool>;

    async fn is_subscribed(&self, reader_id: i64, target: SubscriptionTarget) -> Result<bool>;

    async fn subscribed_publishers(&self, reader_id: i64) -> Result<Vec<Publisher>>;

    async fn subscribed_journalists(&self, reader_id: i64) -> Result<Vec<UserSummary>>;

    /// Distinct readers subscribed to the author or to the publisher, by user id
    async fn recipients_for(&self, author_id: i64, publisher_id: Option<i64>)
        -> Result<Vec<Recipient>>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

const RECIPIENTS_SQL: &str = r#"
    SELECT DISTINCT u.id, u.username, u.email
    FROM users u
    WHERE u.id IN (SELECT reader_id FROM journalist_subscriptions WHERE journalist_id = ?)
       OR u.id IN (SELECT reader_id FROM publisher_subscriptions WHERE publisher_id = ?)
    ORDER BY u.id
"#;

const SUBSCRIBED_PUBLISHERS_SQL: &str = r#"
    SELECT p.id, p.name, p.created_at
    FROM publisher_subscriptions s
    JOIN publishers p ON p.id = s.publisher_id
    WHERE s.reader_id = ?
    ORDER BY p.name
"#;

const SUBSCRIBED_JOURNALISTS_SQL: &str = r#"
    SELECT u.id, u.username, u.role
    FROM journalist_subscriptions s
    JOIN users u ON u.id = s.journalist_id
    WHERE s.reader_id = ?
    ORDER BY u.username
"#;

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn toggle(&self, reader_id: i64, target: SubscriptionTarget) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => toggle_sqlite(pool, reader_id, target).await,
            Backend::Mysql(pool) => toggle_mysql(pool, reader_id, target).await,
        }
    }

    async fn is_subscribed(&self, reader_id: i64, target: SubscriptionTarget) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE reader_id = ? AND {} = ?",
            target.table(),
            target.column()
        );
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(reader_id)
                .bind(target.id())
                .fetch_one(pool)
                .await
                .context("Failed to check subscription")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(reader_id)
                .bind(target.id())
                .fetch_one(pool)
                .await
                .context("Failed to check subscription")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn subscribed_publishers(&self, reader_id: i64) -> Result<Vec<Publisher>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(SUBSCRIBED_PUBLISHERS_SQL)
                    .bind(reader_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list subscribed publishers")?;
                Ok(rows
                    .iter()
                    .map(|row| Publisher {
                        id: row.get("id"),
                        name: row.get("name"),
                        created_at: row.get("created_at"),
                    })
                    .collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(SUBSCRIBED_PUBLISHERS_SQL)
                    .bind(reader_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list subscribed publishers")?;
                Ok(rows
                    .iter()
                    .map(|row| Publisher {
                        id: row.get("id"),
                        name: row.get("name"),
                        created_at: row.get("created_at"),
                    })
                    .collect())
            }
        }
    }

    async fn subscribed_journalists(&self, reader_id: i64) -> Result<Vec<UserSummary>> {
        let rows: Vec<(i64, String, String)> = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SUBSCRIBED_JOURNALISTS_SQL)
                .bind(reader_id)
                .fetch_all(pool)
                .await
                .context("Failed to list subscribed journalists")?
                .iter()
                .map(|row| (row.get("id"), row.get("username"), row.get("role")))
                .collect(),
            Backend::Mysql(pool) => sqlx::query(SUBSCRIBED_JOURNALISTS_SQL)
                .bind(reader_id)
                .fetch_all(pool)
                .await
                .context("Failed to list subscribed journalists")?
                .iter()
                .map(|row| (row.get("id"), row.get("username"), row.get("role")))
                .collect(),
        };

        rows.into_iter()
            .map(|(id, username, role)| {
                Ok(UserSummary {
                    id,
                    username,
                    role: Role::from_str(&role)?,
                })
            })
            .collect()
    }

    async fn recipients_for(
        &self,
        author_id: i64,
        publisher_id: Option<i64>,
    ) -> Result<Vec<Recipient>> {
        let recipients = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(RECIPIENTS_SQL)
                .bind(author_id)
                .bind(publisher_id)
                .fetch_all(pool)
                .await
                .context("Failed to resolve notification recipients")?
                .iter()
                .map(|row| Recipient {
                    user_id: row.get("id"),
                    username: row.get("username"),
                    email: row.get("email"),
                })
                .collect(),
            Backend::Mysql(pool) => sqlx::query(RECIPIENTS_SQL)
                .bind(author_id)
                .bind(publisher_id)
                .fetch_all(pool)
                .await
                .context("Failed to resolve notification recipients")?
                .iter()
                .map(|row| Recipient {
                    user_id: row.get("id"),
                    username: row.get("username"),
                    email: row.get("email"),
                })
                .collect(),
        };
        Ok(recipients)
    }
}

// ============================================================================
// Toggle implementations
// ============================================================================

async fn toggle_sqlite(pool: &SqlitePool, reader_id: i64, target: SubscriptionTarget) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query(&format!(
        "DELETE FROM {} WHERE reader_id = ? AND {} = ?",
        target.table(),
        target.column()
    ))
    .bind(reader_id)
    .bind(target.id())
    .execute(&mut *tx)
    .await
    .context("Failed to remove subscription")?
    .rows_affected();

    if removed == 0 {
        sqlx::query(&format!(
            "INSERT INTO {} (reader_id, {}, created_at) VALUES (?, ?, ?)",
            target.table(),
            target.column()
        ))
        .bind(reader_id)
        .bind(target.id())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to add subscription")?;
    }

    tx.commit().await.context("Failed to commit subscription")?;
    Ok(removed == 0)
}

async fn toggle_mysql(pool: &MySqlPool, reader_id: i64, target: SubscriptionTarget) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query(&format!(
        "DELETE FROM {} WHERE reader_id = ? AND {} = ?",
        target.table(),
        target.column()
    ))
    .bind(reader_id)
    .bind(target.id())
    .execute(&mut *tx)
    .await
    .context("Failed to remove subscription")?
    .rows_affected();

    if removed == 0 {
        sqlx::query(&format!(
            "INSERT INTO {} (reader_id, {}, created_at) VALUES (?, ?, ?)",
            target.table(),
            target.column()
        ))
        .bind(reader_id)
        .bind(target.id())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to add subscription")?;
    }

    tx.commit().await.context("Failed to commit subscription")?;
    Ok(removed == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        PublisherRepository, SqlxPublisherRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    struct Fixture {
        subs: SqlxSubscriptionRepository,
        users: SqlxUserRepository,
        publishers: SqlxPublisherRepository,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        Fixture {
            subs: SqlxSubscriptionRepository::new(pool.clone()),
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

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let f = setup().await;
        let reader = user(&f, "rita", Role::Reader).await;
        let p = f.publishers.create("Daily").await.unwrap();
        let target = SubscriptionTarget::Publisher(p.id);

        assert!(f.subs.toggle(reader.id, target).await.unwrap());
        assert!(f.subs.is_subscribed(reader.id, target).await.unwrap());
        assert!(!f.subs.toggle(reader.id, target).await.unwrap());
        assert!(!f.subs.is_subscribed(reader.id, target).await.unwrap());
        assert!(f.subs.subscribed_publishers(reader.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relations_are_independent() {
        let f = setup().await;
        let reader = user(&f, "rita", Role::Reader).await;
        let journalist = user(&f, "jane", Role::Journalist).await;
        let p = f.publishers.create("Daily").await.unwrap();

        f.subs
            .toggle(reader.id, SubscriptionTarget::Journalist(journalist.id))
            .await
            .unwrap();

        assert!(f.subs.subscribed_publishers(reader.id).await.unwrap().is_empty());
        let journalists = f.subs.subscribed_journalists(reader.id).await.unwrap();
        assert_eq!(journalists.len(), 1);
        assert_eq!(journalists[0].username, "jane");
        assert!(!f
            .subs
            .is_subscribed(reader.id, SubscriptionTarget::Publisher(p.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_recipients_are_deduplicated() {
        let f = setup().await;
        let journalist = user(&f, "jane", Role::Journalist).await;
        let both = user(&f, "both", Role::Reader).await;
        let only_pub = user(&f, "pub", Role::Reader).await;
        let only_author = user(&f, "author", Role::Reader).await;
        user(&f, "nobody", Role::Reader).await;
        let p = f.publishers.create("Daily").await.unwrap();

        for reader in [&both, &only_pub] {
            f.subs
                .toggle(reader.id, SubscriptionTarget::Publisher(p.id))
                .await
                .unwrap();
        }
        for reader in [&both, &only_author] {
            f.subs
                .toggle(reader.id, SubscriptionTarget::Journalist(journalist.id))
                .await
                .unwrap();
        }

        let recipients = f.subs.recipients_for(journalist.id, Some(p.id)).await.unwrap();
        let ids: Vec<i64> = recipients.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![both.id, only_pub.id, only_author.id]);
    }

    #[tokio::test]
    async fn test_recipients_without_publisher() {
        let f = setup().await;
        let journalist = user(&f, "jane", Role::Journalist).await;
        let reader = user(&f, "rita", Role::Reader).await;
        let p = f.publishers.create("Daily").await.unwrap();
        f.subs
            .toggle(reader.id, SubscriptionTarget::Publisher(p.id))
            .await
            .unwrap();

        let recipients = f.subs.recipients_for(journalist.id, None).await.unwrap();
        assert!(recipients.is_empty());
    }
}
