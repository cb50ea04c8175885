//! Publisher repository
//!
//! Publishers and the membership of journalists and editors in them.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Membership, Publisher, PublisherWithCounts, Role, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait PublisherRepository: Send + Sync {
    async fn create(&self, name: &str) -> Result<Publisher>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Publisher>>;

    /// All publishers ordered by name, with member and subscriber counts
    async fn list(&self) -> Result<Vec<PublisherWithCounts>>;

    /// Record a membership. Returns false if the user was already a member.
    async fn add_member(&self, publisher_id: i64, user_id: i64, role: Role) -> Result<bool>;

    /// Remove a membership. Returns false if there was none.
    async fn remove_member(&self, publisher_id: i64, user_id: i64) -> Result<bool>;

    async fn get_membership(&self, publisher_id: i64, user_id: i64) -> Result<Option<Membership>>;

    /// Members of a publisher with their membership role, ordered by username
    async fn list_members(&self, publisher_id: i64) -> Result<Vec<UserSummary>>;

    /// Ids of publishers the user is an editor-member of
    async fn editor_publisher_ids(&self, user_id: i64) -> Result<Vec<i64>>;
}

pub struct SqlxPublisherRepository {
    pool: DynDatabasePool,
}

impl SqlxPublisherRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PublisherRepository> {
        Arc::new(Self::new(pool))
    }
}

const LIST_PUBLISHERS_SQL: &str = r#"
    SELECT p.id, p.name, p.created_at,
        (SELECT COUNT(*) FROM publisher_members m
            WHERE m.publisher_id = p.id AND m.member_role = 'journalist') AS journalist_count,
        (SELECT COUNT(*) FROM publisher_members m
            WHERE m.publisher_id = p.id AND m.member_role = 'editor') AS editor_count,
        (SELECT COUNT(*) FROM publisher_subscriptions s
            WHERE s.publisher_id = p.id) AS subscriber_count
    FROM publishers p
    ORDER BY p.name
"#;

const LIST_MEMBERS_SQL: &str = r#"
    SELECT u.id, u.username, m.member_role
    FROM publisher_members m
    JOIN users u ON u.id = m.user_id
    WHERE m.publisher_id = ?
    ORDER BY u.username
"#;

#[async_trait]
impl PublisherRepository for SqlxPublisherRepository {
    async fn create(&self, name: &str) -> Result<Publisher> {
        let now = Utc::now();
        let sql = "INSERT INTO publishers (name, created_at) VALUES (?, ?)";
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(name)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create publisher")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(name)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create publisher")?
                .last_insert_id() as i64,
        };

        Ok(Publisher {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>> {
        let sql = "SELECT id, name, created_at FROM publishers WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get publisher")?;
                Ok(row.as_ref().map(row_to_publisher_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get publisher")?;
                Ok(row.as_ref().map(row_to_publisher_mysql))
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Publisher>> {
        let sql = "SELECT id, name, created_at FROM publishers WHERE name = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get publisher by name")?;
                Ok(row.as_ref().map(row_to_publisher_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get publisher by name")?;
                Ok(row.as_ref().map(row_to_publisher_mysql))
            }
        }
    }

    async fn list(&self) -> Result<Vec<PublisherWithCounts>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(LIST_PUBLISHERS_SQL)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publishers")?;
                Ok(rows
                    .iter()
                    .map(|row| PublisherWithCounts {
                        publisher: row_to_publisher_sqlite(row),
                        journalist_count: row.get("journalist_count"),
                        editor_count: row.get("editor_count"),
                        subscriber_count: row.get("subscriber_count"),
                    })
                    .collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(LIST_PUBLISHERS_SQL)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publishers")?;
                Ok(rows
                    .iter()
                    .map(|row| PublisherWithCounts {
                        publisher: row_to_publisher_mysql(row),
                        journalist_count: row.get("journalist_count"),
                        editor_count: row.get("editor_count"),
                        subscriber_count: row.get("subscriber_count"),
                    })
                    .collect())
            }
        }
    }

    async fn add_member(&self, publisher_id: i64, user_id: i64, role: Role) -> Result<bool> {
        let now = Utc::now();
        let inserted = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(
                "INSERT OR IGNORE INTO publisher_members (publisher_id, user_id, member_role, joined_at) VALUES (?, ?, ?, ?)",
            )
            .bind(publisher_id)
            .bind(user_id)
            .bind(role.as_str())
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to add publisher member")?
            .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(
                "INSERT IGNORE INTO publisher_members (publisher_id, user_id, member_role, joined_at) VALUES (?, ?, ?, ?)",
            )
            .bind(publisher_id)
            .bind(user_id)
            .bind(role.as_str())
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to add publisher member")?
            .rows_affected(),
        };
        Ok(inserted > 0)
    }

    async fn remove_member(&self, publisher_id: i64, user_id: i64) -> Result<bool> {
        let sql = "DELETE FROM publisher_members WHERE publisher_id = ? AND user_id = ?";
        let removed = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(publisher_id)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to remove publisher member")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(publisher_id)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to remove publisher member")?
                .rows_affected(),
        };
        Ok(removed > 0)
    }

    async fn get_membership(&self, publisher_id: i64, user_id: i64) -> Result<Option<Membership>> {
        let sql = r#"
            SELECT publisher_id, user_id, member_role, joined_at
            FROM publisher_members
            WHERE publisher_id = ? AND user_id = ?
        "#;
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(sql)
                    .bind(publisher_id)
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get membership")?;
                row.as_ref().map(row_to_membership_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(sql)
                    .bind(publisher_id)
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get membership")?;
                row.as_ref().map(row_to_membership_mysql).transpose()
            }
        }
    }

    async fn list_members(&self, publisher_id: i64) -> Result<Vec<UserSummary>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(LIST_MEMBERS_SQL)
                    .bind(publisher_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publisher members")?;
                rows.iter()
                    .map(|row| {
                        member_summary(row.get("id"), row.get("username"), row.get("member_role"))
                    })
                    .collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(LIST_MEMBERS_SQL)
                    .bind(publisher_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publisher members")?;
                rows.iter()
                    .map(|row| {
                        member_summary(row.get("id"), row.get("username"), row.get("member_role"))
                    })
                    .collect()
            }
        }
    }

    async fn editor_publisher_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT publisher_id FROM publisher_members WHERE user_id = ? AND member_role = 'editor' ORDER BY publisher_id";
        let ids = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(user_id)
                .fetch_all(pool)
                .await
                .context("Failed to list editor publishers")?
                .iter()
                .map(|row| row.get("publisher_id"))
                .collect(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(user_id)
                .fetch_all(pool)
                .await
                .context("Failed to list editor publishers")?
                .iter()
                .map(|row| row.get("publisher_id"))
                .collect(),
        };
        Ok(ids)
    }
}

fn member_summary(id: i64, username: String, role: String) -> Result<UserSummary> {
    let role = Role::from_str(&role)
        .with_context(|| format!("Invalid member role in database: {}", role))?;
    Ok(UserSummary { id, username, role })
}

fn row_to_publisher_sqlite(row: &sqlx::sqlite::SqliteRow) -> Publisher {
    Publisher {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

fn row_to_membership_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Membership> {
    let role: String = row.get("member_role");
    Ok(Membership {
        publisher_id: row.get("publisher_id"),
        user_id: row.get("user_id"),
        role: Role::from_str(&role)?,
        joined_at: row.get("joined_at"),
    })
}

fn row_to_publisher_mysql(row: &sqlx::mysql::MySqlRow) -> Publisher {
    Publisher {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

fn row_to_membership_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Membership> {
    let role: String = row.get("member_role");
    Ok(Membership {
        publisher_id: row.get("publisher_id"),
        user_id: row.get("user_id"),
        role: Role::from_str(&role)?,
        joined_at: row.get("joined_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    async fn setup() -> (SqlxPublisherRepository, SqlxUserRepository) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        (
            SqlxPublisherRepository::new(pool.clone()),
            SqlxUserRepository::new(pool),
        )
    }

    async fn user(repo: &SqlxUserRepository, name: &str, role: Role) -> User {
        repo.create(&User::new(
            name.into(),
            format!("{}@example.com", name),
            "hash".into(),
            role,
        ))
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (publishers, _) = setup().await;
        let created = publishers.create("Daily Planet").await.unwrap();

        let by_id = publishers.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Daily Planet");
        assert!(publishers.get_by_name("Daily Planet").await.unwrap().is_some());
        assert!(publishers.get_by_id(999).await.unwrap().is_none());
        assert!(publishers.create("Daily Planet").await.is_err());
    }

    #[tokio::test]
    async fn test_add_member_twice_keeps_one_row() {
        let (publishers, users) = setup().await;
        let p = publishers.create("Daily Planet").await.unwrap();
        let j = user(&users, "clark", Role::Journalist).await;

        assert!(publishers.add_member(p.id, j.id, Role::Journalist).await.unwrap());
        assert!(!publishers.add_member(p.id, j.id, Role::Journalist).await.unwrap());

        let members = publishers.list_members(p.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, Role::Journalist);
    }

    #[tokio::test]
    async fn test_remove_member() {
        let (publishers, users) = setup().await;
        let p = publishers.create("Daily Planet").await.unwrap();
        let e = user(&users, "perry", Role::Editor).await;

        publishers.add_member(p.id, e.id, Role::Editor).await.unwrap();
        assert_eq!(publishers.editor_publisher_ids(e.id).await.unwrap(), vec![p.id]);
        let membership = publishers.get_membership(p.id, e.id).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::Editor);

        assert!(publishers.remove_member(p.id, e.id).await.unwrap());
        assert!(!publishers.remove_member(p.id, e.id).await.unwrap());
        assert!(publishers.get_membership(p.id, e.id).await.unwrap().is_none());
        assert!(publishers.editor_publisher_ids(e.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_counts_members() {
        let (publishers, users) = setup().await;
        let b = publishers.create("Bugle").await.unwrap();
        publishers.create("Atlas").await.unwrap();
        let j = user(&users, "clark", Role::Journalist).await;
        let e = user(&users, "perry", Role::Editor).await;
        publishers.add_member(b.id, j.id, Role::Journalist).await.unwrap();
        publishers.add_member(b.id, e.id, Role::Editor).await.unwrap();

        let listed = publishers.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].publisher.name, "Atlas");
        assert_eq!(listed[1].journalist_count, 1);
        assert_eq!(listed[1].editor_count, 1);
        assert_eq!(listed[1].subscriber_count, 0);
    }
}
