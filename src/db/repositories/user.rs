//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Role, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user together with its role and staff flag
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Set or clear the staff flag
    async fn set_staff(&self, id: i64, is_staff: bool) -> Result<()>;

    /// List users holding `role`, ordered by username
    async fn list_by_role(&self, role: Role) -> Result<Vec<User>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                fetch_user_sqlite(pool, "id = ?", UserKey::Id(id)).await
            }
            Backend::Mysql(pool) => fetch_user_mysql(pool, "id = ?", UserKey::Id(id)).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                fetch_user_sqlite(pool, "username = ?", UserKey::Text(username)).await
            }
            Backend::Mysql(pool) => {
                fetch_user_mysql(pool, "username = ?", UserKey::Text(username)).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                fetch_user_sqlite(pool, "email = ?", UserKey::Text(email)).await
            }
            Backend::Mysql(pool) => fetch_user_mysql(pool, "email = ?", UserKey::Text(email)).await,
        }
    }

    async fn set_staff(&self, id: i64, is_staff: bool) -> Result<()> {
        let sql = "UPDATE users SET is_staff = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(is_staff)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update staff flag")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(is_staff)
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update staff flag")?;
            }
        }
        Ok(())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_users_by_role_sqlite(pool, role).await,
            Backend::Mysql(pool) => list_users_by_role_mysql(pool, role).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .get("count"),
        };
        Ok(count)
    }
}

/// Lookup key bound into a single-row user query
enum UserKey<'a> {
    Id(i64),
    Text(&'a str),
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_staff, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, is_staff, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.is_staff)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn fetch_user_sqlite(
    pool: &SqlitePool,
    predicate: &str,
    key: UserKey<'_>,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Text(text) => query.bind(text),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn list_users_by_role_sqlite(pool: &SqlitePool, role: Role) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY username",
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(role.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to list users by role")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = Role::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        is_staff: row.get("is_staff"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, is_staff, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.is_staff)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn fetch_user_mysql(
    pool: &MySqlPool,
    predicate: &str,
    key: UserKey<'_>,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Text(text) => query.bind(text),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn list_users_by_role_mysql(pool: &MySqlPool, role: Role) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY username",
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(role.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to list users by role")?;

    rows.iter().map(row_to_user_mysql).collect()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = Role::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        is_staff: row.get("is_staff"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(username: &str, role: Role) -> User {
        User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "hash".to_string(),
            role,
        )
    }

    #[tokio::test]
    async fn test_create_and_fetch_user() {
        let repo = setup_test_repo().await;

        let created = repo.create(&test_user("jane", Role::Journalist)).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "jane");
        assert_eq!(by_id.role, Role::Journalist);
        assert!(!by_id.is_staff);

        let by_name = repo.get_by_username("jane").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        let by_email = repo.get_by_email("jane@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("jane", Role::Journalist)).await.unwrap();

        let mut dup = test_user("jane", Role::Reader);
        dup.email = "other@example.com".to_string();
        assert!(repo.create(&dup).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_staff() {
        let repo = setup_test_repo().await;
        let user = repo.create(&test_user("chief", Role::Editor)).await.unwrap();

        repo.set_staff(user.id, true).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap().unwrap().is_staff);

        repo.set_staff(user.id, false).await.unwrap();
        assert!(!repo.get_by_id(user.id).await.unwrap().unwrap().is_staff);
    }

    #[tokio::test]
    async fn test_list_by_role() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("zed", Role::Journalist)).await.unwrap();
        repo.create(&test_user("amy", Role::Journalist)).await.unwrap();
        repo.create(&test_user("rob", Role::Reader)).await.unwrap();

        let journalists = repo.list_by_role(Role::Journalist).await.unwrap();
        let names: Vec<_> = journalists.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }
}
