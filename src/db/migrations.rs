//! Embedded schema migrations
//!
//! Each [`Migration`] carries SQL for both SQLite and MySQL. Applied versions
//! are recorded in the `_migrations` table so [`run_migrations`] is idempotent.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::{Backend, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL,
                is_staff BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL,
                is_staff BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 2,
        name: "create_publishers",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS publishers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS publisher_members (
                publisher_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                member_role VARCHAR(20) NOT NULL,
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (publisher_id, user_id),
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_publisher_members_user ON publisher_members(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS publishers (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS publisher_members (
                publisher_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                member_role VARCHAR(20) NOT NULL,
                joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (publisher_id, user_id),
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_publisher_members_user ON publisher_members(user_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_articles",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                publisher_id INTEGER,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                reviewed_by INTEGER,
                reviewed_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE SET NULL,
                FOREIGN KEY (reviewed_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
            CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author_id);
            CREATE INDEX IF NOT EXISTS idx_articles_publisher ON articles(publisher_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                content LONGTEXT NOT NULL,
                author_id BIGINT NOT NULL,
                publisher_id BIGINT,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                reviewed_by BIGINT,
                reviewed_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE SET NULL,
                FOREIGN KEY (reviewed_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_articles_status ON articles(status);
            CREATE INDEX idx_articles_author ON articles(author_id);
            CREATE INDEX idx_articles_publisher ON articles(publisher_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_newsletters",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS newsletters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS newsletter_articles (
                newsletter_id INTEGER NOT NULL,
                article_id INTEGER NOT NULL,
                PRIMARY KEY (newsletter_id, article_id),
                FOREIGN KEY (newsletter_id) REFERENCES newsletters(id) ON DELETE CASCADE,
                FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_newsletters_author ON newsletters(author_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS newsletters (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                author_id BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS newsletter_articles (
                newsletter_id BIGINT NOT NULL,
                article_id BIGINT NOT NULL,
                PRIMARY KEY (newsletter_id, article_id),
                FOREIGN KEY (newsletter_id) REFERENCES newsletters(id) ON DELETE CASCADE,
                FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_newsletters_author ON newsletters(author_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_subscriptions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS publisher_subscriptions (
                reader_id INTEGER NOT NULL,
                publisher_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (reader_id, publisher_id),
                FOREIGN KEY (reader_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS journalist_subscriptions (
                reader_id INTEGER NOT NULL,
                journalist_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (reader_id, journalist_id),
                FOREIGN KEY (reader_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (journalist_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_publisher_subs_publisher ON publisher_subscriptions(publisher_id);
            CREATE INDEX IF NOT EXISTS idx_journalist_subs_journalist ON journalist_subscriptions(journalist_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS publisher_subscriptions (
                reader_id BIGINT NOT NULL,
                publisher_id BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (reader_id, publisher_id),
                FOREIGN KEY (reader_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS journalist_subscriptions (
                reader_id BIGINT NOT NULL,
                journalist_id BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (reader_id, journalist_id),
                FOREIGN KEY (reader_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (journalist_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_publisher_subs_publisher ON publisher_subscriptions(publisher_id);
            CREATE INDEX idx_journalist_subs_journalist ON journalist_subscriptions(journalist_id);
        "#,
    },
];

/// Apply every migration that has not been recorded yet.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied_versions.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.name
        );
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.backend() {
        Backend::Sqlite(pool) => get_applied_migrations_sqlite(pool).await,
        Backend::Mysql(pool) => get_applied_migrations_mysql(pool).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.backend() {
        Backend::Sqlite(pool) => apply_migration_sqlite(pool, migration).await,
        Backend::Mysql(pool) => apply_migration_mysql(pool, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a migration script into statements, dropping comment-only fragments.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
