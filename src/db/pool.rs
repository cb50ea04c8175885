//! Database connection pool abstraction
//!
//! Repositories hold a [`DynDatabasePool`] and dispatch on [`DatabasePool::backend`]
//! to the SQLite or MySQL query set.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// Backend-agnostic handle to a connection pool.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a raw SQL statement that doesn't return rows
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Check if the database connection is healthy
    async fn ping(&self) -> Result<()>;

    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Borrow the concrete pool for query dispatch
    fn backend(&self) -> Backend<'_>;
}

/// Concrete pool borrowed from a [`DatabasePool`].
#[derive(Clone, Copy)]
pub enum Backend<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

/// SQLite connection pool
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connect to a SQLite database, creating the file and its directory if needed.
    pub async fn new(url: &str) -> Result<Self> {
        let in_memory = url == ":memory:" || url.starts_with("sqlite::memory:");

        if !in_memory {
            let path = url.trim_start_matches("sqlite:");
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {:?}", parent)
                    })?;
                }
            }
        }

        // sqlx opens `sqlite::memory:` as a uniquely named shared-cache database
        let connection_url = if in_memory {
            "sqlite::memory:".to_string()
        } else if url.starts_with("sqlite:") {
            if url.contains('?') {
                url.to_string()
            } else {
                format!("{}?mode=rwc", url)
            }
        } else {
            format!("sqlite:{}?mode=rwc", url)
        };

        let mut options = SqlitePoolOptions::new().max_connections(16);
        if in_memory {
            // The database is dropped with its last connection
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .context("Failed to enable foreign keys")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }

    fn backend(&self) -> Backend<'_> {
        Backend::Sqlite(&self.pool)
    }
}

/// MySQL connection pool
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(30)
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to MySQL database: {}", url))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }

    fn backend(&self) -> Backend<'_> {
        Backend::Mysql(&self.pool)
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Create the pool selected by `config.driver`.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    match config.driver {
        DatabaseDriver::Sqlite => Ok(Arc::new(SqliteDatabase::new(&config.url).await?)),
        DatabaseDriver::Mysql => Ok(Arc::new(MysqlDatabase::new(&config.url).await?)),
    }
}

/// In-memory SQLite pool for tests. All connections share one database.
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}
