//! Database layer
//!
//! SQLite is the default backend; MySQL is selected through `database.driver`.
//!
//! ```ignore
//! use newsdesk::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
