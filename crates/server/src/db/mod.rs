//! Database operations for the store's SQLite database.
//!
//! ## Tables
//!
//! - `products` - Catalog (read-only for checkout)
//! - `users` - Registered shoppers keyed by email
//! - `cart` - One row per (user, product) with a quantity
//! - `orders` - Immutable order records with a JSON line snapshot
//!
//! # Migrations
//!
//! The schema is brought up to date on every start by [`migrations::Migrator`],
//! and can be run on its own with:
//! ```bash
//! cargo run -p ai-store-cli -- migrate
//! ```

pub mod cart;
pub mod migrations;
pub mod orders;
pub mod products;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

pub use cart::CartRepository;
pub use migrations::{Migrator, SchemaState};
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The table failed its startup migration and cannot be used safely.
    #[error("table '{0}' is not migrated")]
    SchemaNotReady(String),
}

/// Create a SQLite connection pool with sensible defaults.
///
/// The database file is created if missing. Foreign keys are enforced and a
/// busy timeout lets concurrent writers queue instead of failing.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the connection cannot be
/// established.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Create a single-connection in-memory pool.
///
/// The connection is never recycled, since closing it would drop the database.
///
/// # Errors
///
/// Returns `sqlx::Error` if SQLite cannot be opened.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Map a unique-constraint violation to `RepositoryError::Conflict`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}
