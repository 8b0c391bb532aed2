//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::ServerConfig;
use crate::db::SchemaState;
use crate::services::{ExperimentClient, UserLocks};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: SqlitePool,
    schema: SchemaState,
    locks: UserLocks,
    experiments: ExperimentClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `schema` is the result of the startup migration run against `pool`.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        pool: SqlitePool,
        schema: SchemaState,
        experiments: ExperimentClient,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                schema,
                locks: UserLocks::new(),
                experiments,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Live schema recorded at startup.
    #[must_use]
    pub fn schema(&self) -> &SchemaState {
        &self.inner.schema
    }

    /// Per-user locks shared by cart mutations and checkout.
    #[must_use]
    pub fn locks(&self) -> &UserLocks {
        &self.inner.locks
    }

    #[must_use]
    pub fn experiments(&self) -> &ExperimentClient {
        &self.inner.experiments
    }
}
