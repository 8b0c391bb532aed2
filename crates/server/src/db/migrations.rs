//! Startup schema migrator.
//!
//! The schema is described declaratively as a list of [`TablePlan`]s. Each plan
//! names a baseline `CREATE TABLE` and the columns added by later revisions.
//! Running the plans is additive and idempotent: tables are created only when
//! absent, columns are added only when the live table lacks them, and legacy
//! columns are copied forward but never dropped.
//!
//! The live structure is inspected with `pragma_table_info` on every run; no
//! version number is stored. Tables migrate independently, so one table
//! failing leaves the others usable. The resulting [`SchemaState`] records
//! which tables are safe to serve.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::RepositoryError;

/// Errors from a single migration step.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to inspect table '{table}': {source}")]
    Inspect {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to create table '{table}': {source}")]
    Create {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to add column '{table}.{column}': {source}")]
    AddColumn {
        table: &'static str,
        column: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to backfill '{table}.{column}' from '{legacy}': {source}")]
    Backfill {
        table: &'static str,
        column: &'static str,
        legacy: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Baseline definition of a table.
#[derive(Debug, Clone, Copy)]
pub struct TableDefinition {
    pub name: &'static str,
    /// `CREATE TABLE IF NOT EXISTS ...` statement
    pub create_sql: &'static str,
}

/// A column introduced after a table's baseline.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinition {
    pub name: &'static str,
    /// SQLite type name, e.g. `TEXT`
    pub sql_type: &'static str,
    /// SQL literal used as the column default when it is added
    pub default: Option<&'static str>,
    /// Deprecated column whose values are copied into this one
    pub legacy_name: Option<&'static str>,
}

/// Everything needed to bring one table up to date.
#[derive(Debug, Clone, Copy)]
pub struct TablePlan {
    pub table: TableDefinition,
    pub columns: &'static [ColumnDefinition],
}

/// The store's schema, in creation order.
pub static STORE_SCHEMA: &[TablePlan] = &[
    TablePlan {
        table: TableDefinition {
            name: "products",
            create_sql: r"
                CREATE TABLE IF NOT EXISTS products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    price INTEGER NOT NULL,
                    description TEXT,
                    category TEXT,
                    imageUrl TEXT
                )",
        },
        columns: &[],
    },
    TablePlan {
        table: TableDefinition {
            name: "users",
            create_sql: r"
                CREATE TABLE IF NOT EXISTS users (
                    email TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    password TEXT NOT NULL,
                    country TEXT DEFAULT 'KR'
                )",
        },
        columns: &[ColumnDefinition {
            name: "country",
            sql_type: "TEXT",
            default: Some("'KR'"),
            legacy_name: None,
        }],
    },
    TablePlan {
        table: TableDefinition {
            name: "cart",
            create_sql: r"
                CREATE TABLE IF NOT EXISTS cart (
                    user_email TEXT,
                    product_id INTEGER,
                    quantity INTEGER,
                    PRIMARY KEY (user_email, product_id),
                    FOREIGN KEY (user_email) REFERENCES users(email),
                    FOREIGN KEY (product_id) REFERENCES products(id)
                )",
        },
        columns: &[],
    },
    TablePlan {
        table: TableDefinition {
            name: "orders",
            create_sql: r"
                CREATE TABLE IF NOT EXISTS orders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_email TEXT NOT NULL,
                    date TEXT NOT NULL,
                    total INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    items TEXT NOT NULL,
                    FOREIGN KEY (user_email) REFERENCES users(email)
                )",
        },
        columns: &[ColumnDefinition {
            name: "items",
            sql_type: "TEXT",
            default: Some("''"),
            legacy_name: Some("items_json"),
        }],
    },
];

/// Result of [`ensure_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    Created,
    AlreadyPresent,
}

/// Result of [`ensure_column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnOutcome {
    /// The column was missing and has been added.
    pub added: bool,
    /// Rows whose value was copied from the legacy column.
    pub backfilled: u64,
}

/// Migration status of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    /// Fully migrated; holds the live column names.
    Ready { columns: BTreeSet<String> },
    /// At least one step failed; the table must not be served.
    Failed { error: String },
}

/// Live schema after a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaState {
    tables: BTreeMap<String, TableStatus>,
}

impl SchemaState {
    /// Fail unless `table` migrated successfully.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::SchemaNotReady` for failed or unknown tables.
    pub fn ensure_ready(&self, table: &str) -> Result<(), RepositoryError> {
        match self.tables.get(table) {
            Some(TableStatus::Ready { .. }) => Ok(()),
            _ => Err(RepositoryError::SchemaNotReady(table.to_owned())),
        }
    }

    /// Whether the live `table` has `column`.
    #[must_use]
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        matches!(
            self.tables.get(table),
            Some(TableStatus::Ready { columns }) if columns.contains(column)
        )
    }

    /// Tables whose migration failed, with the error message.
    pub fn failed_tables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().filter_map(|(name, status)| match status {
            TableStatus::Failed { error } => Some((name.as_str(), error.as_str())),
            TableStatus::Ready { .. } => None,
        })
    }

    /// True when every table migrated.
    #[must_use]
    pub fn is_fully_migrated(&self) -> bool {
        self.failed_tables().next().is_none()
    }

    #[must_use]
    pub fn status(&self, table: &str) -> Option<&TableStatus> {
        self.tables.get(table)
    }
}

/// Runs a list of table plans against a pool.
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
    plans: &'static [TablePlan],
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(STORE_SCHEMA)
    }
}

impl Migrator {
    #[must_use]
    pub const fn new(plans: &'static [TablePlan]) -> Self {
        Self { plans }
    }

    /// Table names in creation order.
    pub fn table_names(&self) -> impl Iterator<Item = &'static str> {
        self.plans.iter().map(|plan| plan.table.name)
    }

    /// Migrate every table, containing failures per table.
    ///
    /// Never fails as a whole: a table whose steps fail is recorded as
    /// [`TableStatus::Failed`] and the remaining tables still run.
    #[instrument(skip_all)]
    pub async fn run(&self, pool: &SqlitePool) -> SchemaState {
        let mut state = SchemaState::default();

        for plan in self.plans {
            let name = plan.table.name;
            let status = match migrate_table(pool, plan).await {
                Ok(columns) => TableStatus::Ready { columns },
                Err(e) => {
                    error!(
                        table = name,
                        error = %e,
                        "Table migration failed; table will not be served"
                    );
                    TableStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            state.tables.insert(name.to_owned(), status);
        }

        if state.is_fully_migrated() {
            info!(tables = state.tables.len(), "Schema is up to date");
        } else {
            warn!(
                failed = state.failed_tables().count(),
                "Schema migration finished with failed tables"
            );
        }

        state
    }
}

/// Create the table, then ensure each later column; returns the live columns.
///
/// A failed column does not stop the remaining columns, but the first error is
/// reported so the table is marked unusable.
async fn migrate_table(
    pool: &SqlitePool,
    plan: &TablePlan,
) -> Result<BTreeSet<String>, MigrationError> {
    let table = plan.table.name;
    if ensure_table(pool, &plan.table).await? == TableOutcome::Created {
        info!(table, "Created table");
    }

    let mut first_error = None;
    for column in plan.columns {
        match ensure_column(pool, table, column).await {
            Ok(outcome) => {
                if outcome.added {
                    info!(table, column = column.name, "Added column");
                }
                if outcome.backfilled > 0 {
                    info!(
                        table,
                        column = column.name,
                        legacy = column.legacy_name,
                        rows = outcome.backfilled,
                        "Backfilled column from legacy column"
                    );
                }
            }
            Err(e) => {
                error!(table, column = column.name, error = %e, "Column migration failed");
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    live_columns(pool, table).await
}

/// Create a table if it does not exist.
///
/// # Errors
///
/// Returns `MigrationError` if inspection or creation fails.
pub async fn ensure_table(
    pool: &SqlitePool,
    definition: &TableDefinition,
) -> Result<TableOutcome, MigrationError> {
    if table_exists(pool, definition.name).await? {
        return Ok(TableOutcome::AlreadyPresent);
    }

    // IF NOT EXISTS: a concurrent process may have created it since the check
    sqlx::query(definition.create_sql)
        .execute(pool)
        .await
        .map_err(|source| MigrationError::Create {
            table: definition.name,
            source,
        })?;

    Ok(TableOutcome::Created)
}

/// Add `column` to `table` if missing, then backfill it from the legacy column.
///
/// The backfill copies non-empty legacy values wherever the new column is
/// still NULL or empty, and runs whenever the legacy column exists so that
/// rows written by older code during a rollout are picked up too. The legacy
/// column itself is left in place.
///
/// # Errors
///
/// Returns `MigrationError` if inspection, `ALTER TABLE` or the backfill fails.
pub async fn ensure_column(
    pool: &SqlitePool,
    table: &'static str,
    column: &ColumnDefinition,
) -> Result<ColumnOutcome, MigrationError> {
    let mut outcome = ColumnOutcome::default();
    let columns = live_columns(pool, table).await?;

    if !columns.contains(column.name) {
        let default_clause = column
            .default
            .map(|literal| format!(" DEFAULT {literal}"))
            .unwrap_or_default();
        let sql = format!(
            r#"ALTER TABLE "{table}" ADD COLUMN "{}" {}{default_clause}"#,
            column.name, column.sql_type
        );

        if let Err(source) = sqlx::query(&sql).execute(pool).await {
            // Another process may have added it between inspection and ALTER
            if !live_columns(pool, table).await?.contains(column.name) {
                return Err(MigrationError::AddColumn {
                    table,
                    column: column.name,
                    source,
                });
            }
        } else {
            outcome.added = true;
        }
    }

    if let Some(legacy) = column.legacy_name
        && columns.contains(legacy)
    {
        let sql = format!(
            r#"UPDATE "{table}" SET "{new}" = "{legacy}"
               WHERE ("{new}" IS NULL OR "{new}" = '')
                 AND "{legacy}" IS NOT NULL AND "{legacy}" <> ''"#,
            new = column.name,
        );
        let result = sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(|source| MigrationError::Backfill {
                table,
                column: column.name,
                legacy,
                source,
            })?;
        outcome.backfilled = result.rows_affected();
    }

    Ok(outcome)
}

async fn table_exists(pool: &SqlitePool, table: &'static str) -> Result<bool, MigrationError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(table)
            .fetch_optional(pool)
            .await
            .map_err(|source| MigrationError::Inspect { table, source })?;
    Ok(found.is_some())
}

/// Column names of the live table (empty if the table does not exist).
async fn live_columns(
    pool: &SqlitePool,
    table: &'static str,
) -> Result<BTreeSet<String>, MigrationError> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|source| MigrationError::Inspect { table, source })?;
    Ok(names.into_iter().collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    async fn schema_sql(pool: &SqlitePool) -> Vec<(String, String)> {
        sqlx::query_as(
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_store_gets_every_table() {
        let pool = connect_in_memory().await.unwrap();
        let state = Migrator::default().run(&pool).await;

        assert!(state.is_fully_migrated());
        for table in ["products", "users", "cart", "orders"] {
            state.ensure_ready(table).unwrap();
        }
        assert!(state.has_column("orders", "items"));
        assert!(!state.has_column("orders", "items_json"));
        assert!(state.has_column("users", "country"));
    }

    #[tokio::test]
    async fn test_running_twice_is_a_no_op() {
        let pool = connect_in_memory().await.unwrap();
        let first = Migrator::default().run(&pool).await;
        let sql_after_first = schema_sql(&pool).await;

        let second = Migrator::default().run(&pool).await;
        assert_eq!(first, second);
        assert_eq!(sql_after_first, schema_sql(&pool).await);
    }

    #[tokio::test]
    async fn test_ensure_table_reports_existing() {
        let pool = connect_in_memory().await.unwrap();
        let def = STORE_SCHEMA[0].table;
        assert_eq!(ensure_table(&pool, &def).await.unwrap(), TableOutcome::Created);
        assert_eq!(
            ensure_table(&pool, &def).await.unwrap(),
            TableOutcome::AlreadyPresent
        );
    }

    #[tokio::test]
    async fn test_users_without_country_get_default() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "CREATE TABLE users (email TEXT PRIMARY KEY, name TEXT NOT NULL, password TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO users VALUES ('old@store.kr', 'Old', 'pw')")
            .execute(&pool)
            .await
            .unwrap();

        let state = Migrator::default().run(&pool).await;
        assert!(state.has_column("users", "country"));

        let country: Option<String> =
            sqlx::query_scalar("SELECT country FROM users WHERE email = 'old@store.kr'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(country.as_deref(), Some("KR"));
    }

    #[tokio::test]
    async fn test_legacy_items_json_is_backfilled_and_kept() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT, user_email TEXT NOT NULL, \
             date TEXT NOT NULL, total INTEGER NOT NULL, status TEXT NOT NULL, items_json TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (email, json) in [("a@x.kr", "[{\"id\":1}]"), ("b@x.kr", ""), ("c@x.kr", "[]")] {
            sqlx::query(
                "INSERT INTO orders (user_email, date, total, status, items_json) \
                 VALUES (?1, '2024-01-01T00:00:00Z', 0, 'processing', ?2)",
            )
            .bind(email)
            .bind(json)
            .execute(&pool)
            .await
            .unwrap();
        }

        let column = STORE_SCHEMA[3].columns[0];
        let outcome = ensure_column(&pool, "orders", &column).await.unwrap();
        assert!(outcome.added);
        assert_eq!(outcome.backfilled, 2);

        let again = ensure_column(&pool, "orders", &column).await.unwrap();
        assert_eq!(again, ColumnOutcome::default());

        let rows: Vec<(String, String, Option<String>)> =
            sqlx::query_as("SELECT user_email, items, items_json FROM orders ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].1, "[{\"id\":1}]");
        assert_eq!(rows[1].1, "");
        assert_eq!(rows[2].1, "[]");
        assert!(rows.iter().all(|row| row.2.is_some()));
    }

    #[tokio::test]
    async fn test_failed_table_does_not_block_others() {
        static BROKEN: &[TablePlan] = &[
            TablePlan {
                table: TableDefinition {
                    name: "broken",
                    create_sql: "CREATE TABLE IF NOT EXISTS broken (",
                },
                columns: &[],
            },
            TablePlan {
                table: TableDefinition {
                    name: "fine",
                    create_sql: "CREATE TABLE IF NOT EXISTS fine (id INTEGER)",
                },
                columns: &[],
            },
        ];

        let pool = connect_in_memory().await.unwrap();
        let state = Migrator::new(BROKEN).run(&pool).await;

        assert!(!state.is_fully_migrated());
        assert!(matches!(
            state.ensure_ready("broken"),
            Err(RepositoryError::SchemaNotReady(t)) if t == "broken"
        ));
        state.ensure_ready("fine").unwrap();
        assert_eq!(state.failed_tables().count(), 1);
    }
}
