//! Order repository.
//!
//! Orders are written once at checkout and never updated here. The line
//! snapshot lives in `items`; deployments that predate it also carry an
//! `items_json` column which is kept in sync on insert and used as a read
//! fallback while older rows still depend on it.

use ai_store_core::{Email, Money, OrderId, OrderLine, OrderStatus};
use serde::Deserialize;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::warn;

use super::RepositoryError;
use crate::models::{NewOrder, Order};

/// Listing order by creation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    Desc,
    Asc,
}

impl SortOrder {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Desc => "DESC",
            Self::Asc => "ASC",
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_email: String,
    date: String,
    total: i64,
    status: String,
    items: Option<String>,
    items_json: Option<String>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, RepositoryError> {
        let user_email = Email::parse(&self.user_email).map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: invalid email: {e}", self.id))
        })?;

        let status = self.status.parse().unwrap_or_else(|_| {
            warn!(order_id = self.id, status = %self.status, "Unknown order status");
            OrderStatus::default()
        });

        let snapshot = match self.items.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => self.items_json.as_deref().unwrap_or_default(),
        };
        let items = OrderLine::decode_snapshot(snapshot).unwrap_or_else(|e| {
            warn!(order_id = self.id, error = %e, "Unreadable order snapshot");
            Vec::new()
        });

        Ok(Order {
            id: OrderId::new(self.id),
            user_email,
            date: self.date,
            total: Money::from_minor(self.total),
            status,
            items,
        })
    }
}

/// Insert an order and return its id.
///
/// With `legacy_items_json` set the snapshot is also written to the
/// deprecated `items_json` column.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_order<'e, E>(
    executor: E,
    order: &NewOrder,
    legacy_items_json: bool,
) -> Result<OrderId, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = if legacy_items_json {
        r"
        INSERT INTO orders (user_email, date, total, status, items, items_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "
    } else {
        r"
        INSERT INTO orders (user_email, date, total, status, items)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "
    };

    let result = sqlx::query(sql)
        .bind(order.user_email.as_str())
        .bind(&order.date)
        .bind(order.total.minor())
        .bind(order.status.as_str())
        .bind(&order.items)
        .execute(executor)
        .await?;

    Ok(OrderId::new(result.last_insert_rowid()))
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List a user's orders by date.
    ///
    /// Set `legacy_items_json` when the live table still has `items_json`.
    /// Orders whose snapshot cannot be parsed come back with no items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        email: &Email,
        sort: SortOrder,
        legacy_items_json: bool,
    ) -> Result<Vec<Order>, RepositoryError> {
        let legacy = if legacy_items_json {
            "items_json"
        } else {
            "NULL AS items_json"
        };
        let sql = format!(
            "SELECT id, user_email, date, total, status, items, {legacy} \
             FROM orders WHERE user_email = ?1 ORDER BY date {dir}, id {dir}",
            dir = sort.as_sql(),
        );

        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(email.as_str())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// Get one order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        id: OrderId,
        legacy_items_json: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        let legacy = if legacy_items_json {
            "items_json"
        } else {
            "NULL AS items_json"
        };
        let sql = format!(
            "SELECT id, user_email, date, total, status, items, {legacy} FROM orders WHERE id = ?1"
        );

        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(OrderRow::into_order).transpose()
    }
}
