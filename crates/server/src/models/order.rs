//! Order domain types.

use ai_store_core::{Email, Money, OrderId, OrderLine, OrderStatus};

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_email: Email,
    /// ISO-8601 creation timestamp as stored.
    pub date: String,
    pub total: Money,
    pub status: OrderStatus,
    /// Snapshot lines; empty when the stored snapshot could not be parsed.
    pub items: Vec<OrderLine>,
}

/// An order about to be inserted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_email: Email,
    pub date: String,
    pub total: Money,
    pub status: OrderStatus,
    /// Serialized snapshot text.
    pub items: String,
}
