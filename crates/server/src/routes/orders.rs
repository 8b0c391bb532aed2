//! Order history and checkout routes.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ai_store_core::OrderLine;

use crate::db::OrderRepository;
use crate::db::orders::SortOrder;
use crate::error::{Result, add_breadcrumb};
use crate::models::Order;
use crate::services::CheckoutService;
use crate::state::AppState;

use super::{json_body, require_email};

/// Order as sent to the frontend.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: String,
    pub user_email: String,
    pub date: String,
    pub total: i64,
    pub status: String,
    pub items: Vec<OrderLine>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_email: order.user_email.into_inner(),
            date: order.date,
            total: order.total.minor(),
            status: order.status.to_string(),
            items: order.items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub email: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: String,
}

/// A user's orders by date, newest first unless `sort=asc`.
///
/// GET /api/orders
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<OrderView>>> {
    let email = require_email(query.email.as_deref())?;
    state.schema().ensure_ready("orders")?;
    let legacy_items_json = state.schema().has_column("orders", "items_json");

    let orders = OrderRepository::new(state.pool())
        .list_for_user(&email, query.sort, legacy_items_json)
        .await?;

    Ok(Json(orders.into_iter().map(OrderView::from).collect()))
}

/// Check out the user's cart.
///
/// POST /api/orders
///
/// # Errors
///
/// 400 for an empty cart; storage failures are reported generically.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>> {
    let body = json_body(payload)?;
    let email = require_email(body.email.as_deref())?;
    tracing::info!(user = %email, "Checkout requested");

    let order_id = CheckoutService::new(
        state.pool(),
        state.schema(),
        state.locks(),
        state.experiments(),
    )
    .checkout(&email)
    .await?;

    let order_id = order_id.to_string();
    add_breadcrumb("checkout", "Order placed", &[("order_id", &order_id)]);

    Ok(Json(CheckoutResponse {
        success: true,
        order_id,
    }))
}
