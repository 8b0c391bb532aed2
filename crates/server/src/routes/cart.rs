//! Cart routes.
//!
//! Mutations take the user's lock so they serialize with checkout.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ai_store_core::{ProductId, lenient_product_id};

use crate::db::{CartRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::models::CartItem;
use crate::state::AppState;

use super::products::ProductView;
use super::{Success, json_body, require_email};

/// Tables every cart route touches.
const CART_TABLES: [&str; 2] = ["cart", "products"];

/// Cart line as sent to the frontend: product fields plus quantity.
#[derive(Debug, Serialize)]
pub struct CartItemView {
    #[serde(flatten)]
    pub product: ProductView,
    pub quantity: i64,
}

impl From<CartItem> for CartItemView {
    fn from(item: CartItem) -> Self {
        Self {
            product: item.product.into(),
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_product_id")]
    pub product_id: ProductId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_product_id")]
    pub product_id: ProductId,
    pub quantity: i64,
}

fn ensure_cart_ready(state: &AppState) -> Result<()> {
    for table in CART_TABLES {
        state.schema().ensure_ready(table)?;
    }
    Ok(())
}

/// Cart lines for a user.
///
/// GET /api/cart
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Query(query): Query<CartQuery>,
) -> Result<Json<Vec<CartItemView>>> {
    let email = require_email(query.email.as_deref())?;
    ensure_cart_ready(&state)?;

    let items = CartRepository::new(state.pool()).items(&email).await?;
    Ok(Json(items.into_iter().map(CartItemView::from).collect()))
}

/// Add one unit of a product.
///
/// POST /api/cart/add
///
/// # Errors
///
/// 404 if the user or product does not exist.
#[instrument(skip_all)]
pub async fn add(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddRequest>, JsonRejection>,
) -> Result<Json<Success>> {
    let body = json_body(payload)?;
    let email = require_email(body.email.as_deref())?;
    ensure_cart_ready(&state)?;

    let _guard = state.locks().lock(&email).await;
    CartRepository::new(state.pool())
        .add(&email, body.product_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                AppError::NotFound("사용자 또는 상품을 찾을 수 없습니다.".to_owned())
            }
            other => other.into(),
        })?;

    Ok(Json(Success::OK))
}

/// Set a line's quantity; zero or less removes it.
///
/// POST /api/cart/update
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<Success>> {
    let body = json_body(payload)?;
    let email = require_email(body.email.as_deref())?;
    ensure_cart_ready(&state)?;

    let _guard = state.locks().lock(&email).await;
    CartRepository::new(state.pool())
        .set_quantity(&email, body.product_id, body.quantity)
        .await?;

    Ok(Json(Success::OK))
}

/// Remove one line.
///
/// DELETE /api/cart/{email}/{productId}
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path((email, product_id)): Path<(String, String)>,
) -> Result<Json<Success>> {
    let email = require_email(Some(&email))?;
    let product_id: ProductId = product_id
        .parse()
        .map_err(|_| AppError::Validation(format!("invalid product id: {product_id}")))?;
    ensure_cart_ready(&state)?;

    let _guard = state.locks().lock(&email).await;
    CartRepository::new(state.pool())
        .remove(&email, product_id)
        .await?;

    Ok(Json(Success::OK))
}

/// Remove every line of a user's cart.
///
/// DELETE /api/cart/{email}
#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Success>> {
    let email = require_email(Some(&email))?;
    ensure_cart_ready(&state)?;

    let _guard = state.locks().lock(&email).await;
    CartRepository::new(state.pool()).clear(&email).await?;

    Ok(Json(Success::OK))
}
