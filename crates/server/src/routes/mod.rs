//! HTTP route handlers for the store API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /                            - Banner
//! GET    /health                      - Liveness
//! GET    /health/ready                - Database and schema readiness
//!
//! GET    /api/products?q=             - List or search products
//! POST   /api/register                - Register, returns variant + UI config
//! POST   /api/login                   - Login, returns variant + UI config
//!
//! GET    /api/cart?email=             - Cart lines with product data
//! POST   /api/cart/add                - Add one unit
//! POST   /api/cart/update             - Set quantity (<= 0 removes)
//! DELETE /api/cart/{email}/{productId} - Remove one line
//! DELETE /api/cart/{email}            - Clear the cart
//!
//! GET    /api/orders?email=&sort=     - Order history (desc by default)
//! POST   /api/orders                  - Checkout
//! ```

pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;
pub mod products;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    routing::{delete, get, post},
};
use serde::Serialize;

use ai_store_core::Email;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Body returned by mutations that have nothing else to report.
#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub const OK: Self = Self { success: true };
}

/// Unwrap a JSON body, turning extractor rejections into 400s.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Parse a required email field.
fn require_email(value: Option<&str>) -> Result<Email> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => Ok(Email::parse(raw)?),
        None => Err(AppError::Validation("이메일이 필요합니다.".to_owned())),
    }
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/{email}", delete(cart::clear))
        .route("/{email}/{product_id}", delete(cart::remove))
}

/// Create all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .nest("/cart", cart_routes())
        .route("/orders", get(orders::index).post(orders::create))
        .fallback(not_found)
}

/// Unknown API paths answer with a JSON 404 instead of the SPA shell.
async fn not_found() -> AppError {
    AppError::NotFound("Not found".to_owned())
}

/// Create all routes for the server.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
}
