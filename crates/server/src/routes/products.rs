//! Product catalog routes.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::ProductRepository;
use crate::error::Result;
use crate::models::Product;
use crate::state::AppState;

/// Product as sent to the frontend; ids are strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name,
            price: product.price.minor(),
            description: product.description,
            category: product.category,
            image_url: product.image_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// List products, filtered by `q` over name, description and category.
///
/// GET /api/products
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductView>>> {
    state.schema().ensure_ready("products")?;

    let products = ProductRepository::new(state.pool())
        .list(query.q.as_deref())
        .await?;

    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}
