//! Catalog product.

use ai_store_core::{Money, ProductId};

/// A catalog product as currently listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in minor units.
    pub price: Money,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}
