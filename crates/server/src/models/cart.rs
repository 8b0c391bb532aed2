//! Cart line joined with its product.

use ai_store_core::OrderLine;

use super::Product;

/// A cart line with the product's current catalog data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub product: Product,
    /// Always positive; non-positive updates delete the line.
    pub quantity: i64,
}

impl CartItem {
    /// Freeze this line into an order snapshot record.
    #[must_use]
    pub fn to_order_line(&self) -> OrderLine {
        OrderLine {
            id: self.product.id,
            name: self.product.name.clone(),
            price: self.product.price,
            description: self.product.description.clone(),
            category: self.product.category.clone(),
            image_url: self.product.image_url.clone(),
            quantity: self.quantity,
        }
    }
}
