//! Product repository.
//!
//! The catalog is owned elsewhere; checkout only reads it. `create` exists
//! for seeding.

use ai_store_core::{Money, ProductId};
use sqlx::SqlitePool;

use super::RepositoryError;
use crate::models::Product;

/// Product row as stored.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub description: Option<String>,
    pub category: Option<String>,
    #[sqlx(rename = "imageUrl")]
    pub image_url: Option<String>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Money::unit_price(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            price,
            description: row.description,
            category: row.category,
            image_url: row.image_url,
        })
    }
}

/// Fields for a new catalog entry.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List products, optionally filtered by a free-text query over name,
    /// description and category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, query: Option<&str>) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = format!("%{}%", escape_like(q));
                sqlx::query_as(
                    r"
                    SELECT id, name, price, description, category, imageUrl
                    FROM products
                    WHERE name LIKE ?1 ESCAPE '\'
                       OR description LIKE ?1 ESCAPE '\'
                       OR category LIKE ?1 ESCAPE '\'
                    ORDER BY id
                    ",
                )
                .bind(pattern)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, name, price, description, category, imageUrl FROM products ORDER BY id",
                )
                .fetch_all(self.pool)
                .await?
            }
        };

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, price, description, category, imageUrl FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` for a negative price and
    /// `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let price = Money::unit_price(product.price)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;

        let id = sqlx::query(
            r"
            INSERT INTO products (name, price, description, category, imageUrl)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&product.name)
        .bind(price.minor())
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.image_url)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        Ok(Product {
            id: ProductId::new(id),
            name: product.name.clone(),
            price,
            description: product.description.clone(),
            category: product.category.clone(),
            image_url: product.image_url.clone(),
        })
    }

    /// Change a product's catalog price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn set_price(&self, id: ProductId, price: i64) -> Result<(), RepositoryError> {
        let price = Money::unit_price(price)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        let result = sqlx::query("UPDATE products SET price = ?1 WHERE id = ?2")
            .bind(price.minor())
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
