//! Cart repository.
//!
//! Lines are keyed by (user email, product id). Checkout reads and clears
//! lines through the executor-generic functions so it can run them inside its
//! own transaction.

use ai_store_core::{Email, ProductId};
use sqlx::{Executor, Sqlite, SqlitePool};

use super::RepositoryError;
use super::products::ProductRow;
use crate::models::{CartItem, Product};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    #[sqlx(flatten)]
    product: ProductRow,
    quantity: i64,
}

/// Load a user's cart lines joined with current product data.
///
/// Lines with a non-positive quantity are ignored.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn load_items<'e, E>(executor: E, email: &Email) -> Result<Vec<CartItem>, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<CartRow> = sqlx::query_as(
        r"
        SELECT p.id, p.name, p.price, p.description, p.category, p.imageUrl, c.quantity
        FROM cart c
        JOIN products p ON c.product_id = p.id
        WHERE c.user_email = ?1 AND c.quantity > 0
        ORDER BY p.id
        ",
    )
    .bind(email.as_str())
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(CartItem {
                product: Product::try_from(row.product)?,
                quantity: row.quantity,
            })
        })
        .collect()
}

/// Delete every cart line of a user; returns the number of lines removed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn clear_lines<'e, E>(executor: E, email: &Email) -> Result<u64, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM cart WHERE user_email = ?1")
        .bind(email.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user's cart lines joined with product data.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, email: &Email) -> Result<Vec<CartItem>, RepositoryError> {
        load_items(self.pool, email).await
    }

    /// Add one unit of a product, creating the line if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user or product doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn add(&self, email: &Email, product_id: ProductId) -> Result<(), RepositoryError> {
        let known: Option<(i64, i64)> = sqlx::query_as(
            r"
            SELECT
                (SELECT COUNT(*) FROM users WHERE email = ?1),
                (SELECT COUNT(*) FROM products WHERE id = ?2)
            ",
        )
        .bind(email.as_str())
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;

        if !matches!(known, Some((users, products)) if users > 0 && products > 0) {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r"
            INSERT INTO cart (user_email, product_id, quantity)
            VALUES (?1, ?2, 1)
            ON CONFLICT (user_email, product_id) DO UPDATE SET quantity = quantity + 1
            ",
        )
        .bind(email.as_str())
        .bind(product_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Set a line's quantity; zero or less removes the line.
    ///
    /// Returns `false` if there was no such line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn set_quantity(
        &self,
        email: &Email,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<bool, RepositoryError> {
        if quantity <= 0 {
            return self.remove(email, product_id).await;
        }

        let result =
            sqlx::query("UPDATE cart SET quantity = ?1 WHERE user_email = ?2 AND product_id = ?3")
                .bind(quantity)
                .bind(email.as_str())
                .bind(product_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove one line. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn remove(
        &self,
        email: &Email,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart WHERE user_email = ?1 AND product_id = ?2")
            .bind(email.as_str())
            .bind(product_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove all of a user's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, email: &Email) -> Result<u64, RepositoryError> {
        clear_lines(self.pool, email).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ai_store_core::CountryCode;

    use super::*;
    use crate::db::products::NewProduct;
    use crate::db::{Migrator, ProductRepository, UserRepository, connect_in_memory};

    async fn setup() -> (SqlitePool, Email, ProductId) {
        let pool = connect_in_memory().await.unwrap();
        Migrator::default().run(&pool).await;
        let email = Email::parse("cart@store.kr").unwrap();
        UserRepository::new(&pool)
            .create(&email, "Cart", "hash", &CountryCode::default())
            .await
            .unwrap();
        let product = ProductRepository::new(&pool)
            .create(&NewProduct {
                name: "Mug".to_owned(),
                price: 500,
                description: None,
                category: None,
                image_url: None,
            })
            .await
            .unwrap();
        (pool, email, product.id)
    }

    #[tokio::test]
    async fn test_add_increments_existing_line() {
        let (pool, email, product) = setup().await;
        let repo = CartRepository::new(&pool);

        repo.add(&email, product).await.unwrap();
        repo.add(&email, product).await.unwrap();

        let items = repo.items(&email).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_add_unknown_product_or_user() {
        let (pool, email, _) = setup().await;
        let repo = CartRepository::new(&pool);

        assert!(matches!(
            repo.add(&email, ProductId::new(999)).await,
            Err(RepositoryError::NotFound)
        ));
        let stranger = Email::parse("nobody@store.kr").unwrap();
        assert!(matches!(
            repo.add(&stranger, ProductId::new(1)).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_non_positive_quantity_removes_line() {
        let (pool, email, product) = setup().await;
        let repo = CartRepository::new(&pool);
        repo.add(&email, product).await.unwrap();

        assert!(repo.set_quantity(&email, product, 5).await.unwrap());
        assert_eq!(repo.items(&email).await.unwrap()[0].quantity, 5);

        assert!(repo.set_quantity(&email, product, 0).await.unwrap());
        assert!(repo.items(&email).await.unwrap().is_empty());
        assert!(!repo.remove(&email, product).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear() {
        let (pool, email, product) = setup().await;
        let repo = CartRepository::new(&pool);
        repo.add(&email, product).await.unwrap();

        assert_eq!(repo.clear(&email).await.unwrap(), 1);
        assert_eq!(repo.clear(&email).await.unwrap(), 0);
    }
}
