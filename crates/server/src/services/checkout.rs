//! Cart to order conversion.
//!
//! A checkout reads the user's cart joined with current prices, freezes it
//! into an order snapshot and writes the order in one `BEGIN IMMEDIATE`
//! transaction, holding the user's lock throughout. Conversion tracking and
//! cart clearing happen after commit and cannot undo the order.

use ai_store_core::{CountryCode, Email, Money, MoneyError, OrderId, OrderLine, OrderStatus};
use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::experiment::ExperimentClient;
use super::locks::UserLocks;
use crate::db::{RepositoryError, SchemaState, UserRepository, cart, orders};
use crate::models::{CartItem, NewOrder};

/// Tables a checkout reads or writes.
const CHECKOUT_TABLES: [&str; 3] = ["products", "cart", "orders"];

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user's cart has no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// Reading the cart or writing the order failed; nothing was written.
    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(RepositoryError::Database(e))
    }
}

impl From<MoneyError> for CheckoutError {
    fn from(e: MoneyError) -> Self {
        Self::Storage(RepositoryError::DataCorruption(format!("order total: {e}")))
    }
}

impl From<serde_json::Error> for CheckoutError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(RepositoryError::DataCorruption(format!("order snapshot: {e}")))
    }
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a SqlitePool,
    schema: &'a SchemaState,
    locks: &'a UserLocks,
    experiments: &'a ExperimentClient,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a SqlitePool,
        schema: &'a SchemaState,
        locks: &'a UserLocks,
        experiments: &'a ExperimentClient,
    ) -> Self {
        Self {
            pool,
            schema,
            locks,
            experiments,
        }
    }

    /// Turn `user`'s cart into an order and return its id.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if the cart has no lines and
    /// `CheckoutError::Storage` if the cart or order tables cannot be used.
    /// Neither leaves an order behind or changes the cart.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn checkout(&self, user: &Email) -> Result<OrderId, CheckoutError> {
        let _guard = self.locks.lock(user).await;

        for table in CHECKOUT_TABLES {
            self.schema.ensure_ready(table)?;
        }
        let legacy_items_json = self.schema.has_column("orders", "items_json");

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let items = cart::load_items(&mut *tx, user).await?;
        if items.is_empty() {
            tx.rollback().await?;
            return Err(CheckoutError::EmptyCart);
        }

        let lines: Vec<OrderLine> = items.iter().map(CartItem::to_order_line).collect();
        let total = Money::try_sum(lines.iter().map(OrderLine::line_total))?;
        let order = NewOrder {
            user_email: user.clone(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            total,
            status: OrderStatus::Processing,
            items: OrderLine::encode_snapshot(&lines)?,
        };

        let order_id = orders::insert_order(&mut *tx, &order, legacy_items_json).await?;
        tx.commit().await?;

        info!(order_id = %order_id, total = %total, lines = lines.len(), "Order created");

        self.spawn_conversion_tracking(user);

        match cart::clear_lines(self.pool, user).await {
            Ok(removed) => debug!(removed, "Cart cleared"),
            Err(e) => warn!(
                order_id = %order_id,
                error = %e,
                "Order created but cart could not be cleared"
            ),
        }

        Ok(order_id)
    }

    /// Report the conversion without holding up the response.
    fn spawn_conversion_tracking(&self, user: &Email) {
        let pool = self.pool.clone();
        let experiments = self.experiments.clone();
        let user = user.clone();

        tokio::spawn(async move {
            let country = match UserRepository::new(&pool).get_by_email(&user).await {
                Ok(Some(found)) => found.country,
                Ok(None) => CountryCode::default(),
                Err(e) => {
                    warn!(error = %e, "Country lookup failed; tracking with default country");
                    CountryCode::default()
                }
            };
            let tracked = experiments.track_conversion(&user, &country).await;
            debug!(user = %user, tracked, "Conversion tracking finished");
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ai_store_core::ProductId;

    use super::*;
    use crate::config::EventProcessorKind;
    use crate::db::products::NewProduct;
    use crate::db::orders::SortOrder;
    use crate::db::{
        CartRepository, Migrator, OrderRepository, ProductRepository, connect_in_memory,
    };
    use crate::services::experiment::{EventProcessor, LogDispatcher};

    struct Fixture {
        pool: SqlitePool,
        schema: SchemaState,
        locks: UserLocks,
        experiments: ExperimentClient,
        user: Email,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = connect_in_memory().await.unwrap();
            let schema = Migrator::default().run(&pool).await;
            let user = Email::parse("buyer@store.kr").unwrap();
            UserRepository::new(&pool)
                .create(&user, "Buyer", "hash", &CountryCode::default())
                .await
                .unwrap();
            let experiments = ExperimentClient::new(
                "test1",
                None,
                EventProcessor::new(&EventProcessorKind::Forwarding, Arc::new(LogDispatcher)),
                Duration::from_millis(100),
            );
            Self {
                pool,
                schema,
                locks: UserLocks::new(),
                experiments,
                user,
            }
        }

        fn service(&self) -> CheckoutService<'_> {
            CheckoutService::new(&self.pool, &self.schema, &self.locks, &self.experiments)
        }

        async fn product(&self, price: i64) -> ProductId {
            ProductRepository::new(&self.pool)
                .create(&NewProduct {
                    name: format!("item {price}"),
                    price,
                    description: None,
                    category: None,
                    image_url: None,
                })
                .await
                .unwrap()
                .id
        }

        async fn put(&self, product: ProductId, quantity: i64) {
            let cart = CartRepository::new(&self.pool);
            cart.add(&self.user, product).await.unwrap();
            cart.set_quantity(&self.user, product, quantity).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_checkout_totals_and_clears_cart() {
        let fx = Fixture::new().await;
        let tent = fx.product(1000).await;
        let mug = fx.product(500).await;
        fx.put(tent, 2).await;
        fx.put(mug, 1).await;

        let order_id = fx.service().checkout(&fx.user).await.unwrap();

        let order = OrderRepository::new(&fx.pool)
            .get(order_id, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.total, Money::from_minor(2500));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(CartRepository::new(&fx.pool).items(&fx.user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_creates_nothing() {
        let fx = Fixture::new().await;

        assert!(matches!(
            fx.service().checkout(&fx.user).await,
            Err(CheckoutError::EmptyCart)
        ));
        let orders = OrderRepository::new(&fx.pool)
            .list_for_user(&fx.user, SortOrder::Desc, false)
            .await
            .unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_price_change_does_not_touch_order() {
        let fx = Fixture::new().await;
        let tent = fx.product(1000).await;
        fx.put(tent, 1).await;

        let order_id = fx.service().checkout(&fx.user).await.unwrap();
        ProductRepository::new(&fx.pool).set_price(tent, 9999).await.unwrap();

        let order = OrderRepository::new(&fx.pool)
            .get(order_id, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.total, Money::from_minor(1000));
        assert_eq!(order.items[0].price, Money::from_minor(1000));
    }

    #[tokio::test]
    async fn test_unmigrated_table_is_a_storage_failure() {
        let fx = Fixture::new().await;
        let tent = fx.product(1000).await;
        fx.put(tent, 1).await;

        let broken = SchemaState::default();
        let service = CheckoutService::new(&fx.pool, &broken, &fx.locks, &fx.experiments);
        assert!(matches!(
            service.checkout(&fx.user).await,
            Err(CheckoutError::Storage(RepositoryError::SchemaNotReady(_)))
        ));
        assert_eq!(CartRepository::new(&fx.pool).items(&fx.user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cart_clear_failure_keeps_order() {
        let fx = Fixture::new().await;
        let tent = fx.product(1000).await;
        fx.put(tent, 1).await;
        sqlx::query(
            "CREATE TRIGGER keep_cart BEFORE DELETE ON cart \
             BEGIN SELECT RAISE(ABORT, 'cart is locked'); END",
        )
        .execute(&fx.pool)
        .await
        .unwrap();

        let order_id = fx.service().checkout(&fx.user).await.unwrap();

        let order = OrderRepository::new(&fx.pool)
            .get(order_id, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.total, Money::from_minor(1000));
        assert_eq!(CartRepository::new(&fx.pool).items(&fx.user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_order_insert_failure_leaves_cart() {
        let fx = Fixture::new().await;
        let tent = fx.product(1000).await;
        fx.put(tent, 2).await;
        sqlx::query(
            "CREATE TRIGGER reject_orders BEFORE INSERT ON orders \
             BEGIN SELECT RAISE(ABORT, 'orders are read-only'); END",
        )
        .execute(&fx.pool)
        .await
        .unwrap();

        assert!(matches!(
            fx.service().checkout(&fx.user).await,
            Err(CheckoutError::Storage(RepositoryError::Database(_)))
        ));

        let items = CartRepository::new(&fx.pool).items(&fx.user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        let orders = OrderRepository::new(&fx.pool)
            .list_for_user(&fx.user, SortOrder::Desc, false)
            .await
            .unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_for_one_user() {
        let fx = Fixture::new().await;
        let tent = fx.product(1000).await;
        fx.put(tent, 1).await;

        let service = fx.service();
        let (a, b) = tokio::join!(service.checkout(&fx.user), service.checkout(&fx.user));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(CheckoutError::EmptyCart)))
                .count(),
            1
        );
    }
}
