//! Integration tests for checkout atomicity and isolation.
//!
//! Concurrency tests use a file-backed store so that requests really run on
//! separate SQLite connections.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use ai_store_core::Email;
use ai_store_integration_tests::{TestStore, send};
use ai_store_server::db::migrations::{STORE_SCHEMA, TablePlan};
use ai_store_server::db::{self, Migrator, ProductRepository};

async fn add_to_cart(store: &TestStore, user: &Email, product: &str, times: usize) {
    let app = store.app();
    for _ in 0..times {
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(json!({ "email": user.as_str(), "productId": product })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

async fn order_count(store: &TestStore, user: &Email) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_email = ?1")
        .bind(user.as_str())
        .fetch_one(&store.pool)
        .await
        .unwrap()
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_parallel_checkouts_for_one_user_place_one_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = TestStore::open(&dir.path().join("store.db")).await;
    let user = store.user("racer@store.kr").await;
    let tent = store.product("Tent", 1000).await;
    add_to_cart(&store, &user, &tent.to_string(), 3).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let app = store.app();
        let email = user.as_str().to_owned();
        handles.push(tokio::spawn(async move {
            send(&app, Method::POST, "/api/orders", Some(json!({ "email": email }))).await
        }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap().0);
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert!(
        statuses
            .iter()
            .all(|s| *s == StatusCode::OK || *s == StatusCode::BAD_REQUEST)
    );
    assert_eq!(order_count(&store, &user).await, 1);

    let total: i64 = sqlx::query_scalar("SELECT total FROM orders WHERE user_email = ?1")
        .bind(user.as_str())
        .fetch_one(&store.pool)
        .await
        .unwrap();
    assert_eq!(total, 3000);
}

#[tokio::test]
async fn test_checkouts_for_different_users_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let store = TestStore::open(&dir.path().join("store.db")).await;
    let mug = store.product("Mug", 500).await;

    let mut users = Vec::new();
    for (index, quantity) in [1, 2, 3, 4].into_iter().enumerate() {
        let user = store.user(&format!("user{index}@store.kr")).await;
        add_to_cart(&store, &user, &mug.to_string(), quantity).await;
        users.push((user, quantity));
    }

    let mut handles = Vec::new();
    for (user, _) in &users {
        let app = store.app();
        let email = user.as_str().to_owned();
        handles.push(tokio::spawn(async move {
            send(&app, Method::POST, "/api/orders", Some(json!({ "email": email }))).await
        }));
    }
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    for (user, quantity) in &users {
        let (_, orders) = send(
            &store.app(),
            Method::GET,
            &format!("/api/orders?email={user}"),
            None,
        )
        .await;
        let orders = orders.as_array().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["total"], 500 * quantity);
        assert_eq!(orders[0]["items"][0]["quantity"], *quantity);
    }
}

// =============================================================================
// Snapshot
// =============================================================================

#[tokio::test]
async fn test_order_snapshot_ignores_later_price_changes() {
    let store = TestStore::in_memory().await;
    let user = store.user("snap@store.kr").await;
    let lamp = store.product("Lamp", 1200).await;
    add_to_cart(&store, &user, &lamp.to_string(), 2).await;

    let (status, _) = send(
        &store.app(),
        Method::POST,
        "/api/orders",
        Some(json!({ "email": user.as_str() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    ProductRepository::new(&store.pool)
        .set_price(lamp, 9999)
        .await
        .unwrap();

    let (_, orders) = send(
        &store.app(),
        Method::GET,
        &format!("/api/orders?email={user}"),
        None,
    )
    .await;
    assert_eq!(orders[0]["total"], 2400);
    assert_eq!(orders[0]["items"][0]["price"], 1200);
}

// =============================================================================
// Unmigrated tables
// =============================================================================

#[tokio::test]
async fn test_checkout_without_orders_table_is_unavailable() {
    let pool = db::connect_in_memory().await.unwrap();
    let without_orders: &'static [TablePlan] = &STORE_SCHEMA[..3];
    let schema = Migrator::new(without_orders).run(&pool).await;
    let store = TestStore::with_schema(pool, schema);

    let user = store.user("early@store.kr").await;
    let tent = store.product("Tent", 1000).await;
    add_to_cart(&store, &user, &tent.to_string(), 1).await;

    let (status, body) = send(
        &store.app(),
        Method::POST,
        "/api/orders",
        Some(json!({ "email": user.as_str() })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body["error"].as_str().unwrap().contains("sqlite"));

    // The cart is untouched and still served
    let (status, cart) = send(
        &store.app(),
        Method::GET,
        &format!("/api/cart?email={user}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart.as_array().unwrap().len(), 1);
}
