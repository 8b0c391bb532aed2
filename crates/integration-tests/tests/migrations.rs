//! Integration tests for the schema migrator against existing stores.
//!
//! A store file is laid out the way earlier deployments left it (no
//! `users.country`, order snapshots in `orders.items_json`), then opened the
//! way the server opens it on startup.

#![allow(clippy::unwrap_used)]

use std::path::Path;

use axum::http::{Method, StatusCode};
use serde_json::json;
use sqlx::SqlitePool;

use ai_store_integration_tests::{TestStore, send};
use ai_store_server::db;

const LEGACY_SNAPSHOT: &str = r#"[{"id":1,"name":"Tent","price":1000,"description":null,"category":null,"imageUrl":null,"quantity":2}]"#;

async fn create_legacy_store(path: &Path) {
    let pool = db::create_pool(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();

    for statement in [
        "CREATE TABLE products (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
         price INTEGER NOT NULL, description TEXT, category TEXT, imageUrl TEXT)",
        "CREATE TABLE users (email TEXT PRIMARY KEY, name TEXT NOT NULL, password TEXT NOT NULL)",
        "CREATE TABLE cart (user_email TEXT, product_id INTEGER, quantity INTEGER, \
         PRIMARY KEY (user_email, product_id))",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT, user_email TEXT NOT NULL, \
         date TEXT NOT NULL, total INTEGER NOT NULL, status TEXT NOT NULL, items_json TEXT)",
        "INSERT INTO products (name, price) VALUES ('Tent', 1000)",
        "INSERT INTO users (email, name, password) VALUES ('legacy@store.kr', 'Legacy', 'pw1234')",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    sqlx::query(
        "INSERT INTO orders (user_email, date, total, status, items_json) \
         VALUES ('legacy@store.kr', '2024-03-01T09:00:00.000Z', 2000, 'delivered', ?1)",
    )
    .bind(LEGACY_SNAPSHOT)
    .execute(&pool)
    .await
    .unwrap();

    pool.close().await;
}

async fn schema_sql(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_legacy_store_is_upgraded_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    create_legacy_store(&path).await;

    let store = TestStore::open(&path).await;
    assert!(store.state.schema().is_fully_migrated());
    assert!(store.state.schema().has_column("orders", "items_json"));
    assert!(store.state.schema().has_column("users", "country"));
    let app = store.app();

    // Old orders are readable through the new column
    let (status, orders) = send(&app, Method::GET, "/api/orders?email=legacy@store.kr", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders[0]["status"], "delivered");
    assert_eq!(orders[0]["items"][0]["name"], "Tent");
    assert_eq!(orders[0]["items"][0]["quantity"], 2);

    // Legacy users can still log in and get the default country
    let (status, session) = send(
        &app,
        Method::POST,
        "/api/login",
        Some(json!({ "email": "legacy@store.kr", "password": "pw1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{session}");
    assert_eq!(session["country"], "KR");
}

#[tokio::test]
async fn test_new_orders_are_dual_written_while_legacy_column_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    create_legacy_store(&path).await;

    let store = TestStore::open(&path).await;
    let app = store.app();
    send(
        &app,
        Method::POST,
        "/api/cart/add",
        Some(json!({ "email": "legacy@store.kr", "productId": "1" })),
    )
    .await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({ "email": "legacy@store.kr" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (items, items_json): (String, Option<String>) =
        sqlx::query_as("SELECT items, items_json FROM orders WHERE id = ?1")
            .bind(body["orderId"].as_str().unwrap().parse::<i64>().unwrap())
            .fetch_one(&store.pool)
            .await
            .unwrap();
    assert!(items.contains("\"name\":\"Tent\""));
    assert_eq!(items_json.as_deref(), Some(items.as_str()));
}

#[tokio::test]
async fn test_restart_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let first = TestStore::open(&path).await;
    let user = first.user("again@store.kr").await;
    let tent = first.product("Tent", 1000).await;
    send(
        &first.app(),
        Method::POST,
        "/api/cart/add",
        Some(json!({ "email": user.as_str(), "productId": tent.to_string() })),
    )
    .await;
    send(
        &first.app(),
        Method::POST,
        "/api/orders",
        Some(json!({ "email": user.as_str() })),
    )
    .await;
    let sql_before = schema_sql(&first.pool).await;
    first.pool.close().await;

    let second = TestStore::open(&path).await;
    assert!(second.state.schema().is_fully_migrated());
    assert!(!second.state.schema().has_column("orders", "items_json"));
    assert_eq!(schema_sql(&second.pool).await, sql_before);

    let (status, orders) = send(
        &second.app(),
        Method::GET,
        &format!("/api/orders?email={user}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let (status, _) = send(&second.app(), Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}
