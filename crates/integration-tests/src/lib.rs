//! Integration test harness for AI Store.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ai-store-integration-tests
//! ```
//!
//! No external services are needed: every test gets its own SQLite store
//! (in memory, or a temp file for restart scenarios), the embedded
//! experiment datafile and a logging event dispatcher. HTTP tests drive the
//! real router with `tower::ServiceExt::oneshot`.
//!
//! # Test Categories
//!
//! - `api` - Route-level behavior and status codes
//! - `checkout` - Checkout atomicity and concurrency
//! - `migrations` - Schema migrator against legacy and restarted stores

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

use ai_store_core::{Email, ProductId};
use ai_store_server::config::{EventProcessorKind, ServerConfig};
use ai_store_server::db::{self, Migrator, ProductRepository, SchemaState, products::NewProduct};
use ai_store_server::services::experiment::{Datafile, EventProcessor, LogDispatcher};
use ai_store_server::services::{AuthService, ExperimentClient, Registration};
use ai_store_server::state::AppState;

/// A migrated store with the application state built on top of it.
pub struct TestStore {
    pub pool: SqlitePool,
    pub state: AppState,
}

impl TestStore {
    /// Fresh in-memory store.
    pub async fn in_memory() -> Self {
        let pool = db::connect_in_memory().await.unwrap();
        Self::with_pool(pool).await
    }

    /// Store backed by a SQLite file, created if missing.
    pub async fn open(path: &Path) -> Self {
        let url = format!("sqlite://{}", path.display());
        let pool = db::create_pool(&url).await.unwrap();
        Self::with_pool(pool).await
    }

    /// Run the migrator on `pool` and build state around it.
    pub async fn with_pool(pool: SqlitePool) -> Self {
        let schema = Migrator::default().run(&pool).await;
        Self::with_schema(pool, schema)
    }

    /// Build state around an already-migrated pool.
    #[must_use]
    pub fn with_schema(pool: SqlitePool, schema: SchemaState) -> Self {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        let state = AppState::new(config, pool.clone(), schema, experiments());
        Self { pool, state }
    }

    /// The full application router.
    #[must_use]
    pub fn app(&self) -> Router {
        ai_store_server::app(self.state.clone())
    }

    pub async fn product(&self, name: &str, price: i64) -> ProductId {
        ProductRepository::new(&self.pool)
            .create(&NewProduct {
                name: name.to_owned(),
                price,
                description: None,
                category: None,
                image_url: None,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn user(&self, email: &str) -> Email {
        AuthService::new(&self.pool)
            .register(&Registration {
                email,
                name: "Tester",
                password: "secret",
                country: None,
            })
            .await
            .unwrap()
            .email
    }
}

/// Experiment client on the embedded datafile that only logs events.
#[must_use]
pub fn experiments() -> ExperimentClient {
    ExperimentClient::new(
        "test1",
        Datafile::embedded().ok(),
        EventProcessor::new(&EventProcessorKind::Forwarding, Arc::new(LogDispatcher)),
        Duration::from_secs(2),
    )
}

/// Send one request through `app` and decode the JSON response.
///
/// Non-JSON bodies come back as a JSON string.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}
