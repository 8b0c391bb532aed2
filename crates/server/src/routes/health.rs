//! Banner and health checks.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;

/// Plain-text banner at `/`.
pub async fn banner() -> &'static str {
    "AI Store API Server is Running!"
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub database: bool,
    pub failed_tables: Vec<String>,
}

/// Readiness health check endpoint.
///
/// 503 when the database is unreachable or any table failed its migration.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = sqlx::query("SELECT 1")
        .fetch_one(state.pool())
        .await
        .is_ok();
    let failed_tables: Vec<String> = state
        .schema()
        .failed_tables()
        .map(|(table, _)| table.to_owned())
        .collect();

    let status = if database && failed_tables.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Readiness {
            database,
            failed_tables,
        }),
    )
}
