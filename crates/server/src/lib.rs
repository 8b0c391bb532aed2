//! AI Store server library.
//!
//! The JSON API, checkout transaction and experiment façade live here so the
//! binary, the CLI and the integration tests share one router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request, middleware::from_fn};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router with its full middleware stack.
///
/// In production with a configured frontend directory, unmatched paths are
/// served from it with an `index.html` fallback for client-side routing.
pub fn app(state: AppState) -> Router {
    let config = state.config();
    let cors = middleware::cors_layer(&config.cors_origins);

    let spa = config
        .frontend_dist_dir
        .as_ref()
        .filter(|_| !config.environment.is_development())
        .map(|dir| ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))));

    let mut router = routes::routes();
    if let Some(spa) = spa {
        router = router.fallback_service(spa);
    }

    router
        .layer(from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
