//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: data store, sender and runner wiring
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>, cron_secret: impl Into<String>) -> Router {
    let cron_auth = middleware::CronAuthState::new(cron_secret);

    // Cron routes: require the `x-cron-key` header.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            cron_auth,
            middleware::cron_key_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
