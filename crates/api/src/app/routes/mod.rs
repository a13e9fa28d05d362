use axum::{Router, routing::get};

pub mod cron;
pub mod system;

/// Router for all cron-key protected endpoints.
pub fn router() -> Router {
    Router::new().route("/cron/reminders", get(cron::run_reminders))
}
