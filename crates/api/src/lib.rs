//! HTTP API: cron trigger, routing, and request/response mapping.

pub mod app;
pub mod middleware;
