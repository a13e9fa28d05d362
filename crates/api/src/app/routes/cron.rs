use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use leasekeep_reminders::RunOptions;

use crate::app::errors::{json_error, run_error_to_response};
use crate::app::services::AppServices;

#[derive(Debug, Default, Deserialize)]
pub struct CronQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// `GET /cron/reminders`: run once and return the summary.
///
/// The run is driven on its own task so a client that disconnects mid-run
/// does not cancel in-flight sends; the summary is then just not delivered.
pub async fn run_reminders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<CronQuery>,
) -> Response {
    let runner = services.runner();
    let options = RunOptions {
        dry_run: query.dry_run,
    };

    let run = tokio::spawn(async move { runner.run_with(Utc::now(), options).await });

    match run.await {
        Ok(Ok(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(Err(e)) => run_error_to_response(e),
        Err(join_err) => {
            tracing::error!(error = %join_err, "reminder run task failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "reminder run did not complete",
            )
        }
    }
}
