use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use leasekeep_reminders::RunError;

pub fn run_error_to_response(err: RunError) -> axum::response::Response {
    match err {
        RunError::DataAccess(e) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "data_access_error",
            e.to_string(),
        ),
        RunError::State(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
