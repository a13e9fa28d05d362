use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::app::errors::json_error;

pub const CRON_KEY_HEADER: &str = "x-cron-key";

#[derive(Clone)]
pub struct CronAuthState {
    secret: Arc<[u8]>,
}

impl CronAuthState {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes().into(),
        }
    }

    fn accepts(&self, presented: &[u8]) -> bool {
        // An empty configured secret never matches.
        !self.secret.is_empty() && bool::from(presented.ct_eq(&self.secret))
    }
}

/// Reject requests whose `x-cron-key` does not equal the configured secret.
///
/// Runs before any handler, so a rejected request never reaches the data layer.
pub async fn cron_key_middleware(
    State(state): State<CronAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let presented = extract_cron_key(req.headers()).ok_or_else(unauthorized)?;

    if !state.accepts(presented) {
        tracing::warn!(path = %req.uri().path(), "cron trigger rejected: bad key");
        return Err(unauthorized());
    }

    Ok(next.run(req).await)
}

fn extract_cron_key(headers: &HeaderMap) -> Option<&[u8]> {
    let value = headers.get(CRON_KEY_HEADER)?.as_bytes();
    if value.is_empty() {
        return None;
    }
    Some(value)
}

fn unauthorized() -> Response {
    json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "missing or invalid x-cron-key header",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_exact_secret_is_accepted() {
        let state = CronAuthState::new("s3cret");
        assert!(state.accepts(b"s3cret"));
        assert!(!state.accepts(b"s3cre"));
        assert!(!state.accepts(b"s3cret "));
        assert!(!state.accepts(b"S3CRET"));
    }

    #[test]
    fn empty_secret_rejects_everything() {
        let state = CronAuthState::new("");
        assert!(!state.accepts(b""));
        assert!(!state.accepts(b"anything"));
    }

    #[test]
    fn blank_header_counts_as_missing() {
        let mut headers = HeaderMap::new();
        assert!(extract_cron_key(&headers).is_none());
        headers.insert(CRON_KEY_HEADER, "".parse().unwrap());
        assert!(extract_cron_key(&headers).is_none());
        headers.insert(CRON_KEY_HEADER, "abc".parse().unwrap());
        assert_eq!(extract_cron_key(&headers), Some(&b"abc"[..]));
    }
}
