//! Error taxonomy of a reminder run.
//!
//! - [`DataAccessError`] aborts the run (scan phase only).
//! - [`SendError`] is recovered per candidate and becomes a `Failed` outcome.
//! - [`RunError`] is what a caller of [`crate::ReminderRunner::run`] can see.

use std::time::Duration;

use thiserror::Error;

use leasekeep_core::DomainError;

/// Query or connection failure in the data layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataAccessError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query '{operation}' failed: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },

    #[error("failed to decode row in '{operation}': {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl DataAccessError {
    pub fn query(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            operation,
            message: message.into(),
        }
    }

    pub fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            message: message.into(),
        }
    }
}

/// Failure reported by (or while talking to) the messaging provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// Provider throttled the request; nothing was sent.
    #[error("rate-limited: {0}")]
    RateLimited(String),

    /// The request definitively did not go through (connection refused, 5xx).
    #[error("transient-network: {0}")]
    TransientNetwork(String),

    /// Provider refused the recipient.
    #[error("invalid-recipient: {0}")]
    InvalidRecipient(String),

    /// Provider credentials are stale; every following send will fail too.
    #[error("auth-expired: {0}")]
    AuthExpired(String),

    /// Definitive rejection for any other reason (bad template, bad params).
    #[error("provider-rejected: {0}")]
    Rejected(String),

    /// No definitive answer; the message may or may not have been delivered.
    #[error("ambiguous-response: {0}")]
    Ambiguous(String),

    /// The per-call timeout elapsed; delivery state is unknown.
    #[error("timeout: no response within {0:?}")]
    Timeout(Duration),
}

impl SendError {
    /// Short, stable reason code used in summaries and logs.
    pub fn code(&self) -> &'static str {
        match self {
            SendError::RateLimited(_) => "rate-limited",
            SendError::TransientNetwork(_) => "transient-network",
            SendError::InvalidRecipient(_) => "invalid-recipient",
            SendError::AuthExpired(_) => "auth-expired",
            SendError::Rejected(_) => "provider-rejected",
            SendError::Ambiguous(_) => "ambiguous-response",
            SendError::Timeout(_) => "timeout",
        }
    }

    /// Whether another attempt is safe and useful.
    ///
    /// Only definitive failures qualify: retrying after an ambiguous response or
    /// a timeout could deliver the same message twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::RateLimited(_) | SendError::TransientNetwork(_))
    }
}

/// Run-level failure surfaced to the trigger (HTTP handler or process).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("scan aborted: {0}")]
    DataAccess(#[from] DataAccessError),

    #[error("run state error: {0}")]
    State(#[from] DomainError),
}
