//! Shared tracing setup for the server and the one-shot runner.

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env(), tracing::LogTarget::Stdout);
}

/// Like [`init`] but keeps stdout free for program output.
pub fn init_stderr() {
    tracing::init(tracing::LogFormat::from_env(), tracing::LogTarget::Stderr);
}

/// Tracing configuration (filters, formats, writers).
pub mod tracing;

pub use self::tracing::{LogFormat, LogTarget};
