//! Structured run observability.
//!
//! Every record is keyed by the run id, and candidate-level records also carry
//! the entity key. The runner and dispatcher receive an observer at
//! construction; nothing logs through a global.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use leasekeep_core::RunId;

use crate::candidate::CandidateKey;
use crate::error::{DataAccessError, SendError};
use crate::runner::RunPhase;
use crate::summary::{DispatchOutcome, DispatchResult, RunSummary};

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        now: DateTime<Utc>,
        dry_run: bool,
    },
    PhaseChanged {
        from: RunPhase,
        to: RunPhase,
    },
    Scanned {
        candidates: usize,
        duplicates_dropped: u32,
    },
    AttemptFailed {
        key: CandidateKey,
        attempt: u32,
        error: SendError,
        will_retry: bool,
    },
    Dispatched(Box<DispatchResult>),
    MarkFailed {
        key: CandidateKey,
        error: DataAccessError,
    },
    Finished(Box<RunSummary>),
    Aborted {
        error: DataAccessError,
    },
}

/// Sink for run records.
pub trait RunObserver: Send + Sync + 'static {
    fn record(&self, run_id: RunId, event: RunEvent);
}

/// Default observer: one `tracing` record per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn record(&self, run_id: RunId, event: RunEvent) {
        match event {
            RunEvent::Started { now, dry_run } => {
                info!(run_id = %run_id, now = %now, dry_run, "reminder run started");
            }
            RunEvent::PhaseChanged { from, to } => {
                debug!(run_id = %run_id, from = ?from, to = ?to, "run phase changed");
            }
            RunEvent::Scanned {
                candidates,
                duplicates_dropped,
            } => {
                info!(run_id = %run_id, candidates, duplicates_dropped, "scan complete");
            }
            RunEvent::AttemptFailed {
                key,
                attempt,
                error,
                will_retry,
            } => {
                warn!(
                    run_id = %run_id,
                    entity_type = %key.entity_type,
                    entity_id = %key.entity_id,
                    attempt,
                    error = %error,
                    will_retry,
                    "send attempt failed"
                );
            }
            RunEvent::Dispatched(result) => {
                let c = &result.candidate;
                let reason = result.reason.as_deref().unwrap_or("");
                match result.outcome {
                    DispatchOutcome::Sent => info!(
                        run_id = %run_id,
                        entity_type = %c.entity_type,
                        entity_id = %c.entity_id,
                        attempts = result.attempts,
                        provider_message_id = result.provider_message_id.as_deref().unwrap_or(""),
                        "reminder sent"
                    ),
                    DispatchOutcome::Skipped => info!(
                        run_id = %run_id,
                        entity_type = %c.entity_type,
                        entity_id = %c.entity_id,
                        reason,
                        "reminder skipped"
                    ),
                    DispatchOutcome::Failed => warn!(
                        run_id = %run_id,
                        entity_type = %c.entity_type,
                        entity_id = %c.entity_id,
                        attempts = result.attempts,
                        reason,
                        "reminder failed"
                    ),
                }
            }
            RunEvent::MarkFailed { key, error } => {
                warn!(
                    run_id = %run_id,
                    entity_type = %key.entity_type,
                    entity_id = %key.entity_id,
                    error = %error,
                    "failed to record reminder marker"
                );
            }
            RunEvent::Finished(summary) => {
                info!(
                    run_id = %run_id,
                    total = summary.total,
                    sent = summary.sent,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    auth_expired = summary.auth_expired,
                    "reminder run finished"
                );
                if summary.auth_expired {
                    error!(run_id = %run_id, "messaging provider rejected credentials; rotate the access token");
                }
            }
            RunEvent::Aborted { error } => {
                error!(run_id = %run_id, error = %error, "reminder run aborted");
            }
        }
    }
}

/// In-memory observer for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    inner: Mutex<Vec<(RunId, RunEvent)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(RunId, RunEvent)> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl RunObserver for RecordingObserver {
    fn record(&self, run_id: RunId, event: RunEvent) {
        if let Ok(mut events) = self.inner.lock() {
            events.push((run_id, event));
        }
    }
}
