//! One reminder run: scan, dispatch, aggregate.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use leasekeep_core::{DomainError, RunId};

use crate::candidate::ReminderCandidate;
use crate::data_access::DataAccess;
use crate::dispatcher::{DispatchContext, DispatcherConfig, ReminderDispatcher};
use crate::error::{RunError, SendError};
use crate::observer::{RunEvent, RunObserver};
use crate::scanner::{ReminderScanner, ScannerConfig};
use crate::sender::MessageSender;
use crate::summary::{DispatchOutcome, DispatchResult, RunSummary};

/// Lifecycle of a run.
///
/// `Idle → Scanning → Dispatching → Aggregating → Done`, or
/// `Scanning → Aborted` when the scan fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Scanning,
    Dispatching,
    Aggregating,
    Done,
    Aborted,
}

impl RunPhase {
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::Scanning)
                | (RunPhase::Scanning, RunPhase::Dispatching)
                | (RunPhase::Scanning, RunPhase::Aborted)
                | (RunPhase::Dispatching, RunPhase::Aggregating)
                | (RunPhase::Aggregating, RunPhase::Done)
        )
    }
}

struct RunState<'a> {
    run_id: RunId,
    phase: RunPhase,
    observer: &'a dyn RunObserver,
}

impl<'a> RunState<'a> {
    fn new(run_id: RunId, observer: &'a dyn RunObserver) -> Self {
        Self {
            run_id,
            phase: RunPhase::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), DomainError> {
        if !self.phase.can_transition_to(next) {
            return Err(DomainError::invalid_transition(format!(
                "{:?} -> {:?}",
                self.phase, next
            )));
        }
        self.observer.record(
            self.run_id,
            RunEvent::PhaseChanged {
                from: self.phase,
                to: next,
            },
        );
        self.phase = next;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How far ahead of `now` due dates qualify.
    pub lookahead: Duration,
    /// Dispatch worker pool size.
    pub concurrency: usize,
    pub scanner: ScannerConfig,
    pub dispatcher: DispatcherConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lookahead: Duration::days(30),
            concurrency: 5,
            scanner: ScannerConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

/// Per-invocation options chosen by the trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Validate and render every candidate but send nothing.
    pub dry_run: bool,
}

/// Orchestrates a run. Holds no state between runs.
pub struct ReminderRunner {
    data: Arc<dyn DataAccess>,
    scanner: ReminderScanner,
    dispatcher: Arc<ReminderDispatcher>,
    observer: Arc<dyn RunObserver>,
    lookahead: Duration,
    concurrency: usize,
}

impl ReminderRunner {
    pub fn new(
        data: Arc<dyn DataAccess>,
        sender: Arc<dyn MessageSender>,
        observer: Arc<dyn RunObserver>,
        config: RunnerConfig,
    ) -> Self {
        let scanner = ReminderScanner::new(data.clone(), config.scanner);
        let dispatcher = Arc::new(ReminderDispatcher::new(
            sender,
            observer.clone(),
            config.dispatcher,
        ));

        Self {
            data,
            scanner,
            dispatcher,
            observer,
            lookahead: config.lookahead,
            concurrency: config.concurrency.max(1),
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, RunError> {
        self.run_with(now, RunOptions::default()).await
    }

    /// Execute one run.
    ///
    /// Only a scan failure is returned as an error; individual dispatch failures
    /// are counted in the summary. Dropping the returned future cancels the
    /// in-flight dispatches, so triggers that may disconnect should drive it on
    /// a spawned task.
    pub async fn run_with(
        &self,
        now: DateTime<Utc>,
        options: RunOptions,
    ) -> Result<RunSummary, RunError> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let mut state = RunState::new(run_id, self.observer.as_ref());

        self.observer.record(
            run_id,
            RunEvent::Started {
                now,
                dry_run: options.dry_run,
            },
        );

        state.advance(RunPhase::Scanning)?;
        let candidates = match self.scanner.scan(now, self.lookahead).await {
            Ok(candidates) => candidates,
            Err(error) => {
                state.advance(RunPhase::Aborted)?;
                self.observer.record(
                    run_id,
                    RunEvent::Aborted {
                        error: error.clone(),
                    },
                );
                return Err(error.into());
            }
        };

        let (unique, duplicates_dropped) = dedup(candidates);
        self.observer.record(
            run_id,
            RunEvent::Scanned {
                candidates: unique.len(),
                duplicates_dropped,
            },
        );

        state.advance(RunPhase::Dispatching)?;
        let ctx = DispatchContext {
            run_id,
            dry_run: options.dry_run,
        };
        let results = self.dispatch_all(ctx, now, unique).await;

        state.advance(RunPhase::Aggregating)?;
        let summary = RunSummary::aggregate(
            run_id,
            started_at,
            Utc::now(),
            &results,
            duplicates_dropped,
            options.dry_run,
        );

        state.advance(RunPhase::Done)?;
        self.observer
            .record(run_id, RunEvent::Finished(Box::new(summary.clone())));

        Ok(summary)
    }

    /// Dispatch with at most `concurrency` sends in flight.
    ///
    /// Results come back in candidate order; the caller aggregates them alone.
    /// Markers are stamped with the run's `now`, the same instant the scan
    /// compared against.
    async fn dispatch_all(
        &self,
        ctx: DispatchContext,
        now: DateTime<Utc>,
        candidates: Vec<ReminderCandidate>,
    ) -> Vec<DispatchResult> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<DispatchResult>> = vec![None; candidates.len()];

        for (index, candidate) in candidates.iter().cloned().enumerate() {
            let permits = permits.clone();
            let dispatcher = self.dispatcher.clone();
            let data = self.data.clone();
            let observer = self.observer.clone();

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let result = dispatcher.dispatch_one(ctx, candidate).await;

                if result.outcome == DispatchOutcome::Sent && data.supports_reminder_marker() {
                    let key = result.candidate.key();
                    if let Err(error) = data.mark_reminded(&key, now).await {
                        observer.record(ctx.run_id, RunEvent::MarkFailed { key, error });
                    }
                }

                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, result)) = joined {
                slots[index] = Some(result);
            }
        }

        // A panicked task leaves its slot empty; count it as failed so totals
        // still cover every candidate.
        slots
            .into_iter()
            .zip(candidates)
            .map(|(slot, candidate)| {
                slot.unwrap_or_else(|| {
                    DispatchResult::failed(
                        candidate,
                        &SendError::Ambiguous("dispatch task panicked".to_string()),
                        0,
                    )
                })
            })
            .collect()
    }
}

/// Keep the first candidate per `(entity_type, entity_id)`.
fn dedup(candidates: Vec<ReminderCandidate>) -> (Vec<ReminderCandidate>, u32) {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut dropped = 0;
    let unique = candidates
        .into_iter()
        .filter(|c| {
            let fresh = seen.insert(c.key());
            if !fresh {
                dropped += 1;
            }
            fresh
        })
        .collect();
    (unique, dropped)
}
