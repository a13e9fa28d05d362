//! Per-candidate dispatch: template, recipient, send with retry.

use std::sync::Arc;
use std::time::Duration;

use leasekeep_core::RunId;

use crate::candidate::ReminderCandidate;
use crate::error::SendError;
use crate::observer::{RunEvent, RunObserver};
use crate::phone::PhoneNumber;
use crate::retry::RetryPolicy;
use crate::sender::MessageSender;
use crate::summary::DispatchResult;

pub const REASON_INVALID_RECIPIENT: &str = "invalid-recipient";
pub const REASON_DRY_RUN: &str = "dry-run";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
    /// Upper bound on a single provider call.
    pub send_timeout: Duration,
    /// Template language code sent to the provider.
    pub language: String,
    /// Country code applied to national-format numbers (e.g. `"971"`).
    pub default_country_code: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            send_timeout: Duration::from_secs(10),
            language: "en".to_string(),
            default_country_code: None,
        }
    }
}

/// Run-scoped settings for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    pub run_id: RunId,
    pub dry_run: bool,
}

pub struct ReminderDispatcher {
    sender: Arc<dyn MessageSender>,
    observer: Arc<dyn RunObserver>,
    config: DispatcherConfig,
}

impl ReminderDispatcher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        observer: Arc<dyn RunObserver>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            sender,
            observer,
            config,
        }
    }

    /// Resolve, validate and send one reminder.
    ///
    /// Never fails: every provider error is folded into the returned result.
    /// - invalid recipient or missing template parameter: `Skipped`, no send
    /// - rate-limited / transient-network: retried per [`RetryPolicy`]
    /// - anything else: `Failed` right away
    pub async fn dispatch_one(
        &self,
        ctx: DispatchContext,
        candidate: ReminderCandidate,
    ) -> DispatchResult {
        let result = self.dispatch_inner(ctx, candidate).await;
        self.observer
            .record(ctx.run_id, RunEvent::Dispatched(Box::new(result.clone())));
        result
    }

    async fn dispatch_inner(
        &self,
        ctx: DispatchContext,
        candidate: ReminderCandidate,
    ) -> DispatchResult {
        let phone = match PhoneNumber::parse(
            &candidate.recipient_phone,
            self.config.default_country_code.as_deref(),
        ) {
            Ok(phone) => phone,
            Err(_) => return DispatchResult::skipped(candidate, REASON_INVALID_RECIPIENT),
        };

        let rendered = match candidate
            .template_kind
            .render(&candidate.template_params, &self.config.language)
        {
            Ok(rendered) => rendered,
            Err(missing) => {
                return DispatchResult::skipped(
                    candidate,
                    format!("template-param-missing:{}", missing.0),
                );
            }
        };

        if ctx.dry_run {
            return DispatchResult::skipped(candidate, REASON_DRY_RUN);
        }

        let key = candidate.key();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let outcome =
                tokio::time::timeout(self.config.send_timeout, self.sender.send_message(&phone, &rendered))
                    .await
                    .unwrap_or(Err(SendError::Timeout(self.config.send_timeout)));

            let error = match outcome {
                Ok(sent) => return DispatchResult::sent(candidate, sent.id, attempt),
                Err(error) => error,
            };

            let retries_done = attempt - 1;
            let will_retry = error.is_retryable() && self.config.retry.should_retry(retries_done);
            self.observer.record(
                ctx.run_id,
                RunEvent::AttemptFailed {
                    key: key.clone(),
                    attempt,
                    error: error.clone(),
                    will_retry,
                },
            );

            if !will_retry {
                return DispatchResult::failed(candidate, &error, attempt);
            }

            tokio::time::sleep(self.config.retry.delay_for_retry(retries_done + 1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::EntityType;
    use crate::observer::RecordingObserver;
    use crate::sender::SentMessage;
    use crate::summary::DispatchOutcome;
    use crate::template::{RenderedTemplate, TemplateKind};
    use async_trait::async_trait;
    use chrono::Utc;
    use leasekeep_core::EntityId;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a scripted sequence of responses; succeeds once the script runs out.
    #[derive(Default)]
    struct ScriptedSender {
        script: Mutex<VecDeque<Result<SentMessage, SendError>>>,
        calls: AtomicU32,
        hang: bool,
    }

    impl ScriptedSender {
        fn with(script: Vec<Result<SentMessage, SendError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageSender for ScriptedSender {
        async fn send_message(
            &self,
            recipient: &PhoneNumber,
            _template: &RenderedTemplate,
        ) -> Result<SentMessage, SendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(SentMessage {
                    id: format!("wamid.{recipient}.{n}"),
                    status: "accepted".to_string(),
                })
            })
        }
    }

    fn candidate(phone: &str) -> ReminderCandidate {
        ReminderCandidate {
            entity_type: EntityType::Invoice,
            entity_id: EntityId::new("inv-7").unwrap(),
            due_at: Utc::now(),
            recipient_phone: phone.to_string(),
            template_kind: TemplateKind::InvoiceDue,
            template_params: BTreeMap::from([
                ("renter_name".to_string(), "Sara Ali".to_string()),
                ("invoice_number".to_string(), "INV-7".to_string()),
                ("amount".to_string(), "AED 4,000.00".to_string()),
                ("due_date".to_string(), "10 Jun 2025".to_string()),
            ]),
        }
    }

    fn ctx() -> DispatchContext {
        DispatchContext {
            run_id: RunId::new(),
            dry_run: false,
        }
    }

    fn dispatcher(sender: Arc<ScriptedSender>, observer: Arc<RecordingObserver>) -> ReminderDispatcher {
        let config = DispatcherConfig {
            retry: RetryPolicy::fixed(2, Duration::ZERO),
            ..Default::default()
        };
        ReminderDispatcher::new(sender, observer, config)
    }

    #[tokio::test]
    async fn invalid_recipient_is_skipped_without_sending() {
        let sender = Arc::new(ScriptedSender::default());
        let d = dispatcher(sender.clone(), Arc::new(RecordingObserver::new()));

        for phone in ["", "not-a-number", "0501234567", "+12"] {
            let result = d.dispatch_one(ctx(), candidate(phone)).await;
            assert_eq!(result.outcome, DispatchOutcome::Skipped);
            assert_eq!(result.reason.as_deref(), Some(REASON_INVALID_RECIPIENT));
            assert_eq!(result.attempts, 0);
        }
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limited_twice_then_sent() {
        let sender = Arc::new(ScriptedSender::with(vec![
            Err(SendError::RateLimited("429".into())),
            Err(SendError::RateLimited("429".into())),
        ]));
        let observer = Arc::new(RecordingObserver::new());
        let d = dispatcher(sender.clone(), observer.clone());

        let result = d.dispatch_one(ctx(), candidate("+971501234567")).await;

        assert_eq!(result.outcome, DispatchOutcome::Sent);
        assert_eq!(result.attempts, 3);
        assert_eq!(sender.calls(), 3);
        assert!(result.provider_message_id.unwrap().starts_with("wamid.971501234567"));

        let retries = observer
            .events()
            .into_iter()
            .filter(|(_, e)| matches!(e, RunEvent::AttemptFailed { will_retry: true, .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn exhausted_transient_errors_fail_with_last_reason() {
        let sender = Arc::new(ScriptedSender::with(vec![
            Err(SendError::TransientNetwork("connection refused".into())),
            Err(SendError::TransientNetwork("connection refused".into())),
            Err(SendError::TransientNetwork("503 service unavailable".into())),
        ]));
        let d = dispatcher(sender.clone(), Arc::new(RecordingObserver::new()));

        let result = d.dispatch_one(ctx(), candidate("971501234567")).await;

        assert_eq!(result.outcome, DispatchOutcome::Failed);
        assert_eq!(result.attempts, 3);
        assert_eq!(sender.calls(), 3);
        assert_eq!(
            result.reason.as_deref(),
            Some("transient-network: 503 service unavailable")
        );
    }

    #[tokio::test]
    async fn provider_rejections_are_not_retried() {
        for error in [
            SendError::InvalidRecipient("not on whatsapp".into()),
            SendError::AuthExpired("token expired".into()),
            SendError::Ambiguous("truncated body".into()),
            SendError::Rejected("template paused".into()),
        ] {
            let sender = Arc::new(ScriptedSender::with(vec![Err(error.clone())]));
            let d = dispatcher(sender.clone(), Arc::new(RecordingObserver::new()));

            let result = d.dispatch_one(ctx(), candidate("971501234567")).await;

            assert_eq!(result.outcome, DispatchOutcome::Failed, "{error}");
            assert_eq!(sender.calls(), 1, "{error}");
            assert_eq!(result.reason, Some(error.to_string()));
            assert_eq!(result.auth_expired, matches!(error, SendError::AuthExpired(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_without_retry() {
        let sender = Arc::new(ScriptedSender {
            hang: true,
            ..Default::default()
        });
        let config = DispatcherConfig {
            send_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let d = ReminderDispatcher::new(sender.clone(), Arc::new(RecordingObserver::new()), config);

        let result = d.dispatch_one(ctx(), candidate("971501234567")).await;

        assert_eq!(result.outcome, DispatchOutcome::Failed);
        assert_eq!(sender.calls(), 1);
        assert!(result.reason.unwrap().starts_with("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn default_backoff_waits_500ms_then_1500ms() {
        let sender = Arc::new(ScriptedSender::with(vec![
            Err(SendError::RateLimited("429".into())),
            Err(SendError::RateLimited("429".into())),
        ]));
        let d = ReminderDispatcher::new(
            sender.clone(),
            Arc::new(RecordingObserver::new()),
            DispatcherConfig::default(),
        );

        let started = tokio::time::Instant::now();
        let result = d.dispatch_one(ctx(), candidate("971501234567")).await;

        assert_eq!(result.outcome, DispatchOutcome::Sent);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(2000), "waited {waited:?}");
        assert!(waited < Duration::from_millis(2100), "waited {waited:?}");
    }

    #[tokio::test]
    async fn dry_run_validates_but_does_not_send() {
        let sender = Arc::new(ScriptedSender::default());
        let d = dispatcher(sender.clone(), Arc::new(RecordingObserver::new()));
        let ctx = DispatchContext {
            run_id: RunId::new(),
            dry_run: true,
        };

        let result = d.dispatch_one(ctx, candidate("971501234567")).await;
        assert_eq!(result.outcome, DispatchOutcome::Skipped);
        assert_eq!(result.reason.as_deref(), Some(REASON_DRY_RUN));

        let invalid = d.dispatch_one(ctx, candidate("abc")).await;
        assert_eq!(invalid.reason.as_deref(), Some(REASON_INVALID_RECIPIENT));
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn missing_template_param_is_skipped() {
        let sender = Arc::new(ScriptedSender::default());
        let d = dispatcher(sender.clone(), Arc::new(RecordingObserver::new()));
        let mut c = candidate("971501234567");
        c.template_params.remove("invoice_number");

        let result = d.dispatch_one(ctx(), c).await;
        assert_eq!(result.outcome, DispatchOutcome::Skipped);
        assert_eq!(result.reason.as_deref(), Some("template-param-missing:invoice_number"));
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn default_country_code_rescues_national_numbers() {
        let sender = Arc::new(ScriptedSender::default());
        let config = DispatcherConfig {
            default_country_code: Some("971".to_string()),
            ..Default::default()
        };
        let d = ReminderDispatcher::new(sender.clone(), Arc::new(RecordingObserver::new()), config);

        let result = d.dispatch_one(ctx(), candidate("050 123 4567")).await;
        assert_eq!(result.outcome, DispatchOutcome::Sent);
        assert_eq!(sender.calls(), 1);
    }
}
