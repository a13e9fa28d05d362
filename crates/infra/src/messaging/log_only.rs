use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use leasekeep_reminders::{MessageSender, PhoneNumber, RenderedTemplate, SendError, SentMessage};

/// Development sender: writes the rendered message to the log and reports it
/// as accepted. Used when no provider credentials are configured.
#[derive(Debug, Default)]
pub struct LogOnlySender {
    next_id: AtomicU64,
}

impl LogOnlySender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageSender for LogOnlySender {
    async fn send_message(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> Result<SentMessage, SendError> {
        let id = format!("log-only-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let text = template
            .preview()
            .unwrap_or_else(|| template.params.join(" | "));

        info!(
            message_id = %id,
            to = %recipient,
            template = %template.template_id,
            language = %template.language,
            text = %text,
            "message not sent (log-only sender)"
        );

        Ok(SentMessage {
            id,
            status: "logged".to_string(),
        })
    }
}
