//! WhatsApp Cloud API template messages.
//!
//! `POST {api_base}/{phone_number_id}/messages` with a bearer token. One call is
//! one attempt; retries belong to the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use leasekeep_reminders::{MessageSender, PhoneNumber, RenderedTemplate, SendError, SentMessage};

use crate::config::WhatsAppConfig;

/// Provider error codes that mean "throttled".
const RATE_LIMIT_CODES: &[i64] = &[4, 80007, 130429, 131048, 131056];
/// Provider error codes that mean "recipient cannot receive this message".
const RECIPIENT_CODES: &[i64] = &[131026, 131030, 131009];
const AUTH_CODE: i64 = 190;

pub struct WhatsAppSender {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl WhatsAppSender {
    /// `timeout` bounds a whole request; the dispatcher applies its own limit too.
    pub fn new(config: &WhatsAppConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.phone_number_id
            ),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    #[instrument(skip_all, fields(template = %template.template_id))]
    async fn send_message(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> Result<SentMessage, SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&TemplateMessage::new(recipient, template))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            SendError::Ambiguous(format!("status {status}, body unreadable: {e}"))
        })?;
        debug!(status, "provider responded");

        if (200..300).contains(&status) {
            return parse_accepted(&body);
        }
        Err(classify_failure(status, &body))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct TemplateMessage<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    template: TemplateBody<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    name: &'a str,
    language: Language<'a>,
    components: Vec<Component<'a>>,
}

#[derive(Debug, Serialize)]
struct Language<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct Component<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    parameters: Vec<TextParameter<'a>>,
}

#[derive(Debug, Serialize)]
struct TextParameter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TemplateMessage<'a> {
    fn new(recipient: &'a PhoneNumber, template: &'a RenderedTemplate) -> Self {
        let mut components = Vec::new();
        if !template.params.is_empty() {
            components.push(Component {
                kind: "body",
                parameters: template
                    .params
                    .iter()
                    .map(|text| TextParameter { kind: "text", text })
                    .collect(),
            });
        }

        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: recipient.as_str(),
            kind: "template",
            template: TemplateBody {
                name: &template.template_id,
                language: Language {
                    code: &template.language,
                },
                components,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct AcceptedResponse {
    #[serde(default)]
    messages: Vec<AcceptedMessage>,
}

#[derive(Debug, Deserialize)]
struct AcceptedMessage {
    id: String,
    #[serde(default)]
    message_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_accepted(body: &str) -> Result<SentMessage, SendError> {
    let parsed: AcceptedResponse = serde_json::from_str(body)
        .map_err(|e| SendError::Ambiguous(format!("unparseable success body: {e}")))?;

    let message = parsed
        .messages
        .into_iter()
        .next()
        .ok_or_else(|| SendError::Ambiguous("success body without message id".to_string()))?;

    Ok(SentMessage {
        id: message.id,
        status: message.message_status.unwrap_or_else(|| "accepted".to_string()),
    })
}

/// Map a non-2xx response to the send error taxonomy.
fn classify_failure(status: u16, body: &str) -> SendError {
    let provider = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let code = provider.as_ref().and_then(|e| e.code);
    let message = provider
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| truncate(body, 200));
    let detail = match code {
        Some(code) => format!("HTTP {status}, code {code}: {message}"),
        None => format!("HTTP {status}: {message}"),
    };

    let has_code = |codes: &[i64]| code.is_some_and(|c| codes.contains(&c));

    if status == 429 || has_code(RATE_LIMIT_CODES) {
        SendError::RateLimited(detail)
    } else if status == 401 || code == Some(AUTH_CODE) {
        SendError::AuthExpired(detail)
    } else if has_code(RECIPIENT_CODES)
        || (status == 400 && message.to_ascii_lowercase().contains("recipient"))
    {
        SendError::InvalidRecipient(detail)
    } else if status == 502 || status == 504 {
        // A gateway answered; the provider may already have accepted the message.
        SendError::Ambiguous(detail)
    } else if (500..600).contains(&status) {
        SendError::TransientNetwork(detail)
    } else if (400..500).contains(&status) {
        SendError::Rejected(detail)
    } else {
        SendError::Ambiguous(detail)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SendError {
    if e.is_timeout() {
        SendError::Ambiguous(format!("request timed out: {e}"))
    } else if e.is_connect() {
        // Connection never established, so nothing reached the provider.
        SendError::TransientNetwork(format!("connect failed: {e}"))
    } else if e.is_builder() {
        SendError::Rejected(format!("invalid request: {e}"))
    } else {
        SendError::Ambiguous(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
