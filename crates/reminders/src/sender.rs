//! Messaging provider boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SendError;
use crate::phone::PhoneNumber;
use crate::template::RenderedTemplate;

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub status: String,
}

/// Outbound template message API.
///
/// One call is one send attempt. Implementations must not retry internally;
/// the dispatcher owns retry decisions.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send_message(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> Result<SentMessage, SendError>;
}
