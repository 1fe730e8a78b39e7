//! Channel trait - the abstraction over messaging transports.
//!
//! A Channel connects the persona to a messaging platform (WhatsApp via
//! Twilio, a terminal, ...). Inbound traffic arrives through the gateway
//! or the CLI; the channel only delivers replies outward and reports on
//! their delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;
use crate::message::ConversationId;

/// A text received from a transport, before it becomes a domain message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,

    /// The user's address
    pub sender: String,

    /// The author persona's address
    pub recipient: String,
}

/// A reply to deliver outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,

    /// The user's address
    pub recipient: String,

    /// The author persona's address
    pub sender: String,

    pub conversation_id: ConversationId,
}

/// Delivery state reported asynchronously by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
    Undelivered,
    Other(String),
}

impl DeliveryStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "accepted" | "sending" => Self::Queued,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed,
            "undelivered" => Self::Undelivered,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Undelivered)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
            Self::Failed => write!(f, "failed"),
            Self::Undelivered => write!(f, "undelivered"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "twilio", "console").
    fn name(&self) -> &str;

    /// Deliver a reply. Returns the transport's id for the sent message.
    async fn send(&self, message: &OutboundMessage) -> std::result::Result<String, ChannelError>;

    /// React to a delivery-status callback. Fire-and-forget: the default
    /// only logs.
    async fn handle_delivery_status(
        &self,
        message_id: &str,
        status: &DeliveryStatus,
    ) -> std::result::Result<(), ChannelError> {
        if status.is_failure() {
            tracing::warn!(channel = self.name(), message_id, %status, "Message delivery failed");
        } else {
            tracing::info!(channel = self.name(), message_id, %status, "Message status updated");
        }
        Ok(())
    }

    /// Health check - is the channel configured and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
