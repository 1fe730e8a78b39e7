//! Bridge between a transport and the conversation domain.

use std::sync::Arc;

use authorchat_core::channel::{Channel, DeliveryStatus, OutboundMessage};
use authorchat_core::error::ChannelError;
use authorchat_core::message::{ConversationId, Message};
use tracing::info;

use crate::twilio::strip_whatsapp;

/// Turns transport traffic into domain messages and sends replies back
/// through one [`Channel`].
#[derive(Clone)]
pub struct MessagingService {
    channel: Arc<dyn Channel>,
}

impl MessagingService {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Build the `User` message for an inbound text.
    ///
    /// Transport prefixes are dropped from both addresses so a WhatsApp
    /// number and the same plain number share one conversation.
    pub fn incoming(&self, text: &str, sender: &str, recipient: &str) -> Message {
        Message::user(text.trim(), strip_whatsapp(sender.trim()), strip_whatsapp(recipient.trim()))
    }

    /// Deliver `text` to `recipient` as `sender`. Returns the delivery id.
    pub async fn send(
        &self,
        text: &str,
        recipient: &str,
        sender: &str,
        conversation_id: &ConversationId,
    ) -> Result<String, ChannelError> {
        let outbound = OutboundMessage {
            text: text.to_string(),
            recipient: recipient.to_string(),
            sender: sender.to_string(),
            conversation_id: conversation_id.clone(),
        };
        let id = self.channel.send(&outbound).await?;
        info!(
            channel = self.channel.name(),
            message_id = %id,
            conversation_id = %conversation_id,
            "Reply sent"
        );
        Ok(id)
    }

    /// Pass a delivery callback to the channel.
    pub async fn status_update(
        &self,
        message_id: &str,
        raw_status: &str,
    ) -> Result<DeliveryStatus, ChannelError> {
        let status = DeliveryStatus::parse(raw_status);
        self.channel.handle_delivery_status(message_id, &status).await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use authorchat_core::message::MessageKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<OutboundMessage>>,
        statuses: Mutex<Vec<(String, DeliveryStatus)>>,
    }

    #[async_trait]
    impl Channel for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn send(&self, message: &OutboundMessage) -> Result<String, ChannelError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok("SM1".into())
        }

        async fn handle_delivery_status(
            &self,
            id: &str,
            status: &DeliveryStatus,
        ) -> Result<(), ChannelError> {
            self.statuses.lock().unwrap().push((id.into(), status.clone()));
            Ok(())
        }
    }

    #[test]
    fn incoming_strips_transport_prefix() {
        let service = MessagingService::new(Arc::new(Capture::default()));
        let message =
            service.incoming(" What is love? ", "whatsapp:+15550000001", "whatsapp:+14155238886");

        assert_eq!(message.kind, MessageKind::User);
        assert_eq!(message.content, "What is love?");
        assert_eq!(message.sender_id, "+15550000001");
        assert_eq!(message.recipient_id, "+14155238886");
        assert_eq!(
            message.conversation_id,
            ConversationId::between("+14155238886", "+15550000001")
        );
    }

    #[tokio::test]
    async fn send_goes_through_the_channel() {
        let capture = Arc::new(Capture::default());
        let service = MessagingService::new(capture.clone());
        let id = ConversationId::between("+1", "+2");

        let sid = service.send("reply text", "+1", "+2", &id).await.unwrap();
        assert_eq!(sid, "SM1");

        let sent = capture.sent.lock().unwrap();
        assert_eq!(sent[0].text, "reply text");
        assert_eq!(sent[0].recipient, "+1");
        assert_eq!(sent[0].sender, "+2");
        assert_eq!(sent[0].conversation_id, id);
    }

    #[tokio::test]
    async fn status_update_is_parsed() {
        let capture = Arc::new(Capture::default());
        let service = MessagingService::new(capture.clone());

        let status = service.status_update("SM1", "undelivered").await.unwrap();
        assert!(status.is_failure());
        let statuses = capture.statuses.lock().unwrap();
        assert_eq!(statuses[0], ("SM1".to_string(), DeliveryStatus::Undelivered));
    }
}
