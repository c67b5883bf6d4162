//! WhatsApp Business Cloud API channel.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for messaging.
//! Requires: Access Token + Phone Number ID from Meta Business Suite.

use async_trait::async_trait;

use motriz_core::config::WhatsAppConfig;
use motriz_core::error::{MotrizError, Result};
use motriz_core::traits::ChannelSender;
use motriz_core::types::{ChannelKind, ReminderMessage};

/// WhatsApp Business sender.
pub struct WhatsAppSender {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppSender {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Send a text message via WhatsApp Cloud API.
    async fn send_text_message(&self, to: &str, text: &str) -> Result<String> {
        let url = format!(
            "https://graph.facebook.com/v21.0/{}/messages",
            self.config.phone_number_id
        );

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| MotrizError::Channel(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MotrizError::Channel(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MotrizError::Channel(format!("Invalid WhatsApp response: {e}")))?;

        let msg_id = result["messages"][0]["id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!("WhatsApp message sent: {} → {}", msg_id, to);
        Ok(msg_id)
    }
}

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::WhatsApp
    }

    async fn send(&self, recipient: &str, message: &ReminderMessage) -> Result<()> {
        // WhatsApp has no subject line; fold it into the text body.
        let text = format!("*{}*\n\n{}", message.subject, message.body);
        self.send_text_message(recipient, &text).await?;
        Ok(())
    }
}
