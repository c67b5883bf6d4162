//! SMS channel via the Twilio REST API.

use async_trait::async_trait;

use motriz_core::config::SmsConfig;
use motriz_core::error::{MotrizError, Result};
use motriz_core::traits::ChannelSender;
use motriz_core::types::{ChannelKind, ReminderMessage};

/// Twilio SMS sender.
pub struct SmsSender {
    config: SmsConfig,
    client: reqwest::Client,
}

impl SmsSender {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| MotrizError::Channel(format!("Twilio request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MotrizError::Channel(format!(
                "Twilio API error {status}: {error_text}"
            )));
        }

        tracing::info!("📤 SMS sent to: {to}");
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, recipient: &str, message: &ReminderMessage) -> Result<()> {
        // SMS is plain text and short; the body already carries the
        // essentials.
        self.send_sms(recipient, &message.body).await
    }
}
