//! Email channel — async SMTP sending via lettre.
//!
//! Supports Gmail, Outlook, custom servers. The engine only sends;
//! inbound mail is out of scope.

use async_trait::async_trait;

use motriz_core::config::EmailConfig;
use motriz_core::error::{MotrizError, Result};
use motriz_core::traits::ChannelSender;
use motriz_core::types::{ChannelKind, ReminderMessage};

/// SMTP email sender.
pub struct EmailSender {
    config: EmailConfig,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send an email via SMTP (async).
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from_name = self.config.from_name.as_deref().unwrap_or("Motriz");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.from_email)
            .parse()
            .map_err(|e| MotrizError::Channel(format!("Invalid from: {e}")))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| MotrizError::Channel(format!("Invalid to: {e}")))?;

        let email = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MotrizError::Channel(format!("Build email: {e}")))?;

        let creds = Credentials::new(
            self.config.from_email.clone(),
            self.config.password.clone(),
        );

        let mailer =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| MotrizError::Channel(format!("SMTP relay: {e}")))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| MotrizError::Channel(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipient: &str, message: &ReminderMessage) -> Result<()> {
        self.send_email(recipient, &message.subject, &message.body)
            .await
    }
}
