//! # Motriz Channels
//! Notification channel implementations.
//!
//! Each sender implements the `ChannelSender` capability from
//! `motriz-core` and is injected into the dispatcher, never referenced as
//! an ambient global.

pub mod email;
pub mod sms;
pub mod whatsapp;

use std::sync::Arc;

use motriz_core::config::ChannelConfig;
use motriz_core::traits::ChannelSender;

pub use email::EmailSender;
pub use sms::SmsSender;
pub use whatsapp::WhatsAppSender;

/// Build the sender set from config. Called at startup to wire the
/// dispatcher; a channel with no section (or `enabled = false`) is simply
/// unavailable.
pub fn senders_from_config(config: &ChannelConfig) -> Vec<Arc<dyn ChannelSender>> {
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();

    if let Some(email) = &config.email {
        if email.enabled && !email.smtp_host.is_empty() {
            senders.push(Arc::new(EmailSender::new(email.clone())));
        }
    }

    if let Some(wa) = &config.whatsapp {
        if wa.enabled && !wa.access_token.is_empty() {
            senders.push(Arc::new(WhatsAppSender::new(wa.clone())));
        }
    }

    if let Some(sms) = &config.sms {
        if sms.enabled && !sms.account_sid.is_empty() {
            senders.push(Arc::new(SmsSender::new(sms.clone())));
        }
    }

    senders
}
