//! Capability traits injected into the engine.
//!
//! Channel senders are expressed as one `send` capability per channel and
//! handed to the dispatcher, so the engine stays testable with fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChannelKind, MaintenanceType, Reminder, ReminderMessage, Vehicle};

/// One outbound notification channel (email, WhatsApp, SMS).
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Which channel this sender serves.
    fn channel(&self) -> ChannelKind;

    /// Deliver a rendered message to a recipient address. Failures are
    /// transient from the engine's perspective and will be retried on a
    /// later pass.
    async fn send(&self, recipient: &str, message: &ReminderMessage) -> Result<()>;
}

/// Produces the notification body for a due reminder. The dispatcher
/// treats the output as opaque.
pub trait MessageRenderer: Send + Sync {
    fn render(
        &self,
        reminder: &Reminder,
        vehicle: &Vehicle,
        mtype: &MaintenanceType,
    ) -> ReminderMessage;
}
