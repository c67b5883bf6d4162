//! Domain types — vehicles, maintenance types, reminders, delivery log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered vehicle. The stored odometer reading only ever moves
/// forward; maintenance record insertion may bump it as a side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub user_id: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub current_km: i64,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    /// Short human description used in notification messages.
    pub fn describe(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.year)
    }
}

/// Maintenance type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceCategory {
    Oil,
    Filter,
    Tire,
    Brake,
    Fluid,
    Inspection,
    Other,
}

impl MaintenanceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oil => "oil",
            Self::Filter => "filter",
            Self::Tire => "tire",
            Self::Brake => "brake",
            Self::Fluid => "fluid",
            Self::Inspection => "inspection",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "oil" => Self::Oil,
            "filter" => Self::Filter,
            "tire" => Self::Tire,
            "brake" => Self::Brake,
            "fluid" => Self::Fluid,
            "inspection" => Self::Inspection,
            _ => Self::Other,
        }
    }
}

/// A kind of maintenance with its recommended intervals. A type with
/// neither interval never generates reminders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceType {
    pub id: String,
    pub name: String,
    pub interval_km: Option<i64>,
    pub interval_days: Option<i64>,
    pub category: MaintenanceCategory,
}

/// An immutable maintenance fact. Created only by explicit user action,
/// never mutated or deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: String,
    pub vehicle_id: String,
    pub maintenance_type_id: String,
    pub km_at_maintenance: i64,
    pub date_performed: NaiveDate,
    pub cost: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reminder lifecycle state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Completed,
    Snoozed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Completed => "completed",
            Self::Snoozed => "snoozed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "completed" => Some(Self::Completed),
            "snoozed" => Some(Self::Snoozed),
            _ => None,
        }
    }

    /// Still counts toward the one-active-reminder-per-key invariant.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Eligible for due evaluation by the scanner.
    pub fn is_due_candidate(&self) -> bool {
        matches!(self, Self::Pending | Self::Snoozed)
    }

    /// Legal transitions. `Completed` never transitions out; a first
    /// successful send moves `Pending`/`Snoozed` forward; a snooze defers
    /// any open reminder.
    pub fn can_transition(&self, next: ReminderStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Sent | Self::Completed | Self::Snoozed) => true,
            (Self::Snoozed, Self::Sent | Self::Completed) => true,
            (Self::Sent, Self::Completed | Self::Snoozed) => true,
            _ => false,
        }
    }
}

/// The mutable unit of due-tracking, keyed by (vehicle, maintenance type).
/// At most one active (non-completed) reminder exists per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub vehicle_id: String,
    pub maintenance_type_id: String,
    pub next_due_km: Option<i64>,
    pub next_due_date: Option<NaiveDate>,
    pub status: ReminderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// The thresholds computed by the interval policy from a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueThresholds {
    pub next_due_km: Option<i64>,
    pub next_due_date: Option<NaiveDate>,
}

/// Notification channel kinds the engine can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    WhatsApp,
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
            Self::Sms => "sms",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "whatsapp" => Some(Self::WhatsApp),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user channel preference. `Both` fans out to email and WhatsApp as
/// independent, order-insensitive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyPreference {
    Email,
    WhatsApp,
    Sms,
    Both,
}

impl NotifyPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
            Self::Sms => "sms",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "whatsapp" => Some(Self::WhatsApp),
            "sms" => Some(Self::Sms),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// The channel set this preference resolves to.
    pub fn channels(&self) -> Vec<ChannelKind> {
        match self {
            Self::Email => vec![ChannelKind::Email],
            Self::WhatsApp => vec![ChannelKind::WhatsApp],
            Self::Sms => vec![ChannelKind::Sms],
            Self::Both => vec![ChannelKind::Email, ChannelKind::WhatsApp],
        }
    }
}

/// The recipient slice of a user account: who to notify and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notification_preference: NotifyPreference,
}

impl User {
    /// Resolve the recipient address for a channel, if the user has one.
    pub fn recipient_for(&self, channel: ChannelKind) -> Option<&str> {
        match channel {
            ChannelKind::Email => self.email.as_deref(),
            ChannelKind::WhatsApp | ChannelKind::Sms => self.phone.as_deref(),
        }
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Pending,
    Sent,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only record of a send attempt, keyed by (reminder, channel,
/// attempt). The dispatcher consults these rows for idempotency; the
/// reminder row only carries aggregate status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: i64,
    pub reminder_id: String,
    pub channel: ChannelKind,
    pub attempt: u32,
    pub outcome: DeliveryOutcome,
    pub claimed_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A fully rendered notification. The dispatcher treats it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub subject: String,
    pub body: String,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
