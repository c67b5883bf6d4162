//! Dispatcher — fans a due reminder out across the user's channels with
//! at-most-once delivery per (reminder, channel).
//!
//! Idempotency lives in the delivery log, not here: the claim insert
//! races on a unique index, so overlapping passes (or replicas) can never
//! both send the same pair. The preferred failure mode is send nothing
//! over send twice.

use std::collections::HashMap;
use std::sync::Arc;

use motriz_core::error::Result;
use motriz_core::traits::ChannelSender;
use motriz_core::types::{ChannelKind, Reminder, ReminderMessage, User};
use motriz_store::SqliteStore;

/// Per-channel result of one dispatch call.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    pub channel: ChannelKind,
    pub outcome: DispatchOutcome,
}

/// What happened on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent and logged; the reminder was moved to `sent` if still open.
    Sent,
    /// A `sent` log entry already exists — idempotent no-op.
    AlreadySent,
    /// Another pass holds an unresolved claim for the pair.
    InFlight,
    /// Send failed; logged as a failed attempt, retried next pass.
    Failed { attempt: u32, reason: String },
    /// Retry budget burned through with no success; surfaced, not retried.
    Exhausted { failures: u32 },
    /// The user has no address for this channel.
    NoRecipient,
    /// No sender configured for this channel.
    Unavailable,
}

/// Fans reminders out to channel senders, consulting the delivery log.
pub struct Dispatcher {
    store: Arc<SqliteStore>,
    senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SqliteStore>,
        senders: Vec<Arc<dyn ChannelSender>>,
        max_attempts: u32,
    ) -> Self {
        let senders = senders.into_iter().map(|s| (s.channel(), s)).collect();
        Self {
            store,
            senders,
            max_attempts,
        }
    }

    /// Dispatch one due reminder across the user's preferred channels.
    /// Channels are independent: a failure on one never blocks another.
    pub async fn dispatch(
        &self,
        reminder: &Reminder,
        user: &User,
        message: &ReminderMessage,
    ) -> Result<Vec<ChannelDelivery>> {
        let mut deliveries = Vec::new();
        for channel in user.notification_preference.channels() {
            let outcome = self
                .dispatch_channel(reminder, user, channel, message)
                .await?;
            deliveries.push(ChannelDelivery { channel, outcome });
        }
        Ok(deliveries)
    }

    async fn dispatch_channel(
        &self,
        reminder: &Reminder,
        user: &User,
        channel: ChannelKind,
        message: &ReminderMessage,
    ) -> Result<DispatchOutcome> {
        let Some(sender) = self.senders.get(&channel) else {
            return Ok(DispatchOutcome::Unavailable);
        };
        let Some(recipient) = user.recipient_for(channel) else {
            tracing::debug!(
                "No {} recipient for user {}, reminder {}",
                channel,
                user.id,
                reminder.id
            );
            return Ok(DispatchOutcome::NoRecipient);
        };

        // Cheap pre-checks; the claim below is what actually excludes.
        if self.store.has_sent_entry(&reminder.id, channel)? {
            return Ok(DispatchOutcome::AlreadySent);
        }
        let failures = self.store.failed_attempts(&reminder.id, channel)?;
        if failures >= self.max_attempts {
            return Ok(DispatchOutcome::Exhausted { failures });
        }

        let Some(claim) = self.store.claim_delivery(&reminder.id, channel)? else {
            // Lost the race: either sent meanwhile or claimed in-flight.
            return Ok(if self.store.has_sent_entry(&reminder.id, channel)? {
                DispatchOutcome::AlreadySent
            } else {
                DispatchOutcome::InFlight
            });
        };

        match sender.send(recipient, message).await {
            Ok(()) => {
                self.store.resolve_delivery_sent(claim.id)?;
                // First successful channel wins the status transition;
                // later successes find the row already sent.
                self.store.mark_reminder_sent(&reminder.id)?;
                tracing::info!(
                    "✅ Reminder {} delivered via {} (attempt {})",
                    reminder.id,
                    channel,
                    claim.attempt
                );
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => {
                self.store.resolve_delivery_failed(claim.id)?;
                tracing::warn!(
                    "⚠️ Reminder {} via {} failed on attempt {}: {e}",
                    reminder.id,
                    channel,
                    claim.attempt
                );
                Ok(DispatchOutcome::Failed {
                    attempt: claim.attempt,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use motriz_core::error::MotrizError;
    use motriz_core::types::{DueThresholds, NotifyPreference, ReminderStatus, Vehicle};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSender {
        kind: ChannelKind,
        sent: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeSender {
        fn new(kind: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                sent: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelSender for FakeSender {
        fn channel(&self) -> ChannelKind {
            self.kind
        }

        async fn send(&self, _recipient: &str, _message: &ReminderMessage) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(MotrizError::Channel("provider unavailable".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup(preference: NotifyPreference) -> (Arc<SqliteStore>, Reminder, User) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let user = User {
            id: "u1".into(),
            name: "Ana".into(),
            email: Some("ana@example.com".into()),
            phone: Some("+5511999990000".into()),
            notification_preference: preference,
        };
        store.upsert_user(&user).unwrap();
        store
            .insert_vehicle(&Vehicle {
                id: "v1".into(),
                user_id: "u1".into(),
                brand: "Fiat".into(),
                model: "Argo".into(),
                year: 2021,
                current_km: 19_500,
                created_at: Utc::now(),
            })
            .unwrap();
        let reminder = store
            .upsert_reminder(
                "v1",
                "t1",
                DueThresholds {
                    next_due_km: Some(19_000),
                    next_due_date: None,
                },
                ReminderStatus::Pending,
            )
            .unwrap();
        (store, reminder, user)
    }

    fn message() -> ReminderMessage {
        ReminderMessage {
            subject: "Oil change due".into(),
            body: "Your Fiat Argo (2021) is due for an oil change.".into(),
        }
    }

    #[tokio::test]
    async fn double_dispatch_sends_once_per_channel() {
        let (store, reminder, user) = setup(NotifyPreference::Both);
        let email = FakeSender::new(ChannelKind::Email);
        let wa = FakeSender::new(ChannelKind::WhatsApp);
        let dispatcher = Dispatcher::new(store.clone(), vec![email.clone(), wa.clone()], 3);

        let first = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        assert!(first.iter().all(|d| d.outcome == DispatchOutcome::Sent));

        let second = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        assert!(second.iter().all(|d| d.outcome == DispatchOutcome::AlreadySent));

        assert_eq!(email.sent_count(), 1);
        assert_eq!(wa.sent_count(), 1);
        let row = store.get_reminder(&reminder.id).unwrap().unwrap();
        assert_eq!(row.status, ReminderStatus::Sent);
        assert!(row.sent_at.is_some());
    }

    #[tokio::test]
    async fn failure_is_isolated_and_retried() {
        let (store, reminder, user) = setup(NotifyPreference::Both);
        let email = FakeSender::new(ChannelKind::Email);
        let wa = FakeSender::new(ChannelKind::WhatsApp);
        wa.fail.store(true, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(store.clone(), vec![email.clone(), wa.clone()], 3);

        let first = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        let by_channel: HashMap<_, _> =
            first.into_iter().map(|d| (d.channel, d.outcome)).collect();
        assert_eq!(by_channel[&ChannelKind::Email], DispatchOutcome::Sent);
        assert!(matches!(
            by_channel[&ChannelKind::WhatsApp],
            DispatchOutcome::Failed { attempt: 1, .. }
        ));

        // Provider recovers; only the failed channel is retried.
        wa.fail.store(false, Ordering::SeqCst);
        let second = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        let by_channel: HashMap<_, _> =
            second.into_iter().map(|d| (d.channel, d.outcome)).collect();
        assert_eq!(by_channel[&ChannelKind::Email], DispatchOutcome::AlreadySent);
        assert_eq!(by_channel[&ChannelKind::WhatsApp], DispatchOutcome::Sent);
        assert_eq!(email.sent_count(), 1);
        assert_eq!(wa.sent_count(), 1);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_is_surfaced_not_retried() {
        let (store, reminder, user) = setup(NotifyPreference::Email);
        let email = FakeSender::new(ChannelKind::Email);
        email.fail.store(true, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(store.clone(), vec![email.clone()], 3);

        for attempt in 1..=3u32 {
            let out = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
            assert!(matches!(
                &out[0].outcome,
                DispatchOutcome::Failed { attempt: a, .. } if *a == attempt
            ));
        }

        // Budget burned; sender no longer invoked even if it recovered.
        email.fail.store(false, Ordering::SeqCst);
        let out = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        assert_eq!(out[0].outcome, DispatchOutcome::Exhausted { failures: 3 });
        assert_eq!(email.sent_count(), 0);
        assert_eq!(store.exhausted_channels(3).unwrap().len(), 1);

        // Reminder stays open for manual or alternate-channel follow-up.
        let row = store.get_reminder(&reminder.id).unwrap().unwrap();
        assert_eq!(row.status, ReminderStatus::Pending);
    }

    #[tokio::test]
    async fn missing_recipient_and_sender_are_no_ops() {
        let (store, reminder, mut user) = setup(NotifyPreference::Both);
        user.phone = None;
        let email = FakeSender::new(ChannelKind::Email);
        // No WhatsApp sender configured at all.
        let dispatcher = Dispatcher::new(store.clone(), vec![email.clone()], 3);

        let out = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        let by_channel: HashMap<_, _> = out.into_iter().map(|d| (d.channel, d.outcome)).collect();
        assert_eq!(by_channel[&ChannelKind::Email], DispatchOutcome::Sent);
        assert_eq!(by_channel[&ChannelKind::WhatsApp], DispatchOutcome::Unavailable);

        // With a sender but no phone, the outcome is NoRecipient and no
        // claim is burned.
        let wa = FakeSender::new(ChannelKind::WhatsApp);
        let dispatcher = Dispatcher::new(store.clone(), vec![email, wa.clone()], 3);
        let out = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        let by_channel: HashMap<_, _> = out.into_iter().map(|d| (d.channel, d.outcome)).collect();
        assert_eq!(by_channel[&ChannelKind::WhatsApp], DispatchOutcome::NoRecipient);
        assert_eq!(wa.sent_count(), 0);
        assert_eq!(store.failed_attempts(&reminder.id, ChannelKind::WhatsApp).unwrap(), 0);
    }

    #[tokio::test]
    async fn sms_preference_routes_to_phone() {
        let (store, reminder, user) = setup(NotifyPreference::Sms);
        let sms = FakeSender::new(ChannelKind::Sms);
        let dispatcher = Dispatcher::new(store.clone(), vec![sms.clone()], 3);

        let out = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, ChannelKind::Sms);
        assert_eq!(out[0].outcome, DispatchOutcome::Sent);
        assert_eq!(sms.sent_count(), 1);
    }

    #[tokio::test]
    async fn in_flight_claim_blocks_overlapping_dispatch() {
        let (store, reminder, user) = setup(NotifyPreference::Email);
        // Simulate another pass holding the claim.
        store
            .claim_delivery(&reminder.id, ChannelKind::Email)
            .unwrap()
            .unwrap();

        let email = FakeSender::new(ChannelKind::Email);
        let dispatcher = Dispatcher::new(store.clone(), vec![email.clone()], 3);
        let out = dispatcher.dispatch(&reminder, &user, &message()).await.unwrap();
        assert_eq!(out[0].outcome, DispatchOutcome::InFlight);
        assert_eq!(email.sent_count(), 0);
    }
}
