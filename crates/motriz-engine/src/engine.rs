//! Reminder engine — ties policy, scanner, and dispatcher into the
//! periodic scan-then-dispatch pass, and hosts the completion and snooze
//! operations driven by user actions.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::StreamExt;

use motriz_core::config::MotrizConfig;
use motriz_core::error::{MotrizError, Result};
use motriz_core::traits::{ChannelSender, MessageRenderer};
use motriz_core::types::{
    DueThresholds, MaintenanceRecord, Reminder, ReminderStatus, Vehicle, new_id,
};
use motriz_store::SqliteStore;

use crate::dispatcher::{ChannelDelivery, DispatchOutcome, Dispatcher};
use crate::policy;
use crate::scanner::DueScanner;

/// Counts from one scan-then-dispatch pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassSummary {
    /// Reminders the scanner flagged as due.
    pub due: usize,
    /// Successful channel sends this pass.
    pub sent: usize,
    /// Failed channel attempts this pass.
    pub failed: usize,
    /// Channel deliveries skipped as already sent or in flight.
    pub deduped: usize,
    /// Reminders dropped between scan and dispatch (closed by a
    /// completion event, or with missing references).
    pub skipped: usize,
    /// (reminder, channel) pairs currently past the retry budget.
    pub exhausted_pairs: usize,
}

/// The due-detection and dispatch engine. Stateless between passes; all
/// shared state lives in the store, so multiple replicas can run the same
/// pass concurrently without duplicating sends.
pub struct ReminderEngine {
    store: Arc<SqliteStore>,
    scanner: DueScanner,
    dispatcher: Dispatcher,
    renderer: Box<dyn MessageRenderer>,
    concurrency: usize,
    claim_lease_secs: i64,
    max_attempts: u32,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<SqliteStore>,
        senders: Vec<Arc<dyn ChannelSender>>,
        renderer: Box<dyn MessageRenderer>,
        config: &MotrizConfig,
    ) -> Self {
        Self {
            scanner: DueScanner::new(store.clone()),
            dispatcher: Dispatcher::new(store.clone(), senders, config.dispatch.max_attempts),
            store,
            renderer,
            concurrency: config.scanner.concurrency,
            claim_lease_secs: config.dispatch.claim_lease_secs,
            max_attempts: config.dispatch.max_attempts,
        }
    }

    /// Register a vehicle and seed baseline reminders for every known
    /// maintenance type, from the default baseline (0 km, registration
    /// date). Types without an interval policy are skipped.
    pub fn register_vehicle(&self, vehicle: &Vehicle) -> Result<Vec<Reminder>> {
        self.store.insert_vehicle(vehicle)?;
        let baseline_date = vehicle.created_at.date_naive();
        let mut created = Vec::new();
        for mtype in self.store.list_maintenance_types()? {
            match policy::compute_next_due(&mtype, 0, baseline_date) {
                Ok(thresholds) => {
                    created.push(self.store.upsert_reminder(
                        &vehicle.id,
                        &mtype.id,
                        thresholds,
                        ReminderStatus::Pending,
                    )?);
                }
                Err(MotrizError::NoPolicy(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            "📅 Vehicle {} registered with {} reminder(s)",
            vehicle.id,
            created.len()
        );
        Ok(created)
    }

    /// The completion path: a maintenance record closes the active
    /// reminder for its key and derives the successor from the new
    /// baseline, atomically. Completion is driven by real-world evidence
    /// of service, never by the passage of the due date.
    pub fn record_maintenance(
        &self,
        vehicle_id: &str,
        maintenance_type_id: &str,
        km_at_maintenance: i64,
        date_performed: NaiveDate,
        cost: Option<String>,
        notes: Option<String>,
    ) -> Result<Option<Reminder>> {
        let mtype = self
            .store
            .get_maintenance_type(maintenance_type_id)?
            .ok_or_else(|| {
                MotrizError::Store(format!("unknown maintenance type {maintenance_type_id}"))
            })?;
        let record = MaintenanceRecord {
            id: new_id(),
            vehicle_id: vehicle_id.to_string(),
            maintenance_type_id: maintenance_type_id.to_string(),
            km_at_maintenance,
            date_performed,
            cost,
            notes,
            created_at: Utc::now(),
        };
        match policy::compute_next_due(&mtype, km_at_maintenance, date_performed) {
            Ok(thresholds) => {
                let next = self.store.insert_record_and_roll(&record, thresholds)?;
                tracing::info!(
                    "🔧 Recorded {} for vehicle {}; next due rolled forward",
                    mtype.name,
                    vehicle_id
                );
                Ok(Some(next))
            }
            Err(MotrizError::NoPolicy(_)) => {
                self.store.insert_record(&record)?;
                tracing::debug!(
                    "Recorded {} for vehicle {}; type has no interval policy, no reminder",
                    mtype.name,
                    vehicle_id
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Defer a reminder by revising its thresholds forward. Snooze is a
    /// policy recomputation, not a distinct scan path; the scanner keeps
    /// evaluating the row against the revised thresholds.
    pub fn snooze(&self, reminder_id: &str, revised: DueThresholds) -> Result<bool> {
        self.store.snooze_reminder(reminder_id, revised)
    }

    /// One scan-then-dispatch pass. Repeatable and safe to overlap: all
    /// exclusion happens in the store. A store error aborts the pass
    /// without partial multi-key writes; rerunning later is safe.
    pub async fn run_pass(&self, today: NaiveDate) -> Result<PassSummary> {
        let released = self.store.release_stale_claims(self.claim_lease_secs)?;
        if released > 0 {
            tracing::warn!("⚠️ Released {released} stale delivery claim(s) from an aborted pass");
        }

        let due = self.scanner.scan(today)?;
        let mut summary = PassSummary {
            due: due.len(),
            ..Default::default()
        };

        let results: Vec<Result<Option<Vec<ChannelDelivery>>>> = futures::stream::iter(due)
            .map(|reminder| self.dispatch_one(reminder))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            match result? {
                Some(deliveries) => {
                    for delivery in deliveries {
                        match delivery.outcome {
                            DispatchOutcome::Sent => summary.sent += 1,
                            DispatchOutcome::Failed { .. } => summary.failed += 1,
                            DispatchOutcome::AlreadySent | DispatchOutcome::InFlight => {
                                summary.deduped += 1
                            }
                            DispatchOutcome::Exhausted { .. }
                            | DispatchOutcome::NoRecipient
                            | DispatchOutcome::Unavailable => {}
                        }
                    }
                }
                None => summary.skipped += 1,
            }
        }

        let exhausted = self.store.exhausted_channels(self.max_attempts)?;
        for (reminder_id, channel, failures) in &exhausted {
            tracing::warn!(
                "🚨 Reminder {reminder_id} exhausted {failures} attempt(s) on {channel}; needs manual follow-up"
            );
        }
        summary.exhausted_pairs = exhausted.len();

        tracing::info!(
            "📣 Pass done: {} due, {} sent, {} failed, {} deduped, {} skipped",
            summary.due,
            summary.sent,
            summary.failed,
            summary.deduped,
            summary.skipped
        );
        Ok(summary)
    }

    /// Dispatch a single due reminder. Re-reads the row first: a
    /// completion event may have closed it between scan and dispatch, and
    /// a closed reminder must never be notified.
    async fn dispatch_one(&self, reminder: Reminder) -> Result<Option<Vec<ChannelDelivery>>> {
        let Some(current) = self.store.get_reminder(&reminder.id)? else {
            return Ok(None);
        };
        if !current.status.is_due_candidate() {
            tracing::debug!("Reminder {} closed before dispatch, skipping", current.id);
            return Ok(None);
        }
        let Some(vehicle) = self.store.get_vehicle(&current.vehicle_id)? else {
            return Ok(None);
        };
        let Some(mtype) = self.store.get_maintenance_type(&current.maintenance_type_id)? else {
            return Ok(None);
        };
        let Some(user) = self.store.get_user(&vehicle.user_id)? else {
            tracing::warn!("⚠️ Vehicle {} has no owning user row", vehicle.id);
            return Ok(None);
        };
        let message = self.renderer.render(&current, &vehicle, &mtype);
        let deliveries = self.dispatcher.dispatch(&current, &user, &message).await?;
        Ok(Some(deliveries))
    }
}

/// Spawn the periodic scan-then-dispatch loop as a background tokio task.
pub async fn spawn_engine(engine: Arc<ReminderEngine>, interval_secs: u64) {
    tracing::info!("⏰ Reminder engine started (scan every {interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let today = Utc::now().date_naive();
        match engine.run_pass(today).await {
            Ok(summary) => {
                if summary.due > 0 {
                    tracing::info!(
                        "🔔 {} reminder(s) due, {} notification(s) sent",
                        summary.due,
                        summary.sent
                    );
                }
            }
            Err(e) => tracing::error!("Pass aborted: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TemplateRenderer;
    use async_trait::async_trait;
    use motriz_core::types::{
        ChannelKind, MaintenanceCategory, MaintenanceType, NotifyPreference, ReminderMessage, User,
    };
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine_with(
        senders: Vec<Arc<dyn ChannelSender>>,
    ) -> (ReminderEngine, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = ReminderEngine::new(
            store.clone(),
            senders,
            Box::new(TemplateRenderer),
            &MotrizConfig::default(),
        );
        (engine, store)
    }

    fn seed(store: &SqliteStore) {
        store
            .upsert_user(&User {
                id: "u1".into(),
                name: "Ana".into(),
                email: Some("ana@example.com".into()),
                phone: Some("+5511999990000".into()),
                notification_preference: NotifyPreference::Both,
            })
            .unwrap();
        store
            .insert_maintenance_type(&MaintenanceType {
                id: "oil".into(),
                name: "Oil change".into(),
                interval_km: Some(5_000),
                interval_days: Some(180),
                category: MaintenanceCategory::Oil,
            })
            .unwrap();
        store
            .insert_vehicle(&Vehicle {
                id: "v1".into(),
                user_id: "u1".into(),
                brand: "Fiat".into(),
                model: "Argo".into(),
                year: 2021,
                current_km: 10_000,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn km_threshold_crossing_sends_once_per_channel() {
        let email = FakeSender::new(ChannelKind::Email);
        let wa = FakeSender::new(ChannelKind::WhatsApp);
        let (engine, store) = engine_with(vec![email.clone(), wa.clone()]);
        seed(&store);

        // Service at 14,000 km on 2025-01-01: next due 19,000 km or
        // 2025-06-30, whichever first.
        let next = engine
            .record_maintenance("v1", "oil", 14_000, date(2025, 1, 1), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(next.next_due_km, Some(19_000));
        assert_eq!(next.next_due_date, Some(date(2025, 6, 30)));

        // Not yet due: nothing goes out.
        let summary = engine.run_pass(date(2025, 2, 1)).await.unwrap();
        assert_eq!(summary.due, 0);

        // Odometer crosses the km threshold well before the date one.
        store.update_vehicle_km("v1", 19_500).unwrap();
        let summary = engine.run_pass(date(2025, 3, 1)).await.unwrap();
        assert_eq!(summary.due, 1);
        assert_eq!(summary.sent, 2);
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
        assert_eq!(wa.sent.load(Ordering::SeqCst), 1);

        let row = store.get_reminder(&next.id).unwrap().unwrap();
        assert_eq!(row.status, ReminderStatus::Sent);

        // A sent reminder leaves the candidate set; reruns are no-ops.
        let summary = engine.run_pass(date(2025, 3, 2)).await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completion_before_dispatch_suppresses_stale_notification() {
        let email = FakeSender::new(ChannelKind::Email);
        let (engine, store) = engine_with(vec![email.clone()]);
        seed(&store);

        engine
            .record_maintenance("v1", "oil", 14_000, date(2025, 1, 1), None, None)
            .unwrap();
        store.update_vehicle_km("v1", 19_500).unwrap();

        // A second service lands before any pass runs: the stale
        // threshold must never be notified.
        let next = engine
            .record_maintenance("v1", "oil", 20_000, date(2025, 2, 20), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(next.next_due_km, Some(25_000));

        let summary = engine.run_pass(date(2025, 3, 1)).await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(email.sent.load(Ordering::SeqCst), 0);

        // Exactly one active reminder for the key survives.
        let active = store.get_active_reminder("v1", "oil").unwrap().unwrap();
        assert_eq!(active.id, next.id);
        let all = store.list_reminders("v1").unwrap();
        assert_eq!(
            all.iter().filter(|r| r.status.is_active()).count(),
            1
        );
    }

    #[tokio::test]
    async fn all_channels_failing_keeps_reminder_open_for_retry() {
        let email = FakeSender::new(ChannelKind::Email);
        email.fail.store(true, Ordering::SeqCst);
        let (engine, store) = engine_with(vec![email.clone()]);
        seed(&store);
        store
            .upsert_user(&User {
                id: "u1".into(),
                name: "Ana".into(),
                email: Some("ana@example.com".into()),
                phone: None,
                notification_preference: NotifyPreference::Email,
            })
            .unwrap();

        let next = engine
            .record_maintenance("v1", "oil", 14_000, date(2025, 1, 1), None, None)
            .unwrap()
            .unwrap();
        store.update_vehicle_km("v1", 19_500).unwrap();

        let summary = engine.run_pass(date(2025, 3, 1)).await.unwrap();
        assert_eq!(summary.failed, 1);
        let row = store.get_reminder(&next.id).unwrap().unwrap();
        assert_eq!(row.status, ReminderStatus::Pending);

        // Provider recovers; the next pass delivers.
        email.fail.store(false, Ordering::SeqCst);
        let summary = engine.run_pass(date(2025, 3, 2)).await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_policy_type_records_history_without_reminder() {
        let (engine, store) = engine_with(vec![]);
        seed(&store);
        store
            .insert_maintenance_type(&MaintenanceType {
                id: "wash".into(),
                name: "Car wash".into(),
                interval_km: None,
                interval_days: None,
                category: MaintenanceCategory::Other,
            })
            .unwrap();

        let next = engine
            .record_maintenance("v1", "wash", 10_500, date(2025, 1, 15), None, None)
            .unwrap();
        assert!(next.is_none());
        assert_eq!(store.list_history("v1").unwrap().len(), 1);
        assert!(store.get_active_reminder("v1", "wash").unwrap().is_none());
    }

    #[tokio::test]
    async fn registration_seeds_default_baseline_reminders() {
        let (engine, store) = engine_with(vec![]);
        seed(&store);
        store
            .insert_maintenance_type(&MaintenanceType {
                id: "wash".into(),
                name: "Car wash".into(),
                interval_km: None,
                interval_days: None,
                category: MaintenanceCategory::Other,
            })
            .unwrap();

        let registered_at = Utc::now();
        let vehicle = Vehicle {
            id: "v2".into(),
            user_id: "u1".into(),
            brand: "VW".into(),
            model: "Gol".into(),
            year: 2019,
            current_km: 42_000,
            created_at: registered_at,
        };
        let created = engine.register_vehicle(&vehicle).unwrap();

        // Only the type with a policy seeds a reminder, from the default
        // 0 km / registration-date baseline.
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].maintenance_type_id, "oil");
        assert_eq!(created[0].next_due_km, Some(5_000));
        assert_eq!(
            created[0].next_due_date,
            Some(registered_at.date_naive() + chrono::Duration::days(180))
        );
    }

    #[tokio::test]
    async fn snoozed_reminder_is_reevaluated_against_revised_thresholds() {
        let email = FakeSender::new(ChannelKind::Email);
        let (engine, store) = engine_with(vec![email.clone()]);
        seed(&store);
        store
            .upsert_user(&User {
                id: "u1".into(),
                name: "Ana".into(),
                email: Some("ana@example.com".into()),
                phone: None,
                notification_preference: NotifyPreference::Email,
            })
            .unwrap();

        let next = engine
            .record_maintenance("v1", "oil", 14_000, date(2025, 1, 1), None, None)
            .unwrap()
            .unwrap();
        store.update_vehicle_km("v1", 19_500).unwrap();

        // User pushes the reminder out to 21,000 km.
        assert!(engine
            .snooze(
                &next.id,
                DueThresholds {
                    next_due_km: Some(21_000),
                    next_due_date: Some(date(2025, 6, 30)),
                },
            )
            .unwrap());

        let summary = engine.run_pass(date(2025, 3, 1)).await.unwrap();
        assert_eq!(summary.due, 0);

        // The revised threshold crosses like any other.
        store.update_vehicle_km("v1", 21_000).unwrap();
        let summary = engine.run_pass(date(2025, 4, 1)).await.unwrap();
        assert_eq!(summary.due, 1);
        assert_eq!(summary.sent, 1);
        let row = store.get_reminder(&next.id).unwrap().unwrap();
        assert_eq!(row.status, ReminderStatus::Sent);
    }
}
