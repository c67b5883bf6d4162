//! Due scanner — decides which candidate reminders have crossed their
//! threshold given current vehicle state.

use std::sync::Arc;

use chrono::NaiveDate;

use motriz_core::error::Result;
use motriz_core::types::Reminder;
use motriz_store::SqliteStore;

/// Whether a reminder has crossed either of its thresholds. Thresholds
/// are inclusive, and either one triggers: a heavily driven vehicle is
/// reminded by distance before the calendar interval elapses, and a
/// rarely driven one by calendar time before the distance is reached.
pub fn is_due(reminder: &Reminder, current_km: i64, today: NaiveDate) -> bool {
    let km_due = reminder.next_due_km.is_some_and(|due| current_km >= due);
    let date_due = reminder.next_due_date.is_some_and(|due| today >= due);
    km_due || date_due
}

/// Batch pass over all pending/snoozed reminders. Stateless between runs
/// and safe to run at arbitrary intervals, including overlapping passes;
/// it only reads.
pub struct DueScanner {
    store: Arc<SqliteStore>,
}

impl DueScanner {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Evaluate every candidate against the vehicle's current odometer
    /// and `today`, returning the due ones. Snoozed reminders are
    /// evaluated identically to pending ones; the snooze already revised
    /// their thresholds.
    pub fn scan(&self, today: NaiveDate) -> Result<Vec<Reminder>> {
        let candidates = self.store.list_due_candidates()?;
        let total = candidates.len();
        let mut due = Vec::new();
        for reminder in candidates {
            let Some(vehicle) = self.store.get_vehicle(&reminder.vehicle_id)? else {
                tracing::warn!(
                    "⚠️ Reminder {} references missing vehicle {}",
                    reminder.id,
                    reminder.vehicle_id
                );
                continue;
            };
            if is_due(&reminder, vehicle.current_km, today) {
                due.push(reminder);
            }
        }
        tracing::info!("🔎 Scan: {}/{} candidates due", due.len(), total);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use motriz_core::types::{DueThresholds, ReminderStatus, User, Vehicle};

    fn reminder(km: Option<i64>, date: Option<NaiveDate>) -> Reminder {
        Reminder {
            id: "r1".into(),
            vehicle_id: "v1".into(),
            maintenance_type_id: "t1".into(),
            next_due_km: km,
            next_due_date: date,
            status: ReminderStatus::Pending,
            sent_at: None,
            last_updated: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn km_threshold_is_inclusive() {
        let r = reminder(Some(19_000), None);
        assert!(!is_due(&r, 18_999, date(2025, 3, 1)));
        assert!(is_due(&r, 19_000, date(2025, 3, 1)));
        assert!(is_due(&r, 19_001, date(2025, 3, 1)));
    }

    #[test]
    fn km_only_type_ignores_calendar() {
        let r = reminder(Some(19_000), None);
        // Far in the future, still not due by distance.
        assert!(!is_due(&r, 10_000, date(2099, 1, 1)));
    }

    #[test]
    fn either_threshold_triggers() {
        let r = reminder(Some(19_000), Some(date(2025, 6, 30)));
        // km reached, date not reached
        assert!(is_due(&r, 19_500, date(2025, 3, 1)));
        // date reached, km not reached
        assert!(is_due(&r, 15_000, date(2025, 7, 1)));
        // date boundary is inclusive
        assert!(is_due(&r, 15_000, date(2025, 6, 30)));
        // neither reached
        assert!(!is_due(&r, 15_000, date(2025, 3, 1)));
    }

    #[test]
    fn no_thresholds_never_due() {
        let r = reminder(None, None);
        assert!(!is_due(&r, i64::MAX, date(2099, 1, 1)));
    }

    #[test]
    fn scan_filters_by_current_vehicle_state() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_user(&User {
                id: "u1".into(),
                name: "Ana".into(),
                email: None,
                phone: None,
                notification_preference: motriz_core::types::NotifyPreference::Both,
            })
            .unwrap();
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
        // Due by km.
        store
            .upsert_reminder(
                "v1",
                "t1",
                DueThresholds {
                    next_due_km: Some(19_000),
                    next_due_date: Some(date(2025, 6, 30)),
                },
                ReminderStatus::Pending,
            )
            .unwrap();
        // Not due on either axis.
        store
            .upsert_reminder(
                "v1",
                "t2",
                DueThresholds {
                    next_due_km: Some(40_000),
                    next_due_date: Some(date(2026, 1, 1)),
                },
                ReminderStatus::Pending,
            )
            .unwrap();

        let scanner = DueScanner::new(store);
        let due = scanner.scan(date(2025, 3, 1)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].maintenance_type_id, "t1");
    }
}
