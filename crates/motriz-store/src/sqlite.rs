//! SQLite store for vehicles, maintenance data, reminders, and the
//! delivery log.
//!
//! Two schema-level guarantees back the engine's invariants:
//! - `reminders_one_active`: at most one non-completed reminder per
//!   (vehicle, maintenance type) key.
//! - `delivery_log_claim`: at most one unresolved or delivered attempt per
//!   (reminder, channel) pair. Failed attempts fall out of the index, so a
//!   retry can claim the pair again.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;

use motriz_core::error::{MotrizError, Result};
use motriz_core::types::{
    ChannelKind, DeliveryLogEntry, DeliveryOutcome, DueThresholds, MaintenanceCategory,
    MaintenanceRecord, MaintenanceType, Reminder, ReminderStatus, User, Vehicle, new_id,
};

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// A successfully claimed delivery attempt, owned by the current pass
/// until resolved to `sent` or `failed`.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryClaim {
    pub id: i64,
    pub attempt: u32,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MotrizError::Store(format!("DB open: {e}")))?;
        // Replicas share the file; wait instead of failing on a held lock.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| MotrizError::Store(format!("busy_timeout: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MotrizError::Store(format!("DB open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                notification_preference TEXT NOT NULL DEFAULT 'both'
            );

            CREATE TABLE IF NOT EXISTS vehicles (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                brand TEXT NOT NULL,
                model TEXT NOT NULL,
                year INTEGER NOT NULL,
                current_km INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS maintenance_types (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                interval_km INTEGER,
                interval_days INTEGER,
                category TEXT NOT NULL DEFAULT 'other'
            );

            -- Immutable maintenance facts; insert-only.
            CREATE TABLE IF NOT EXISTS maintenance_history (
                id TEXT PRIMARY KEY,
                vehicle_id TEXT NOT NULL,
                maintenance_type_id TEXT NOT NULL,
                km_at_maintenance INTEGER NOT NULL,
                date_performed TEXT NOT NULL,
                cost TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                vehicle_id TEXT NOT NULL,
                maintenance_type_id TEXT NOT NULL,
                next_due_km INTEGER,
                next_due_date TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                sent_at TEXT,
                last_updated TEXT NOT NULL
            );

            -- One active reminder per (vehicle, type) key.
            CREATE UNIQUE INDEX IF NOT EXISTS reminders_one_active
                ON reminders(vehicle_id, maintenance_type_id)
                WHERE status != 'completed';

            CREATE TABLE IF NOT EXISTS delivery_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reminder_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                outcome TEXT NOT NULL DEFAULT 'pending',
                claimed_at TEXT NOT NULL,
                sent_at TEXT
            );

            -- At most one in-flight or delivered attempt per (reminder,
            -- channel); the claim INSERT races on this index.
            CREATE UNIQUE INDEX IF NOT EXISTS delivery_log_claim
                ON delivery_log(reminder_id, channel)
                WHERE outcome IN ('pending', 'sent');
         ",
        )
        .map_err(|e| MotrizError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MotrizError::Store(format!("lock poisoned: {e}")))
    }

    // ─── Users ──────────────────────────────────────

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO users (id, name, email, phone, notification_preference)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                user.id,
                user.name,
                user.email,
                user.phone,
                user.notification_preference.as_str(),
            ],
        )
        .map_err(|e| MotrizError::Store(format!("Upsert user: {e}")))?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, email, phone, notification_preference FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .map(Some)
        .or_else(not_found_as_none)
        .map_err(|e| MotrizError::Store(format!("Get user: {e}")))
    }

    // ─── Vehicles ──────────────────────────────────────

    pub fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO vehicles (id, user_id, brand, model, year, current_km, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                vehicle.id,
                vehicle.user_id,
                vehicle.brand,
                vehicle.model,
                vehicle.year,
                vehicle.current_km,
                vehicle.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| MotrizError::Store(format!("Insert vehicle: {e}")))?;
        Ok(())
    }

    pub fn get_vehicle(&self, id: &str) -> Result<Option<Vehicle>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, user_id, brand, model, year, current_km, created_at
             FROM vehicles WHERE id = ?1",
            [id],
            vehicle_from_row,
        )
        .map(Some)
        .or_else(not_found_as_none)
        .map_err(|e| MotrizError::Store(format!("Get vehicle: {e}")))
    }

    /// Record a new odometer reading. The stored value never decreases.
    pub fn update_vehicle_km(&self, id: &str, km: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE vehicles SET current_km = MAX(current_km, ?2) WHERE id = ?1",
            rusqlite::params![id, km],
        )
        .map_err(|e| MotrizError::Store(format!("Update odometer: {e}")))?;
        Ok(())
    }

    // ─── Maintenance types ──────────────────────────────────────

    pub fn insert_maintenance_type(&self, mtype: &MaintenanceType) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO maintenance_types (id, name, interval_km, interval_days, category)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                mtype.id,
                mtype.name,
                mtype.interval_km,
                mtype.interval_days,
                mtype.category.as_str(),
            ],
        )
        .map_err(|e| MotrizError::Store(format!("Insert maintenance type: {e}")))?;
        Ok(())
    }

    pub fn get_maintenance_type(&self, id: &str) -> Result<Option<MaintenanceType>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, interval_km, interval_days, category
             FROM maintenance_types WHERE id = ?1",
            [id],
            mtype_from_row,
        )
        .map(Some)
        .or_else(not_found_as_none)
        .map_err(|e| MotrizError::Store(format!("Get maintenance type: {e}")))
    }

    pub fn list_maintenance_types(&self) -> Result<Vec<MaintenanceType>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, interval_km, interval_days, category
                 FROM maintenance_types ORDER BY name",
            )
            .map_err(|e| MotrizError::Store(format!("List maintenance types: {e}")))?;
        let rows = stmt
            .query_map([], mtype_from_row)
            .map_err(|e| MotrizError::Store(format!("List maintenance types: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ─── Maintenance history ──────────────────────────────────────

    /// Insert a maintenance record without touching reminders. Used when
    /// the maintenance type has no interval policy.
    pub fn insert_record(&self, record: &MaintenanceRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO maintenance_history
             (id, vehicle_id, maintenance_type_id, km_at_maintenance, date_performed, cost, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.id,
                record.vehicle_id,
                record.maintenance_type_id,
                record.km_at_maintenance,
                record.date_performed.format(DATE_FMT).to_string(),
                record.cost,
                record.notes,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| MotrizError::Store(format!("Insert record: {e}")))?;
        conn.execute(
            "UPDATE vehicles SET current_km = MAX(current_km, ?2) WHERE id = ?1",
            rusqlite::params![record.vehicle_id, record.km_at_maintenance],
        )
        .map_err(|e| MotrizError::Store(format!("Bump odometer: {e}")))?;
        Ok(())
    }

    pub fn list_history(&self, vehicle_id: &str) -> Result<Vec<MaintenanceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, vehicle_id, maintenance_type_id, km_at_maintenance, date_performed,
                        cost, notes, created_at
                 FROM maintenance_history WHERE vehicle_id = ?1 ORDER BY date_performed",
            )
            .map_err(|e| MotrizError::Store(format!("List history: {e}")))?;
        let rows = stmt
            .query_map([vehicle_id], record_from_row)
            .map_err(|e| MotrizError::Store(format!("List history: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ─── Reminders ──────────────────────────────────────

    /// Close any active reminder for the key and insert its successor, in
    /// one transaction. A concurrent scan pass sees either the old active
    /// reminder or the new one, never both and never neither.
    pub fn upsert_reminder(
        &self,
        vehicle_id: &str,
        maintenance_type_id: &str,
        thresholds: DueThresholds,
        status: ReminderStatus,
    ) -> Result<Reminder> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| MotrizError::Store(format!("Begin upsert: {e}")))?;
        let reminder = roll_reminder_tx(&tx, vehicle_id, maintenance_type_id, thresholds, status)?;
        tx.commit()
            .map_err(|e| MotrizError::Store(format!("Commit upsert: {e}")))?;
        Ok(reminder)
    }

    pub fn get_reminder(&self, id: &str) -> Result<Option<Reminder>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, vehicle_id, maintenance_type_id, next_due_km, next_due_date,
                    status, sent_at, last_updated
             FROM reminders WHERE id = ?1",
            [id],
            reminder_from_row,
        )
        .map(Some)
        .or_else(not_found_as_none)
        .map_err(|e| MotrizError::Store(format!("Get reminder: {e}")))
    }

    pub fn get_active_reminder(
        &self,
        vehicle_id: &str,
        maintenance_type_id: &str,
    ) -> Result<Option<Reminder>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, vehicle_id, maintenance_type_id, next_due_km, next_due_date,
                    status, sent_at, last_updated
             FROM reminders
             WHERE vehicle_id = ?1 AND maintenance_type_id = ?2 AND status != 'completed'",
            [vehicle_id, maintenance_type_id],
            reminder_from_row,
        )
        .map(Some)
        .or_else(not_found_as_none)
        .map_err(|e| MotrizError::Store(format!("Get active reminder: {e}")))
    }

    /// All pending/snoozed reminders. Threshold filtering is the scanner's
    /// job; thresholds may change between snapshot and evaluation.
    pub fn list_due_candidates(&self) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, vehicle_id, maintenance_type_id, next_due_km, next_due_date,
                        status, sent_at, last_updated
                 FROM reminders WHERE status IN ('pending', 'snoozed') ORDER BY last_updated",
            )
            .map_err(|e| MotrizError::Store(format!("List candidates: {e}")))?;
        let rows = stmt
            .query_map([], reminder_from_row)
            .map_err(|e| MotrizError::Store(format!("List candidates: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn list_reminders(&self, vehicle_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, vehicle_id, maintenance_type_id, next_due_km, next_due_date,
                        status, sent_at, last_updated
                 FROM reminders WHERE vehicle_id = ?1 ORDER BY last_updated",
            )
            .map_err(|e| MotrizError::Store(format!("List reminders: {e}")))?;
        let rows = stmt
            .query_map([vehicle_id], reminder_from_row)
            .map_err(|e| MotrizError::Store(format!("List reminders: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Conditional `pending|snoozed -> sent` transition. Returns false if
    /// the reminder was meanwhile completed or already sent; status never
    /// regresses.
    pub fn mark_reminder_sent(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let now = Utc::now();
        let changed = conn
            .execute(
                "UPDATE reminders SET status = 'sent', sent_at = ?2, last_updated = ?2
                 WHERE id = ?1 AND status IN ('pending', 'snoozed')",
                rusqlite::params![id, now.to_rfc3339()],
            )
            .map_err(|e| MotrizError::Store(format!("Mark sent: {e}")))?;
        Ok(changed > 0)
    }

    /// Defer an open reminder by revising its thresholds forward. The
    /// revised thresholds are the whole snooze state; there is no separate
    /// snooze field.
    pub fn snooze_reminder(&self, id: &str, thresholds: DueThresholds) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE reminders
                 SET next_due_km = ?2, next_due_date = ?3, status = 'snoozed', last_updated = ?4
                 WHERE id = ?1 AND status IN ('pending', 'sent')",
                rusqlite::params![
                    id,
                    thresholds.next_due_km,
                    thresholds.next_due_date.map(|d| d.format(DATE_FMT).to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| MotrizError::Store(format!("Snooze: {e}")))?;
        Ok(changed > 0)
    }

    /// The completion path: insert the maintenance record, bump the
    /// vehicle odometer, close the active reminder, and derive the
    /// successor from the new baseline — one transaction.
    pub fn insert_record_and_roll(
        &self,
        record: &MaintenanceRecord,
        thresholds: DueThresholds,
    ) -> Result<Reminder> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| MotrizError::Store(format!("Begin record: {e}")))?;
        tx.execute(
            "INSERT INTO maintenance_history
             (id, vehicle_id, maintenance_type_id, km_at_maintenance, date_performed, cost, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.id,
                record.vehicle_id,
                record.maintenance_type_id,
                record.km_at_maintenance,
                record.date_performed.format(DATE_FMT).to_string(),
                record.cost,
                record.notes,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| MotrizError::Store(format!("Insert record: {e}")))?;
        tx.execute(
            "UPDATE vehicles SET current_km = MAX(current_km, ?2) WHERE id = ?1",
            rusqlite::params![record.vehicle_id, record.km_at_maintenance],
        )
        .map_err(|e| MotrizError::Store(format!("Bump odometer: {e}")))?;
        let reminder = roll_reminder_tx(
            &tx,
            &record.vehicle_id,
            &record.maintenance_type_id,
            thresholds,
            ReminderStatus::Pending,
        )?;
        tx.commit()
            .map_err(|e| MotrizError::Store(format!("Commit record: {e}")))?;
        Ok(reminder)
    }

    // ─── Delivery log ──────────────────────────────────────

    /// Claim the next delivery attempt for (reminder, channel). Returns
    /// `None` when the pair is already sent or another pass holds an
    /// unresolved claim — the caller must not send in that case. The
    /// insert races on the `delivery_log_claim` unique index, so two
    /// overlapping passes can never both win.
    pub fn claim_delivery(
        &self,
        reminder_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<DeliveryClaim>> {
        let conn = self.lock()?;
        let now = Utc::now();
        let changed = conn
            .execute(
                "INSERT INTO delivery_log (reminder_id, channel, attempt, outcome, claimed_at)
                 VALUES (?1, ?2,
                         (SELECT COUNT(*) + 1 FROM delivery_log
                          WHERE reminder_id = ?1 AND channel = ?2),
                         'pending', ?3)
                 ON CONFLICT DO NOTHING",
                rusqlite::params![reminder_id, channel.as_str(), now.to_rfc3339()],
            )
            .map_err(|e| MotrizError::Store(format!("Claim delivery: {e}")))?;
        if changed == 0 {
            return Ok(None);
        }
        let id = conn.last_insert_rowid();
        let attempt: u32 = conn
            .query_row("SELECT attempt FROM delivery_log WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .map_err(|e| MotrizError::Store(format!("Read claim: {e}")))?;
        Ok(Some(DeliveryClaim { id, attempt }))
    }

    /// Resolve a claim after a successful send.
    pub fn resolve_delivery_sent(&self, claim_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE delivery_log SET outcome = 'sent', sent_at = ?2
             WHERE id = ?1 AND outcome = 'pending'",
            rusqlite::params![claim_id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| MotrizError::Store(format!("Resolve sent: {e}")))?;
        Ok(())
    }

    /// Resolve a claim after a failed send; frees the pair for retry.
    pub fn resolve_delivery_failed(&self, claim_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE delivery_log SET outcome = 'failed'
             WHERE id = ?1 AND outcome = 'pending'",
            rusqlite::params![claim_id],
        )
        .map_err(|e| MotrizError::Store(format!("Resolve failed: {e}")))?;
        Ok(())
    }

    pub fn has_sent_entry(&self, reminder_id: &str, channel: ChannelKind) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM delivery_log
                 WHERE reminder_id = ?1 AND channel = ?2 AND outcome = 'sent'",
                rusqlite::params![reminder_id, channel.as_str()],
                |r| r.get(0),
            )
            .map_err(|e| MotrizError::Store(format!("Check sent: {e}")))?;
        Ok(count > 0)
    }

    pub fn failed_attempts(&self, reminder_id: &str, channel: ChannelKind) -> Result<u32> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM delivery_log
             WHERE reminder_id = ?1 AND channel = ?2 AND outcome = 'failed'",
            rusqlite::params![reminder_id, channel.as_str()],
            |r| r.get(0),
        )
        .map_err(|e| MotrizError::Store(format!("Count failures: {e}")))
    }

    /// Convert claims abandoned by an aborted pass to `failed` once their
    /// lease expires, making the pair retryable again.
    pub fn release_stale_claims(&self, lease_secs: i64) -> Result<usize> {
        let conn = self.lock()?;
        let cutoff = Utc::now() - Duration::seconds(lease_secs);
        let changed = conn
            .execute(
                "UPDATE delivery_log SET outcome = 'failed'
                 WHERE outcome = 'pending' AND claimed_at < ?1",
                rusqlite::params![cutoff.to_rfc3339()],
            )
            .map_err(|e| MotrizError::Store(format!("Release claims: {e}")))?;
        Ok(changed)
    }

    /// (reminder, channel) pairs that burned through the retry budget
    /// without a successful send. Surfaced for operator follow-up.
    pub fn exhausted_channels(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<(String, ChannelKind, u32)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT d.reminder_id, d.channel, COUNT(*) AS failures
                 FROM delivery_log d
                 WHERE d.outcome = 'failed'
                   AND NOT EXISTS (SELECT 1 FROM delivery_log s
                                   WHERE s.reminder_id = d.reminder_id
                                     AND s.channel = d.channel
                                     AND s.outcome = 'sent')
                 GROUP BY d.reminder_id, d.channel
                 HAVING COUNT(*) >= ?1",
            )
            .map_err(|e| MotrizError::Store(format!("Exhausted query: {e}")))?;
        let rows = stmt
            .query_map([max_attempts], |row| {
                let reminder_id: String = row.get(0)?;
                let channel: String = row.get(1)?;
                let failures: u32 = row.get(2)?;
                Ok((reminder_id, channel, failures))
            })
            .map_err(|e| MotrizError::Store(format!("Exhausted query: {e}")))?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|(id, ch, n)| ChannelKind::parse(&ch).map(|ch| (id, ch, n)))
            .collect())
    }

    /// Recent delivery attempts, newest first. Operator audit view.
    pub fn recent_deliveries(&self, limit: usize) -> Result<Vec<DeliveryLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, reminder_id, channel, attempt, outcome, claimed_at, sent_at
                 FROM delivery_log ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| MotrizError::Store(format!("Recent deliveries: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], delivery_from_row)
            .map_err(|e| MotrizError::Store(format!("Recent deliveries: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

/// Close-then-create inside an open transaction. Shared by the reminder
/// upsert and the record-insertion path.
fn roll_reminder_tx(
    tx: &rusqlite::Transaction<'_>,
    vehicle_id: &str,
    maintenance_type_id: &str,
    thresholds: DueThresholds,
    status: ReminderStatus,
) -> Result<Reminder> {
    let now = Utc::now();
    tx.execute(
        "UPDATE reminders SET status = 'completed', last_updated = ?3
         WHERE vehicle_id = ?1 AND maintenance_type_id = ?2 AND status != 'completed'",
        rusqlite::params![vehicle_id, maintenance_type_id, now.to_rfc3339()],
    )
    .map_err(|e| MotrizError::Store(format!("Close reminder: {e}")))?;

    let reminder = Reminder {
        id: new_id(),
        vehicle_id: vehicle_id.to_string(),
        maintenance_type_id: maintenance_type_id.to_string(),
        next_due_km: thresholds.next_due_km,
        next_due_date: thresholds.next_due_date,
        status,
        sent_at: None,
        last_updated: now,
    };
    tx.execute(
        "INSERT INTO reminders
         (id, vehicle_id, maintenance_type_id, next_due_km, next_due_date, status, sent_at, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            reminder.id,
            reminder.vehicle_id,
            reminder.maintenance_type_id,
            reminder.next_due_km,
            reminder
                .next_due_date
                .map(|d| d.format(DATE_FMT).to_string()),
            reminder.status.as_str(),
            Option::<String>::None,
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| MotrizError::Store(format!("Insert reminder: {e}")))?;
    Ok(reminder)
}

// ─── Row mapping ──────────────────────────────────────

fn not_found_as_none<T>(e: rusqlite::Error) -> std::result::Result<Option<T>, rusqlite::Error> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

fn parse_utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let preference: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        notification_preference: motriz_core::types::NotifyPreference::parse(&preference)
            .unwrap_or(motriz_core::types::NotifyPreference::Both),
    })
}

fn vehicle_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vehicle> {
    let created_at: String = row.get(6)?;
    Ok(Vehicle {
        id: row.get(0)?,
        user_id: row.get(1)?,
        brand: row.get(2)?,
        model: row.get(3)?,
        year: row.get(4)?,
        current_km: row.get(5)?,
        created_at: parse_utc(&created_at),
    })
}

fn mtype_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MaintenanceType> {
    let category: String = row.get(4)?;
    Ok(MaintenanceType {
        id: row.get(0)?,
        name: row.get(1)?,
        interval_km: row.get(2)?,
        interval_days: row.get(3)?,
        category: MaintenanceCategory::parse(&category),
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MaintenanceRecord> {
    let date_performed: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(MaintenanceRecord {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        maintenance_type_id: row.get(2)?,
        km_at_maintenance: row.get(3)?,
        date_performed: NaiveDate::parse_from_str(&date_performed, DATE_FMT)
            .unwrap_or_else(|_| Utc::now().date_naive()),
        cost: row.get(5)?,
        notes: row.get(6)?,
        created_at: parse_utc(&created_at),
    })
}

fn reminder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reminder> {
    let status: String = row.get(5)?;
    let sent_at: Option<String> = row.get(6)?;
    let last_updated: String = row.get(7)?;
    let next_due_date: Option<String> = row.get(4)?;
    Ok(Reminder {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        maintenance_type_id: row.get(2)?,
        next_due_km: row.get(3)?,
        next_due_date: next_due_date
            .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FMT).ok()),
        status: ReminderStatus::parse(&status).unwrap_or(ReminderStatus::Pending),
        sent_at: sent_at.map(|s| parse_utc(&s)),
        last_updated: parse_utc(&last_updated),
    })
}

fn delivery_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryLogEntry> {
    let channel: String = row.get(2)?;
    let outcome: String = row.get(4)?;
    let claimed_at: String = row.get(5)?;
    let sent_at: Option<String> = row.get(6)?;
    Ok(DeliveryLogEntry {
        id: row.get(0)?,
        reminder_id: row.get(1)?,
        channel: ChannelKind::parse(&channel).unwrap_or(ChannelKind::Email),
        attempt: row.get(3)?,
        outcome: DeliveryOutcome::parse(&outcome).unwrap_or(DeliveryOutcome::Pending),
        claimed_at: parse_utc(&claimed_at),
        sent_at: sent_at.map(|s| parse_utc(&s)),
    })
}
