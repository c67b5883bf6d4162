//! Interval policy — pure threshold arithmetic from a baseline.

use chrono::{Duration, NaiveDate};

use motriz_core::error::{MotrizError, Result};
use motriz_core::types::{DueThresholds, MaintenanceType};

/// Compute the next due thresholds for a maintenance type from a baseline
/// (the odometer and date of the last matching service, or the
/// registration baseline).
///
/// A type with neither interval configured yields `NoPolicy`; the caller
/// must not create a reminder for it.
pub fn compute_next_due(
    mtype: &MaintenanceType,
    baseline_km: i64,
    baseline_date: NaiveDate,
) -> Result<DueThresholds> {
    if mtype.interval_km.is_none() && mtype.interval_days.is_none() {
        return Err(MotrizError::NoPolicy(mtype.name.clone()));
    }
    Ok(DueThresholds {
        next_due_km: mtype.interval_km.map(|interval| baseline_km + interval),
        next_due_date: mtype
            .interval_days
            .map(|interval| baseline_date + Duration::days(interval)),
    })
}
