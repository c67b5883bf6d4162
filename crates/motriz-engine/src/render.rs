//! Default notification templates.
//!
//! The dispatcher treats rendered messages as opaque; products with their
//! own templating plug in a different `MessageRenderer`.

use motriz_core::traits::MessageRenderer;
use motriz_core::types::{MaintenanceType, Reminder, ReminderMessage, Vehicle};

/// Plain-text reminder template with the vehicle description, the
/// maintenance name, and whichever thresholds are set.
pub struct TemplateRenderer;

impl MessageRenderer for TemplateRenderer {
    fn render(
        &self,
        reminder: &Reminder,
        vehicle: &Vehicle,
        mtype: &MaintenanceType,
    ) -> ReminderMessage {
        let subject = format!("Maintenance due: {} — {}", mtype.name, vehicle.describe());

        let mut body = format!(
            "Your {} is due for {}.",
            vehicle.describe(),
            mtype.name.to_lowercase()
        );
        if let Some(km) = reminder.next_due_km {
            body.push_str(&format!(
                " Due at {} km (odometer now at {} km).",
                km, vehicle.current_km
            ));
        }
        if let Some(date) = reminder.next_due_date {
            body.push_str(&format!(" Due by {}.", date.format("%Y-%m-%d")));
        }
        body.push_str(" Book your service to keep the vehicle in good shape.");

        ReminderMessage { subject, body }
    }
}
