//! # Motriz Engine
//!
//! The due-detection and reminder-dispatch core.
//!
//! ## Architecture
//! ```text
//! MaintenanceRecord inserted
//!   └── policy: baseline → next thresholds
//!         └── store: close old reminder, create successor (atomic)
//!
//! Periodic pass (tokio interval)
//!   ├── release stale delivery claims
//!   ├── scanner: pending/snoozed + vehicle state → due reminders
//!   └── dispatcher (bounded concurrency)
//!         ├── delivery log claim → at-most-once per (reminder, channel)
//!         ├── ChannelSender::send → email / whatsapp / sms
//!         └── first success → reminder marked sent
//! ```

pub mod dispatcher;
pub mod engine;
pub mod policy;
pub mod render;
pub mod scanner;

pub use dispatcher::{ChannelDelivery, DispatchOutcome, Dispatcher};
pub use engine::{PassSummary, ReminderEngine, spawn_engine};
pub use policy::compute_next_due;
pub use render::TemplateRenderer;
pub use scanner::{DueScanner, is_due};
