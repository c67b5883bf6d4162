//! Workspace error type.

use thiserror::Error;

/// Errors surfaced by the reminder engine and its collaborators.
#[derive(Debug, Error)]
pub enum MotrizError {
    #[error("Config error: {0}")]
    Config(String),

    /// Persistence unreachable or a statement failed. The current pass
    /// aborts without partial writes and is safe to retry.
    #[error("Store error: {0}")]
    Store(String),

    /// Transient channel-sender failure. Logged as a failed delivery
    /// attempt and retried on a later dispatch pass.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Maintenance type has neither a km nor a day interval. Reminder
    /// creation is skipped; never surfaced to the end user.
    #[error("maintenance type '{0}' has no interval policy")]
    NoPolicy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MotrizError>;
