//! Run-level errors

use ledger::LedgerError;
use thiserror::Error;

/// Errors that abort a run before any job is queued
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync ledger unavailable: {0}")]
    LedgerUnavailable(#[source] LedgerError),

    #[error("could not create sync generation: {0}")]
    GenerationCreateFailed(#[source] LedgerError),

    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error("job queue still holds {0} pending jobs")]
    QueueBusy(usize),

    #[error("invalid configuration: {field} {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl SyncError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

/// Result type for run-level operations
pub type Result<T> = std::result::Result<T, SyncError>;
