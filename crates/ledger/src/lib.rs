//! Sync ledger and history records
//!
//! This crate provides:
//! - Sync records (source -> destination/transform outcomes, tombstones)
//! - Sync generations (per-run policy snapshots)
//! - Append-only ledger (sled embedded DB) with a latest-record index

pub mod generation;
pub mod ledger;
pub mod record;

// Re-exports
pub use generation::{SyncGeneration, DRY_RUN_GENERATION};
pub use ledger::{Ledger, LEDGER_DIR};
pub use record::{now_secs, SyncRecord};

use std::path::PathBuf;

/// Errors raised by the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The store could not be opened or created
    #[error("ledger unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    /// A read or write against the open store failed
    #[error("ledger storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A record could not be encoded or decoded
    #[error("ledger encoding error: {0}")]
    Codec(#[from] bincode::Error),

    /// Stored bytes do not have the expected shape
    #[error("corrupt ledger entry: {0}")]
    Corrupt(String),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
