//! Sync generation: the policy snapshot of one run

use crate::Result;
use serde::{Deserialize, Serialize};

/// Generation id used by dry runs; never persisted
pub const DRY_RUN_GENERATION: u64 = 0;

/// Immutable snapshot of the policy in effect for one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGeneration {
    /// Monotonic id, starting at 1
    pub id: u64,
    /// Unix seconds
    pub created_at: u64,
    /// Filename format used to compute destinations
    pub filename_format: String,
    /// Whether cover art was synced
    pub cover_sync_enabled: bool,
    /// Cover file name inside each destination directory
    pub cover_filename: Option<String>,
    /// Whether unreferenced artifacts were removed
    pub remove_unreferenced: bool,
}

impl SyncGeneration {
    pub(crate) fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
