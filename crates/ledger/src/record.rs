//! Sync record data structures

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One outcome of a sync job, as stored in the ledger
///
/// Records are immutable once appended. A record without a destination is a
/// tombstone: the artifact previously produced for `source` was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Generation (run) that produced this record
    pub sync_generation: u64,
    /// Source file under the managed collection
    pub source: PathBuf,
    /// Artifact path, `None` for tombstones
    pub destination: Option<PathBuf>,
    /// Conversion preset that produced the artifact, `None` for plain copies
    pub transform: Option<String>,
    /// Unix seconds
    pub timestamp: u64,
}

impl SyncRecord {
    /// Record that `source` now has an artifact at `destination`
    pub fn artifact(
        sync_generation: u64,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        transform: Option<String>,
    ) -> Self {
        Self {
            sync_generation,
            source: source.into(),
            destination: Some(destination.into()),
            transform,
            timestamp: now_secs(),
        }
    }

    /// Record that the artifact for `source` was removed
    pub fn tombstone(sync_generation: u64, source: impl Into<PathBuf>) -> Self {
        Self {
            sync_generation,
            source: source.into(),
            destination: None,
            transform: None,
            timestamp: now_secs(),
        }
    }

    /// Override the timestamp (mostly useful when replaying history)
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this record marks a removed artifact
    pub fn is_tombstone(&self) -> bool {
        self.destination.is_none()
    }

    /// Destination path, if any
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Ordering key among records of the same source: timestamp, then generation
    pub(crate) fn recency(&self) -> (u64, u64) {
        (self.timestamp, self.sync_generation)
    }

    pub(crate) fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Current time in Unix seconds
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
