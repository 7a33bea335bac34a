//! Append-only sync ledger using sled

use crate::{now_secs, LedgerError, Result, SyncGeneration, SyncRecord};
use parking_lot::{Mutex, RwLock};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Directory under the destination root holding the ledger store
pub const LEDGER_DIR: &str = ".ows";

const STORE_NAME: &str = "ledger";

/// Latest record for one source plus the sequence it was stored under
#[derive(Debug)]
struct Latest {
    record: SyncRecord,
    seq: u64,
}

/// Counters advanced only while holding the writer lock
#[derive(Debug)]
struct WriterState {
    next_seq: u64,
    next_generation: u64,
}

/// Append-only history of sync outcomes for one destination root
///
/// Layout under `<root>/.ows/ledger`:
/// - `records`: sequence number (big-endian u64) -> [`SyncRecord`]
/// - `generations`: generation id (big-endian u64) -> [`SyncGeneration`]
/// - `seen`: source path bytes -> last-seen Unix seconds
///
/// Appends are serialized by one writer lock, and the latest-record index is
/// updated before the lock is released, so lookups observe appends in order.
#[derive(Debug)]
pub struct Ledger {
    /// Destination root this ledger belongs to
    root: PathBuf,
    /// Sled database
    db: Db,
    records: Tree,
    generations: Tree,
    seen: Tree,
    /// In-memory index: source -> latest record
    latest: RwLock<HashMap<PathBuf, Latest>>,
    writer: Mutex<WriterState>,
    record_count: AtomicU64,
}

impl Ledger {
    /// Open or create the ledger for a destination root
    ///
    /// A store that sled reports as corrupt is moved aside and replaced by an
    /// empty one. Individual records that fail to decode are skipped.
    pub fn open(root: &Path) -> Result<Self> {
        let store = store_path(root);
        let db = open_store(&store)?;
        Self::with_db(root, db, store)
    }

    /// Ledger backed by a throwaway store that is discarded on drop
    ///
    /// Used for previews of a root that has no ledger yet.
    pub fn temporary(root: &Path) -> Result<Self> {
        let store = store_path(root);
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|source| LedgerError::Unavailable {
                path: store.clone(),
                source,
            })?;
        Self::with_db(root, db, store)
    }

    /// Whether a ledger store already exists under `root`
    pub fn exists(root: &Path) -> bool {
        store_path(root).is_dir()
    }

    fn with_db(root: &Path, db: Db, store: PathBuf) -> Result<Self> {
        let unavailable = |source| LedgerError::Unavailable {
            path: store.clone(),
            source,
        };

        let records = db.open_tree("records").map_err(unavailable)?;
        let generations = db.open_tree("generations").map_err(unavailable)?;
        let seen = db.open_tree("seen").map_err(unavailable)?;

        // Build in-memory index on startup
        let mut latest = HashMap::new();
        let mut next_seq = 0u64;
        let mut count = 0u64;
        let mut skipped = 0usize;

        for item in records.iter() {
            let (key, value) = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(store = %store.display(), error = %e, "Ledger scan aborted, history is partial");
                    break;
                }
            };
            let Some(seq) = decode_u64(&key) else {
                skipped += 1;
                continue;
            };
            next_seq = next_seq.max(seq + 1);

            match SyncRecord::deserialize(&value) {
                Ok(record) => {
                    remember(&mut latest, record, seq);
                    count += 1;
                }
                Err(e) => {
                    debug!(seq, error = %e, "Skipping undecodable ledger record");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!(store = %store.display(), skipped, "Ledger contains undecodable records");
        }

        let next_generation = match generations.last() {
            Ok(Some((key, _))) => decode_u64(&key).map_or(1, |id| id + 1),
            Ok(None) => 1,
            Err(e) => {
                warn!(error = %e, "Could not read last generation, restarting ids at 1");
                1
            }
        };

        debug!(
            store = %store.display(),
            records = count,
            sources = latest.len(),
            next_generation,
            "Opened ledger"
        );

        Ok(Self {
            root: root.to_path_buf(),
            db,
            records,
            generations,
            seen,
            latest: RwLock::new(latest),
            writer: Mutex::new(WriterState {
                next_seq,
                next_generation,
            }),
            record_count: AtomicU64::new(count),
        })
    }

    /// Destination root this ledger tracks
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a new generation and return its id
    pub fn begin_generation(
        &self,
        filename_format: &str,
        cover_sync_enabled: bool,
        cover_filename: Option<&str>,
        remove_unreferenced: bool,
    ) -> Result<u64> {
        let mut writer = self.writer.lock();
        let generation = SyncGeneration {
            id: writer.next_generation,
            created_at: now_secs(),
            filename_format: filename_format.to_string(),
            cover_sync_enabled,
            cover_filename: cover_filename.map(str::to_string),
            remove_unreferenced,
        };

        self.generations
            .insert(generation.id.to_be_bytes(), generation.serialize()?)?;
        self.generations.flush()?;
        writer.next_generation += 1;

        info!(generation = generation.id, "Started sync generation");
        Ok(generation.id)
    }

    /// Get a generation by id
    pub fn generation(&self, id: u64) -> Result<Option<SyncGeneration>> {
        let Some(value) = self.generations.get(id.to_be_bytes())? else {
            return Ok(None);
        };
        let generation = SyncGeneration::deserialize(&value)?;
        if generation.id != id {
            return Err(LedgerError::Corrupt(format!(
                "generation key {id} holds generation {}",
                generation.id
            )));
        }
        Ok(Some(generation))
    }

    /// All generations, oldest first
    pub fn generations(&self) -> Result<Vec<SyncGeneration>> {
        let mut out = Vec::new();
        for item in self.generations.iter() {
            let (_, value) = item?;
            match SyncGeneration::deserialize(&value) {
                Ok(generation) => out.push(generation),
                Err(e) => warn!(error = %e, "Skipping undecodable generation"),
            }
        }
        Ok(out)
    }

    /// Most recent record for exactly this source path
    pub fn latest_record(&self, source: &Path) -> Option<SyncRecord> {
        self.latest.read().get(source).map(|l| l.record.clone())
    }

    /// Every record for this source, in append order
    pub fn history(&self, source: &Path) -> Result<Vec<SyncRecord>> {
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (_, value) = item?;
            match SyncRecord::deserialize(&value) {
                Ok(record) if record.source == source => out.push(record),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Skipping undecodable ledger record"),
            }
        }
        Ok(out)
    }

    /// Durably append one record, returning its sequence number
    pub fn append(&self, record: &SyncRecord) -> Result<u64> {
        let value = record.serialize()?;

        let mut writer = self.writer.lock();
        let seq = writer.next_seq;
        self.records.insert(seq.to_be_bytes(), value)?;

        // Flush to ensure durability
        self.records.flush()?;
        writer.next_seq += 1;

        remember(&mut self.latest.write(), record.clone(), seq);
        self.record_count.fetch_add(1, Ordering::Relaxed);
        drop(writer);

        debug!(
            seq,
            generation = record.sync_generation,
            source = %record.source.display(),
            destination = ?record.destination,
            "Appended ledger record"
        );
        Ok(seq)
    }

    /// Note that a source was encountered, even if no job was emitted for it
    pub fn register_seen(&self, source: &Path) -> Result<()> {
        self.seen
            .insert(path_key(source), &now_secs().to_be_bytes()[..])?;
        Ok(())
    }

    /// Whether a source was ever registered as seen
    pub fn is_seen(&self, source: &Path) -> Result<bool> {
        Ok(self.seen.contains_key(path_key(source))?)
    }

    /// Latest records that still point at an artifact, ordered by source
    pub fn live_artifacts(&self) -> Vec<SyncRecord> {
        let mut out: Vec<SyncRecord> = self
            .latest
            .read()
            .values()
            .filter(|l| !l.record.is_tombstone())
            .map(|l| l.record.clone())
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }

    /// Total number of records
    pub fn record_count(&self) -> u64 {
        self.record_count.load(Ordering::Relaxed)
    }

    /// Number of distinct sources with at least one record
    pub fn source_count(&self) -> usize {
        self.latest.read().len()
    }

    /// Flush all pending writes
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn store_path(root: &Path) -> PathBuf {
    root.join(LEDGER_DIR).join(STORE_NAME)
}

fn open_store(store: &Path) -> Result<Db> {
    let existed = store.exists();
    match sled::open(store) {
        Ok(db) => Ok(db),
        // I/O failures (permissions, lock contention) leave the store alone
        Err(source @ sled::Error::Io(_)) => Err(LedgerError::Unavailable {
            path: store.to_path_buf(),
            source,
        }),
        Err(e) if existed => {
            let quarantine = store.with_file_name(format!("{STORE_NAME}.corrupt-{}", now_secs()));
            warn!(
                store = %store.display(),
                moved_to = %quarantine.display(),
                error = %e,
                "Ledger store is corrupt, starting from an empty history"
            );
            std::fs::rename(store, &quarantine).map_err(|e| LedgerError::Unavailable {
                path: store.to_path_buf(),
                source: sled::Error::Io(e),
            })?;
            sled::open(store).map_err(|source| LedgerError::Unavailable {
                path: store.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(LedgerError::Unavailable {
            path: store.to_path_buf(),
            source,
        }),
    }
}

/// Keep `record` if it is at least as recent as the indexed one
fn remember(latest: &mut HashMap<PathBuf, Latest>, record: SyncRecord, seq: u64) {
    if let Some(current) = latest.get(&record.source) {
        if (current.record.recency(), current.seq) > (record.recency(), seq) {
            return;
        }
    }
    latest.insert(record.source.clone(), Latest { record, seq });
}

fn decode_u64(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

fn path_key(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}
