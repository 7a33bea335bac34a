//! Bounded-time artwork lookup on top of a callback-style provider

use crate::source::Track;
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of one artwork lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverOutcome {
    /// Artwork file to mirror
    Found(PathBuf),
    NotFound,
    /// The provider did not answer in time; a late answer is ignored
    TimedOut,
}

#[derive(Default)]
struct Slot {
    responded: bool,
    timed_out: bool,
    result: Option<PathBuf>,
}

/// Result cell shared by one waiter and one responder
///
/// Whichever side gets the lock first with `responded == false` decides the
/// outcome. The other side becomes a no-op.
#[derive(Default)]
pub struct CoverRequest {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl CoverRequest {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver the provider's answer
    ///
    /// Returns `false` if an answer was already delivered or the waiter gave up.
    pub fn respond(&self, result: Option<PathBuf>) -> bool {
        let mut slot = self.slot.lock();
        if slot.responded || slot.timed_out {
            return false;
        }
        slot.responded = true;
        slot.result = result;
        drop(slot);
        self.ready.notify_all();
        true
    }

    /// Block until answered or until `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> CoverOutcome {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();

        while !slot.responded {
            if self.ready.wait_until(&mut slot, deadline).timed_out() && !slot.responded {
                slot.timed_out = true;
                return CoverOutcome::TimedOut;
            }
        }

        match slot.result.clone() {
            Some(path) => CoverOutcome::Found(path),
            None => CoverOutcome::NotFound,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.slot.lock().timed_out
    }

    pub fn responded(&self) -> bool {
        self.slot.lock().responded
    }
}

/// One-shot reply handle given to an [`ArtworkProvider`]
///
/// Dropping it unanswered counts as "not found".
pub struct ArtworkReply {
    request: Arc<CoverRequest>,
}

impl ArtworkReply {
    pub fn new(request: Arc<CoverRequest>) -> Self {
        Self { request }
    }

    pub fn found(self, path: impl Into<PathBuf>) -> bool {
        self.request.respond(Some(path.into()))
    }

    pub fn not_found(self) -> bool {
        self.request.respond(None)
    }
}

impl Drop for ArtworkReply {
    fn drop(&mut self) {
        self.request.respond(None);
    }
}

/// Host artwork lookup
///
/// Implementations may answer inline or from another thread, at any time.
pub trait ArtworkProvider: Send + Sync {
    fn request(&self, track: &Track, reply: ArtworkReply);
}

/// Issues one lookup at a time and waits for it with a timeout
pub struct CoverResolver {
    provider: Arc<dyn ArtworkProvider>,
    timeout: Duration,
}

impl CoverResolver {
    pub fn new(provider: Arc<dyn ArtworkProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Look up artwork for the directory `track` represents
    pub fn lookup(&self, track: &Track) -> CoverOutcome {
        let request = CoverRequest::new();
        self.provider
            .request(track, ArtworkReply::new(Arc::clone(&request)));

        let outcome = request.wait(self.timeout);
        match &outcome {
            CoverOutcome::TimedOut => debug!(
                track = %track.path.display(),
                timeout_ms = self.timeout.as_millis() as u64,
                "Artwork lookup timed out"
            ),
            CoverOutcome::NotFound => debug!(track = %track.path.display(), "No artwork found"),
            CoverOutcome::Found(path) => {
                debug!(track = %track.path.display(), art = %path.display(), "Found artwork")
            }
        }
        outcome
    }
}
