//! Worker bookkeeping for the execution phase

use crate::job::JobOutcome;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts live workers so a canceller can wait for all of them to finish
#[derive(Default)]
pub(crate) struct WorkerGroup {
    active: Mutex<usize>,
    idle: Condvar,
}

impl WorkerGroup {
    /// Register one worker; it counts as active until the guard drops
    pub fn enter(&self) -> ActiveWorker<'_> {
        *self.active.lock() += 1;
        ActiveWorker { group: self }
    }

    pub fn active(&self) -> usize {
        *self.active.lock()
    }

    /// Block until no worker is active
    pub fn wait_idle(&self) {
        let mut active = self.active.lock();
        while *active > 0 {
            self.idle.wait(&mut active);
        }
    }
}

pub(crate) struct ActiveWorker<'a> {
    group: &'a WorkerGroup,
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        let mut active = self.group.active.lock();
        *active -= 1;
        if *active == 0 {
            self.group.idle.notify_all();
        }
    }
}

/// Outcome counters shared by the workers of one run
#[derive(Default)]
pub(crate) struct ExecutionStats {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    aborted: AtomicUsize,
}

impl ExecutionStats {
    pub fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Succeeded => &self.succeeded,
            JobOutcome::Failed => &self.failed,
            JobOutcome::Aborted => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> ExecutionReport {
        ExecutionReport {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Job outcomes of one execution phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl ExecutionReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.aborted
    }
}
