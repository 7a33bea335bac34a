//! Blocking, cancellable FIFO shared by one producer and many workers

use crate::job::Job;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Work that can be told to stop before or while it runs
pub trait Abortable {
    fn abort(&mut self);
}

impl Abortable for Job {
    fn abort(&mut self) {
        Job::abort(self);
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    open: bool,
}

/// FIFO with blocking [`pop`](JobQueue::pop)
///
/// A new queue is closed: pushes are ignored until [`open`](JobQueue::open).
/// Closing lets workers drain what is left; cancelling discards it.
pub struct JobQueue<T = Job> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T: Abortable> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Abortable> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                open: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Accept pushes again
    pub fn open(&self) {
        self.inner.lock().open = true;
    }

    /// Stop accepting pushes; pending items stay poppable
    pub fn close(&self) {
        self.inner.lock().open = false;
        self.available.notify_all();
    }

    /// Close, abort and drop every pending item, and wake all poppers
    ///
    /// Returns the number of discarded items.
    pub fn cancel(&self) -> usize {
        let drained: Vec<T> = {
            let mut inner = self.inner.lock();
            inner.open = false;
            inner.items.drain(..).collect()
        };
        self.available.notify_all();

        let count = drained.len();
        for mut item in drained {
            item.abort();
        }
        count
    }

    /// Enqueue `item`; returns `false` and drops it if the queue is not open
    pub fn push(&self, item: T) -> bool {
        self.push_with(item, |_| {})
    }

    /// Like [`push`](JobQueue::push), calling `accepted` once the item is
    /// known to be queued and before any worker can pop it
    ///
    /// `accepted` runs under the queue lock and must not touch this queue.
    pub fn push_with(&self, item: T, accepted: impl FnOnce(&T)) -> bool {
        let mut inner = self.inner.lock();
        if !inner.open {
            return false;
        }
        accepted(&item);
        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Next item, blocking until one arrives
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if !inner.open {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }
}
