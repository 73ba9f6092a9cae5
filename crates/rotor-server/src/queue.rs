//! Per-worker FIFO with its own lock and wake-up.
//!
//! Each worker owns one [`WorkerQueue`]. The queue, its mutex and its
//! condition variable live together, so no lock is ever shared between
//! workers. The termination flag is always read while the lock is held,
//! which is what lets a push and a drain never race.

use crate::shutdown::TerminationFlag;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

pub struct WorkerQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> WorkerQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    // The deque is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `item` and wakes one waiter, unless termination is raised.
    ///
    /// Returns the item back when the flag is already raised; the caller
    /// then owns it again and must dispose of it.
    pub fn push_unless(&self, item: T, flag: &TerminationFlag) -> Result<(), T> {
        let mut items = self.lock();
        if flag.is_raised() {
            return Err(item);
        }
        items.push_back(item);
        drop(items);

        self.ready.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or termination is raised.
    ///
    /// Returns `None` once the flag is raised, even if items remain; those
    /// are left for [`drain_with`](Self::drain_with).
    pub fn wait_pop(&self, flag: &TerminationFlag) -> Option<T> {
        let mut items = self.lock();
        while items.is_empty() && !flag.is_raised() {
            items = self
                .ready
                .wait(items)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        if flag.is_raised() {
            return None;
        }
        items.pop_front()
    }

    /// Removes every remaining item in FIFO order while holding the lock.
    ///
    /// Returns how many items were passed to `f`.
    pub fn drain_with<F>(&self, mut f: F) -> usize
    where
        F: FnMut(T),
    {
        let mut items = self.lock();
        let mut count = 0;
        while let Some(item) = items.pop_front() {
            f(item);
            count += 1;
        }
        count
    }

    /// Wakes every waiter so it re-checks the termination flag.
    ///
    /// The lock is taken first: a waiter that has just seen the flag down
    /// is then guaranteed to be parked before the notification lands.
    pub fn wake_all(&self) {
        let _items = self.lock();
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for WorkerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
