//! Round-robin assignment of accepted connections to worker queues.

use crate::queue::WorkerQueue;
use crate::shutdown::TerminationFlag;
use std::sync::Arc;

/// Cyclic cursor over `0..size`.
///
/// The cursor is only ever advanced by the acceptor thread, so it needs no
/// synchronization of its own.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    next: usize,
    size: usize,
}

impl RoundRobin {
    /// Creates a cursor over `size` slots. A size of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        Self {
            next: 0,
            size: size.max(1),
        }
    }

    /// Returns the current slot and advances, wrapping to 0 at `size`.
    pub fn next(&mut self) -> usize {
        let current = self.next;
        self.next += 1;
        if self.next == self.size {
            self.next = 0;
        }
        current
    }

    /// Slot the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> usize {
        self.next
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Outcome of handing one item to the pool.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch<T> {
    /// The item is now owned by `worker`'s queue.
    Queued { worker: usize },
    /// Termination was raised; the caller owns the item again.
    Rejected(T),
}

/// Pushes items onto worker queues in strict rotation.
///
/// There is no load awareness: a slow worker keeps receiving its share and
/// builds up a backlog while the others sit idle.
pub struct Dispatcher<T> {
    queues: Arc<[Arc<WorkerQueue<T>>]>,
    cursor: RoundRobin,
    flag: TerminationFlag,
}

impl<T> Dispatcher<T> {
    pub fn new(queues: Arc<[Arc<WorkerQueue<T>>]>, flag: TerminationFlag) -> Self {
        let cursor = RoundRobin::new(queues.len());
        Self {
            queues,
            cursor,
            flag,
        }
    }

    /// Assigns `item` to the next worker in rotation.
    ///
    /// The cursor advances even when the item is rejected, so the i-th
    /// dispatched item always targets worker `i % pool_size`. An empty pool
    /// rejects everything.
    pub fn dispatch(&mut self, item: T) -> Dispatch<T> {
        let worker = self.cursor.next();
        let Some(queue) = self.queues.get(worker) else {
            return Dispatch::Rejected(item);
        };
        match queue.push_unless(item, &self.flag) {
            Ok(()) => Dispatch::Queued { worker },
            Err(item) => Dispatch::Rejected(item),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.queues.len()
    }
}
