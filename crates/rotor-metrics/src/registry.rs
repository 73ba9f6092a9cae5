// Copyright 2025 Rotor Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::snapshot::{MetricsSnapshot, WorkerMetrics};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Connection lifecycle counters for one server instance.
///
/// All counters are monotonic and updated with `Relaxed` ordering; readers
/// only need eventually consistent values. The per-worker slice is sized once
/// at construction and never grows, matching the fixed worker pool.
#[derive(Debug)]
pub struct ServerMetrics {
    accepted: AtomicU64,
    completed: AtomicU64,
    drained: AtomicU64,
    aborted: AtomicU64,
    accept_errors: AtomicU64,
    dispatched: Box<[AtomicU64]>,
    start_time: Instant,
}

impl ServerMetrics {
    /// Creates counters for a pool of `workers` workers.
    pub fn new(workers: usize) -> Self {
        Self {
            accepted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            dispatched: (0..workers).map(|_| AtomicU64::new(0)).collect(),
            start_time: Instant::now(),
        }
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that a connection was placed on `worker`'s queue.
    ///
    /// Out-of-range worker indices are ignored.
    pub fn record_dispatched(&self, worker: usize) {
        if let Some(counter) = self.dispatched.get(worker) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a handler call that returned.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` queued connections rejected while a worker drained.
    pub fn record_drained(&self, count: u64) {
        self.drained.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a connection accepted during shutdown that never reached a queue.
    pub fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_count(&self) -> usize {
        self.dispatched.len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            workers: self
                .dispatched
                .iter()
                .enumerate()
                .map(|(id, counter)| WorkerMetrics {
                    id,
                    dispatched: counter.load(Ordering::Relaxed),
                })
                .collect(),
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }
}
