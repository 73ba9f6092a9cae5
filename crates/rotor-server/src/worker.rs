//! Worker threads.
//!
//! A worker serves one connection at a time from its own queue. It never
//! looks at another worker's queue.
//!
//! ```text
//! Idle ──pop──▶ Busy ──handler returns──▶ Idle
//!  │
//!  └──termination observed──▶ Draining ──queue emptied──▶ Exited
//! ```

use crate::connection::Connection;
use crate::handler::RequestHandler;
use crate::queue::WorkerQueue;
use crate::shutdown::TerminationFlag;
use rotor_metrics::ServerMetrics;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Draining,
    Exited,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Busy => "busy",
            WorkerState::Draining => "draining",
            WorkerState::Exited => "exited",
        };
        f.write_str(name)
    }
}

pub struct Worker {
    id: usize,
    queue: Arc<WorkerQueue<Connection>>,
    flag: TerminationFlag,
    handler: Arc<dyn RequestHandler>,
    metrics: Arc<ServerMetrics>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<WorkerQueue<Connection>>,
        flag: TerminationFlag,
        handler: Arc<dyn RequestHandler>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            id,
            queue,
            flag,
            handler,
            metrics,
            state: WorkerState::Idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::debug!("Worker {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    /// Starts the worker on a named thread (`rotor-worker-{id}`).
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("rotor-worker-{}", self.id))
            .spawn(move || self.run())
    }

    /// Serves connections until termination, then drains.
    pub fn run(mut self) {
        tracing::debug!("Worker {} started", self.id);

        while let Some(conn) = self.queue.wait_pop(&self.flag) {
            self.transition(WorkerState::Busy);
            self.serve(conn);
            self.transition(WorkerState::Idle);
        }

        self.transition(WorkerState::Draining);
        let drained = self.drain();
        if drained > 0 {
            tracing::info!("Worker {} rejected {} queued connection(s)", self.id, drained);
        }

        self.transition(WorkerState::Exited);
        tracing::debug!("Worker {} exited", self.id);
    }

    fn serve(&self, conn: Connection) {
        let conn_id = conn.id();
        let handler = Arc::clone(&self.handler);
        let id = self.id;

        // A panicking handler has already dropped (and so closed) the connection.
        if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(id, conn))).is_err() {
            tracing::error!("Handler panicked on worker {} serving connection {}", id, conn_id);
        }
        self.metrics.record_completed();
    }

    fn drain(&self) -> usize {
        let drained = self.queue.drain_with(Connection::reject);
        self.metrics.record_drained(drained as u64);
        drained
    }
}
