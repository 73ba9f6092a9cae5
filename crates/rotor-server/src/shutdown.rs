//! Coordinated shutdown.
//!
//! Shutdown is split in two. [`ShutdownCoordinator::request`] is the minimal
//! step a signal path may take: raise the termination flag and unblock the
//! acceptor. [`ShutdownCoordinator::shutdown`] is the full sequence and runs
//! on an ordinary thread:
//!
//! 1. raise the termination flag
//! 2. shut down the listener's read side
//! 3. wait for the accept loop to exit; connections it accepted but could
//!    not queue are rejected through
//!    [`abort_unqueued`](ShutdownCoordinator::abort_unqueued) before it does
//! 4. wake every worker
//! 5. join every worker
//! 6. release the listener
//!
//! Joining has no timeout. A handler that never returns blocks step 5
//! forever.

use crate::acceptor::Listener;
use crate::connection::Connection;
use crate::queue::WorkerQueue;
use rotor_metrics::ServerMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-wide "stop now" bit.
///
/// Written once per run (false to true) and read by the acceptor and every
/// worker. `SeqCst` on both sides.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns `true` only for the call that raised it.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ShutdownCoordinator {
    flag: TerminationFlag,
    listener: Mutex<Option<Arc<Listener>>>,
    queues: Arc<[Arc<WorkerQueue<Connection>>]>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<ServerMetrics>,
    started: AtomicBool,
    accepting: Mutex<bool>,
    accept_stopped: Condvar,
    complete: Mutex<bool>,
    completed: Condvar,
}

impl ShutdownCoordinator {
    pub fn new(
        flag: TerminationFlag,
        listener: Arc<Listener>,
        queues: Arc<[Arc<WorkerQueue<Connection>>]>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let pool_size = queues.len();
        Self {
            flag,
            listener: Mutex::new(Some(listener)),
            queues,
            workers: Mutex::new(Vec::with_capacity(pool_size)),
            metrics,
            started: AtomicBool::new(false),
            accepting: Mutex::new(false),
            accept_stopped: Condvar::new(),
            complete: Mutex::new(false),
            completed: Condvar::new(),
        }
    }

    pub fn flag(&self) -> &TerminationFlag {
        &self.flag
    }

    /// Tracks a running worker so shutdown can join it.
    ///
    /// Handles must be registered in worker-index order.
    pub fn register_worker(&self, handle: JoinHandle<()>) {
        lock(&self.workers).push(handle);
    }

    /// The listener, unless shutdown has already released it.
    pub fn listener(&self) -> Option<Arc<Listener>> {
        lock(&self.listener).clone()
    }

    /// Raises the flag and unblocks the acceptor. Nothing else.
    ///
    /// Safe to call any number of times from any thread.
    pub fn request(&self) {
        if self.flag.raise() {
            tracing::info!("Shutdown requested");
        }
        if let Some(listener) = self.listener() {
            listener.shutdown_read();
        }
    }

    /// Runs the full shutdown sequence once.
    ///
    /// Concurrent and repeated callers block until the first call has
    /// finished, then return without repeating any step. Must not be called
    /// from a worker thread's handler: that worker cannot be joined until the
    /// handler returns.
    pub fn shutdown(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            self.wait_complete();
            return;
        }

        tracing::info!("Server is shutting down...");

        self.flag.raise();

        if let Some(listener) = self.listener() {
            listener.shutdown_read();
        }

        self.wait_accept_loop();
        self.wake_workers();
        self.join_workers();

        lock(&self.listener).take();

        let snapshot = self.metrics.snapshot();
        match snapshot.to_json() {
            Ok(json) => tracing::info!("Final metrics: {}", json),
            Err(e) => tracing::warn!("Failed to serialize final metrics: {}", e),
        }
        tracing::info!("Server was terminated");

        self.mark_complete();
    }

    /// Tears down a partially started server.
    ///
    /// Used when startup fails after the listener exists but before the whole
    /// pool is running. Only the workers that were actually registered are
    /// woken and joined.
    pub fn abort_startup(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            self.wait_complete();
            return;
        }

        let started = lock(&self.workers).len();
        tracing::warn!(
            "Aborting startup with {} of {} worker(s) running",
            started,
            self.queues.len()
        );

        self.flag.raise();
        self.wake_workers();
        self.join_workers();
        lock(&self.listener).take();

        self.mark_complete();
    }

    /// Marks the accept loop as running.
    ///
    /// Returns `false` once termination is raised; the caller must then not
    /// start accepting. Every `true` must be paired with
    /// [`exit_accept_loop`](Self::exit_accept_loop).
    pub fn enter_accept_loop(&self) -> bool {
        let mut accepting = lock(&self.accepting);
        if self.flag.is_raised() {
            return false;
        }
        *accepting = true;
        true
    }

    /// Marks the accept loop as finished and releases a waiting shutdown.
    pub fn exit_accept_loop(&self) {
        *lock(&self.accepting) = false;
        self.accept_stopped.notify_all();
    }

    fn wait_accept_loop(&self) {
        let mut accepting = lock(&self.accepting);
        while *accepting {
            accepting = self
                .accept_stopped
                .wait(accepting)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Rejects a connection that was accepted but never queued.
    pub fn abort_unqueued(&self, conn: Connection) {
        tracing::debug!("Rejecting connection {} accepted during shutdown", conn.id());
        conn.reject();
        self.metrics.record_aborted();
    }

    pub fn is_complete(&self) -> bool {
        *lock(&self.complete)
    }

    /// Blocks until a shutdown (or startup abort) has finished.
    pub fn wait_complete(&self) {
        let mut complete = lock(&self.complete);
        while !*complete {
            complete = self
                .completed
                .wait(complete)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn mark_complete(&self) {
        *lock(&self.complete) = true;
        self.completed.notify_all();
    }

    fn wake_workers(&self) {
        for queue in self.queues.iter() {
            queue.wake_all();
        }
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut *lock(&self.workers));
        let current = thread::current().id();

        for (id, handle) in handles.into_iter().enumerate() {
            if handle.thread().id() == current {
                tracing::warn!("Shutdown invoked from worker {}; not joining itself", id);
                continue;
            }

            if handle.join().is_err() {
                // The worker died without draining; finish the job for it.
                tracing::error!("Worker {} terminated abnormally", id);
                if let Some(queue) = self.queues.get(id) {
                    let drained = queue.drain_with(Connection::reject);
                    self.metrics.record_drained(drained as u64);
                }
            }
        }
    }
}

/// Handle for stopping a server from another thread.
#[derive(Clone)]
pub struct StopHandle {
    coordinator: Arc<ShutdownCoordinator>,
}

impl StopHandle {
    pub fn new(coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Minimal stop request; the thread blocked in `Server::run` finishes
    /// the shutdown.
    pub fn request(&self) {
        self.coordinator.request();
    }

    /// Full shutdown on the calling thread.
    pub fn stop(&self) {
        self.coordinator.shutdown();
    }

    pub fn is_complete(&self) -> bool {
        self.coordinator.is_complete()
    }
}
