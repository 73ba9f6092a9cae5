//! Server lifecycle.
//!
//! A [`Server`] owns the listening socket, the worker pool and the
//! termination flag for one run. Construction binds and starts the pool;
//! [`Server::run`] accepts until termination and returns only after every
//! worker has been joined.

use crate::acceptor::{Acceptor, Listener};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::handler::RequestHandler;
use crate::queue::WorkerQueue;
use crate::shutdown::{ShutdownCoordinator, StopHandle, TerminationFlag};
use crate::worker::Worker;
use rotor_common::{Result, RotorError};
use rotor_metrics::{MetricsSnapshot, ServerMetrics};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};

static INSTANCE: OnceLock<Server> = OnceLock::new();

pub struct Server {
    config: ServerConfig,
    local_addr: SocketAddr,
    coordinator: Arc<ShutdownCoordinator>,
    dispatcher: Mutex<Option<Dispatcher<Connection>>>,
    metrics: Arc<ServerMetrics>,
}

impl Server {
    /// Binds the listener and starts the worker pool.
    ///
    /// # Errors
    ///
    /// - [`RotorError::InvalidConfig`] if the configuration is invalid
    /// - [`RotorError::Socket`] if the socket cannot be created, bound or
    ///   put into listening mode; no worker has been started at that point
    /// - [`RotorError::WorkerSpawn`] if a worker thread cannot be started;
    ///   the workers already running are stopped and joined first
    pub fn bind<H: RequestHandler>(config: ServerConfig, handler: H) -> Result<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let listener = match Listener::bind(addr, config.backlog) {
            Ok(listener) => Arc::new(listener),
            Err(e) => {
                tracing::error!("{}", e);
                return Err(e);
            }
        };
        let local_addr = listener.local_addr();

        let flag = TerminationFlag::new();
        let queues: Arc<[Arc<WorkerQueue<Connection>>]> = (0..config.workers)
            .map(|_| Arc::new(WorkerQueue::new()))
            .collect::<Vec<_>>()
            .into();
        let metrics = Arc::new(ServerMetrics::new(config.workers));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            flag.clone(),
            listener,
            Arc::clone(&queues),
            Arc::clone(&metrics),
        ));

        let handler: Arc<dyn RequestHandler> = Arc::new(handler);
        for (id, queue) in queues.iter().enumerate() {
            let worker = Worker::new(
                id,
                Arc::clone(queue),
                flag.clone(),
                Arc::clone(&handler),
                Arc::clone(&metrics),
            );

            match worker.spawn() {
                Ok(handle) => coordinator.register_worker(handle),
                Err(e) => {
                    tracing::error!("Failed to spawn worker {}: {}", id, e);
                    coordinator.abort_startup();
                    return Err(RotorError::WorkerSpawn(format!("worker {}: {}", id, e)));
                }
            }
        }

        let dispatcher = Dispatcher::new(queues, flag);

        tracing::info!(
            "Server started at {} with {} worker(s), backlog {}",
            local_addr,
            config.workers,
            config.backlog
        );

        Ok(Self {
            config,
            local_addr,
            coordinator,
            dispatcher: Mutex::new(Some(dispatcher)),
            metrics,
        })
    }

    /// Binds the process-wide server.
    ///
    /// Only the first call constructs a server; any later call returns
    /// [`RotorError::AlreadyInstalled`].
    pub fn install<H: RequestHandler>(config: ServerConfig, handler: H) -> Result<&'static Server> {
        if INSTANCE.get().is_some() {
            return Err(RotorError::AlreadyInstalled);
        }

        let server = Server::bind(config, handler)?;
        if let Err(server) = INSTANCE.set(server) {
            server.stop();
            return Err(RotorError::AlreadyInstalled);
        }

        INSTANCE.get().ok_or(RotorError::AlreadyInstalled)
    }

    /// The process-wide server, if one was installed.
    pub fn global() -> Option<&'static Server> {
        INSTANCE.get()
    }

    /// Accepts connections until termination, then completes shutdown.
    ///
    /// Returns once every worker has exited.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::AlreadyRunning`] if `run` was already called.
    pub fn run(&self) -> Result<()> {
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(RotorError::AlreadyRunning)?;

        if let Some(listener) = self.coordinator.listener() {
            if self.coordinator.enter_accept_loop() {
                let acceptor = Acceptor::new(
                    listener,
                    dispatcher,
                    Arc::clone(&self.coordinator),
                    Arc::clone(&self.metrics),
                );
                acceptor.run();
                self.coordinator.exit_accept_loop();
            }
        }

        self.coordinator.shutdown();
        Ok(())
    }

    /// Runs the full shutdown sequence on the calling thread.
    ///
    /// Idempotent; concurrent callers wait for the first to finish.
    pub fn stop(&self) {
        self.coordinator.shutdown();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.coordinator))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    pub fn is_terminated(&self) -> bool {
        self.coordinator.is_complete()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.coordinator.shutdown();
    }
}
