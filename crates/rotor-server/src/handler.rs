//! Request handler seam.
//!
//! Workers know nothing about what a connection wants. They pop it off their
//! queue and hand it, together with their own index, to a [`RequestHandler`].
//! The handler owns the connection from then on and must close it.

use crate::connection::Connection;
use rotor_common::wire;
use std::time::Duration;

/// Processes one connection on a worker thread.
///
/// Calls are blocking and never interrupted: a handler that does not return
/// keeps its worker busy and holds up shutdown until it does.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, worker: usize, conn: Connection);
}

impl<F> RequestHandler for F
where
    F: Fn(usize, Connection) + Send + Sync + 'static,
{
    fn handle(&self, worker: usize, conn: Connection) {
        self(worker, conn)
    }
}

/// Placeholder handler: waits, says `HELLO\n`, closes.
#[derive(Debug, Clone)]
pub struct HelloHandler {
    reply_delay: Duration,
}

impl Default for HelloHandler {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_secs(10),
        }
    }
}

impl HelloHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn reply_delay(&self) -> Duration {
        self.reply_delay
    }
}

impl RequestHandler for HelloHandler {
    fn handle(&self, worker: usize, mut conn: Connection) {
        tracing::debug!("Worker {} serving connection {}", worker, conn.id());

        std::thread::sleep(self.reply_delay);

        if let Err(e) = conn.send(wire::HELLO) {
            tracing::debug!("Failed to reply to connection {}: {}", conn.id(), e);
        }
        conn.close();
    }
}
