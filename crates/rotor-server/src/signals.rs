//! SIGINT / SIGTERM handling.
//!
//! The OS-level handler installed by `signal-hook` only writes to a
//! self-pipe. A dedicated thread reads that pipe and calls
//! [`StopHandle::request`], so no shutdown logic ever runs in signal context.

use crate::shutdown::StopHandle;
use rotor_common::{Result, RotorError};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::thread::{self, JoinHandle};

/// Keeps the signal thread alive. Dropping it unregisters the handlers.
pub struct SignalGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalGuard {
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Signal thread panicked");
            }
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Routes SIGINT and SIGTERM to `stop`.
pub fn install(stop: StopHandle) -> Result<SignalGuard> {
    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| RotorError::Signal(format!("failed to register handlers: {}", e)))?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("rotor-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                let name = match signal {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => "signal",
                };
                tracing::info!("Received {}, shutting down", name);
                stop.request();
            }
        })
        .map_err(|e| RotorError::Signal(format!("failed to spawn signal thread: {}", e)))?;

    Ok(SignalGuard {
        handle,
        thread: Some(thread),
    })
}
