//! Listening socket and the accept loop.

use crate::connection::Connection;
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::shutdown::{ShutdownCoordinator, TerminationFlag};
use rotor_common::{Result, RotorError};
use rotor_metrics::ServerMetrics;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pause between failed `accept` calls while the server is still running.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Timeout for the loopback connection used to unblock `accept`.
const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// IPv4 listening socket.
///
/// The socket is shared between the acceptor and the shutdown coordinator.
/// The coordinator never closes it while an `accept` may be in progress; it
/// shuts down the read side instead, which makes the pending `accept` fail.
#[derive(Debug)]
pub struct Listener {
    socket: Socket,
    local_addr: SocketAddr,
    next_id: AtomicU64,
    read_shut: AtomicBool,
}

impl Listener {
    /// Creates, binds and starts listening with `SO_REUSEADDR` set.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::Socket`] if socket creation, bind or listen fails.
    pub fn bind(addr: SocketAddr, backlog: i32) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| RotorError::Socket(format!("unable to create socket: {}", e)))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| RotorError::Socket(format!("unable to set SO_REUSEADDR: {}", e)))?;

        socket
            .bind(&addr.into())
            .map_err(|e| RotorError::Socket(format!("unable to bind {}: {}", addr, e)))?;

        socket
            .listen(backlog)
            .map_err(|e| RotorError::Socket(format!("unable to listen on {}: {}", addr, e)))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| RotorError::Socket(format!("unable to read local address: {}", e)))?
            .as_socket()
            .ok_or_else(|| RotorError::Socket("listener has a non-IP local address".to_string()))?;

        Ok(Self {
            socket,
            local_addr,
            next_id: AtomicU64::new(0),
            read_shut: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Blocks until a peer connects.
    pub fn accept(&self) -> io::Result<Connection> {
        let (socket, peer) = self.socket.accept()?;
        let stream: TcpStream = socket.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Connection::new(id, stream, peer.as_socket()))
    }

    /// Makes a blocked or future `accept` return an error.
    ///
    /// On Linux, shutting down the read side of a listening socket wakes the
    /// pending `accept`. Where the platform refuses, a throwaway loopback
    /// connection is made instead so the acceptor gets to re-check the
    /// termination flag.
    ///
    /// Only the first call does anything; it returns `true`.
    pub fn shutdown_read(&self) -> bool {
        if self.read_shut.swap(true, Ordering::SeqCst) {
            return false;
        }

        match self.socket.shutdown(Shutdown::Read) {
            Ok(()) => tracing::debug!("Listener read side shut down"),
            Err(e) => {
                tracing::debug!("Listener shutdown refused ({}), waking accept by connecting", e);
                self.wake_with_connect();
            }
        }
        true
    }

    fn wake_with_connect(&self) {
        let mut target = self.local_addr;
        if target.ip().is_unspecified() {
            target.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        if let Err(e) = TcpStream::connect_timeout(&target, WAKE_CONNECT_TIMEOUT) {
            tracing::debug!("Wake-up connection to {} failed: {}", target, e);
        }
    }
}

/// Accepts connections and hands them to the dispatcher.
pub struct Acceptor {
    listener: Arc<Listener>,
    dispatcher: Dispatcher<Connection>,
    flag: TerminationFlag,
    coordinator: Arc<ShutdownCoordinator>,
    metrics: Arc<ServerMetrics>,
}

impl Acceptor {
    pub fn new(
        listener: Arc<Listener>,
        dispatcher: Dispatcher<Connection>,
        coordinator: Arc<ShutdownCoordinator>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let flag = coordinator.flag().clone();
        Self {
            listener,
            dispatcher,
            flag,
            coordinator,
            metrics,
        }
    }

    /// Runs until termination is raised and `accept` fails.
    ///
    /// Accept errors are not classified: while the flag is down every error
    /// is treated as transient and retried.
    pub fn run(mut self) {
        while !self.flag.is_raised() {
            match self.listener.accept() {
                Ok(conn) => {
                    self.metrics.record_accepted();
                    tracing::debug!("Incoming connection {} from {:?}", conn.id(), conn.peer());
                    self.dispatch(conn);
                }
                Err(e) => {
                    if self.flag.is_raised() {
                        break;
                    }
                    self.metrics.record_accept_error();
                    tracing::debug!("accept failed, retrying: {}", e);
                    std::thread::sleep(ACCEPT_RETRY_DELAY);
                }
            }
        }

        tracing::debug!("Accept loop stopped");
    }

    fn dispatch(&mut self, conn: Connection) {
        match self.dispatcher.dispatch(conn) {
            Dispatch::Queued { worker } => self.metrics.record_dispatched(worker),
            Dispatch::Rejected(conn) => self.coordinator.abort_unqueued(conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WorkerQueue;
    use std::thread;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = Listener::bind(loopback(), 16).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn test_bind_conflict_is_socket_error() {
        let taken = Listener::bind(loopback(), 16).unwrap();
        let result = Listener::bind(taken.local_addr(), 16);

        assert!(matches!(result, Err(RotorError::Socket(_))));
    }

    #[test]
    fn test_accept_assigns_sequential_ids() {
        let listener = Listener::bind(loopback(), 16).unwrap();
        let addr = listener.local_addr();

        let _a = TcpStream::connect(addr).unwrap();
        let _b = TcpStream::connect(addr).unwrap();

        assert_eq!(listener.accept().unwrap().id(), 0);
        assert_eq!(listener.accept().unwrap().id(), 1);
    }

    #[test]
    fn test_shutdown_read_unblocks_accept() {
        let listener = Arc::new(Listener::bind(loopback(), 16).unwrap());

        let acceptor = {
            let listener = Arc::clone(&listener);
            thread::spawn(move || listener.accept().map(|conn| conn.id()))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(listener.shutdown_read());

        assert!(acceptor.join().unwrap().is_err());
    }

    #[test]
    fn test_shutdown_read_only_once() {
        let listener = Listener::bind(loopback(), 16).unwrap();

        assert!(listener.shutdown_read());
        assert!(!listener.shutdown_read());
        assert!(listener.accept().is_err());
    }

    struct Fixture {
        listener: Arc<Listener>,
        coordinator: Arc<ShutdownCoordinator>,
        metrics: Arc<ServerMetrics>,
    }

    impl Fixture {
        fn new() -> Self {
            let listener = Arc::new(Listener::bind(loopback(), 16).unwrap());
            let queues: Vec<_> = (0..2).map(|_| Arc::new(WorkerQueue::new())).collect();
            let metrics = Arc::new(ServerMetrics::new(2));
            let coordinator = Arc::new(ShutdownCoordinator::new(
                TerminationFlag::new(),
                Arc::clone(&listener),
                queues.into(),
                Arc::clone(&metrics),
            ));
            Self {
                listener,
                coordinator,
                metrics,
            }
        }

        /// Runs an acceptor whose dispatcher watches `dispatch_flag`.
        fn spawn(&self, dispatch_flag: TerminationFlag) -> thread::JoinHandle<()> {
            let queues: Vec<_> = (0..2).map(|_| Arc::new(WorkerQueue::new())).collect();
            let acceptor = Acceptor::new(
                Arc::clone(&self.listener),
                Dispatcher::new(queues.into(), dispatch_flag),
                Arc::clone(&self.coordinator),
                Arc::clone(&self.metrics),
            );
            thread::spawn(move || acceptor.run())
        }

        fn stop(&self, acceptor: thread::JoinHandle<()>) {
            self.coordinator.request();
            acceptor.join().unwrap();
            self.coordinator.abort_startup();
        }
    }

    #[test]
    fn test_accept_errors_are_retried_until_termination() {
        let fixture = Fixture::new();
        let acceptor = fixture.spawn(TerminationFlag::new());

        // Accept now fails on every call, but the flag is still down.
        fixture.listener.shutdown_read();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while fixture.metrics.snapshot().accept_errors < 3 {
            assert!(std::time::Instant::now() < deadline, "accept errors were not retried");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!acceptor.is_finished());

        fixture.stop(acceptor);
        assert_eq!(fixture.metrics.snapshot().accepted, 0);
    }

    #[test]
    fn test_rejected_dispatch_is_aborted() {
        use std::io::Read;

        let fixture = Fixture::new();
        let refusing = TerminationFlag::new();
        refusing.raise();
        let acceptor = fixture.spawn(refusing);

        let mut client = TcpStream::connect(fixture.listener.local_addr()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"UNEXPECTEDLY CLOSED\n");

        fixture.stop(acceptor);
        let snapshot = fixture.metrics.snapshot();
        assert_eq!(snapshot.accepted, 1);
        assert_eq!(snapshot.aborted, 1);
        assert!(snapshot.is_balanced());
    }
}
