use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, RotorError};
use crate::wire::Reply;

/// Default timeout for connecting and for each read (15 seconds).
///
/// Long enough to outlast the default ten second reply delay.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Blocking probe client.
///
/// Connects to a rotor server, reads everything the server writes until it
/// closes the connection, and classifies the bytes as a [`Reply`].
///
/// # Example
///
/// ```no_run
/// use rotor_common::{Probe, Reply};
///
/// let probe = Probe::new();
/// let reply = probe.fetch("127.0.0.1:9000").unwrap();
/// assert_eq!(reply, Reply::Hello);
/// ```
#[derive(Debug, Clone)]
pub struct Probe {
    timeout: Duration,
}

impl Probe {
    /// Creates a probe with the default timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the connect and read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connects to a server.
    ///
    /// The address may resolve to several socket addresses; each is tried
    /// in turn until one accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be resolved, every resolved
    /// address refuses the connection, or the read timeout cannot be set.
    pub fn connect(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| RotorError::Connection(format!("Invalid address '{}': {}", addr, e)))?
            .collect();

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .map_err(|e| RotorError::Connection(format!("Failed to set read timeout: {}", e)))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(RotorError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Reads from an already connected stream until the server closes it.
    pub fn read_reply(&self, stream: &mut TcpStream) -> Result<Reply> {
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .map_err(|e| self.map_io_error(e, "reading reply"))?;

        tracing::debug!("Read {} reply bytes", buf.len());
        Ok(Reply::parse(&buf))
    }

    /// Connects and waits for the reply.
    pub fn fetch(&self, addr: &str) -> Result<Reply> {
        let mut stream = self.connect(addr)?;
        self.read_reply(&mut stream)
    }

    fn map_io_error(&self, err: std::io::Error, context: &str) -> RotorError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                RotorError::Timeout(self.timeout.as_millis() as u64)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => {
                RotorError::Connection(format!("{}: connection lost", context))
            }
            _ => RotorError::Io(err),
        }
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new()
    }
}
