use rotor_common::wire;
use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// One accepted peer.
///
/// A `Connection` is owned by exactly one party at a time: the acceptor,
/// then a worker queue, then the worker that popped it. Every way of
/// finishing with it ([`close`](Self::close), [`reject`](Self::reject))
/// consumes it, so it cannot be closed twice.
pub struct Connection {
    id: u64,
    peer: Option<SocketAddr>,
    stream: TcpStream,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        Self { id, peer, stream }
    }

    /// Acceptance sequence number, starting at 0.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Gives the handler direct access to the socket for reading.
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Writes all of `bytes` and flushes.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// Closes the connection. Errors from the peer side are ignored.
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            tracing::debug!("Connection {} shutdown failed: {}", self.id, e);
        }
    }

    /// Tells the peer it will not be served, then closes.
    pub fn reject(mut self) {
        if let Err(e) = self.send(wire::UNEXPECTEDLY_CLOSED) {
            tracing::debug!("Failed to notify connection {}: {}", self.id, e);
        }
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}
