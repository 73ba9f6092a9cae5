//! Fixed replies written to peers.
//!
//! The server never speaks a protocol. Every accepted connection receives
//! exactly one of these lines before the server closes it.

/// Sent after a connection has been processed normally.
pub const HELLO: &[u8] = b"HELLO\n";

/// Sent to connections the server gives up on during shutdown.
pub const UNEXPECTEDLY_CLOSED: &[u8] = b"UNEXPECTEDLY CLOSED\n";

/// A reply as observed by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Hello,
    UnexpectedlyClosed,
    /// Anything else, including an empty read when the server closed
    /// without writing.
    Other(Vec<u8>),
}

impl Reply {
    /// Classifies the full byte stream a peer read before EOF.
    pub fn parse(bytes: &[u8]) -> Self {
        match bytes {
            HELLO => Reply::Hello,
            UNEXPECTEDLY_CLOSED => Reply::UnexpectedlyClosed,
            other => Reply::Other(other.to_vec()),
        }
    }

    /// Returns the bytes this reply corresponds to on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Reply::Hello => HELLO,
            Reply::UnexpectedlyClosed => UNEXPECTEDLY_CLOSED,
            Reply::Other(bytes) => bytes,
        }
    }
}
