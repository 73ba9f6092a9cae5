//! Construction-time server parameters.
//!
//! Everything here is supplied once at startup and never changes while the
//! server runs. The worker pool and the listen backlog are independent: the
//! backlog bounds connections the kernel holds before `accept`, the pool
//! bounds how many are processed at once.

use rotor_common::{Result, RotorError};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Server configuration.
///
/// # Example
///
/// ```
/// use rotor_server::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_address("127.0.0.1")
///     .with_port(9000)
///     .with_workers(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IPv4 address to bind, as text.
    pub address: String,
    /// TCP port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Number of worker threads in the fixed pool.
    pub workers: usize,
    /// Listen backlog passed to the kernel.
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 9000,
            workers: 2,
            backlog: 1024,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::InvalidConfig`] if:
    /// - The address is not a dotted-quad IPv4 address
    /// - The worker pool is empty
    /// - The backlog is not positive
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.workers == 0 {
            return Err(RotorError::InvalidConfig(
                "worker pool must contain at least one worker".to_string(),
            ));
        }

        if self.backlog < 1 {
            return Err(RotorError::InvalidConfig(format!(
                "backlog must be positive (got {})",
                self.backlog
            )));
        }

        Ok(())
    }

    /// Resolves the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: Ipv4Addr = self.address.parse().map_err(|e| {
            RotorError::InvalidConfig(format!("invalid IPv4 address '{}': {}", self.address, e))
        })?;
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, self.port)))
    }
}
