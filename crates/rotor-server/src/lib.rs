//! Rotor Server
//!
//! A blocking TCP acceptor that spreads accepted connections over a fixed
//! pool of worker threads in strict round-robin order, with a graceful,
//! signal-triggered shutdown.
//!
//! # Architecture
//!
//! ```text
//! accept ──▶ Dispatcher ──i % W──▶ WorkerQueue[w] ──▶ Worker[w] ──▶ RequestHandler
//!                                        ▲
//!            ShutdownCoordinator ────────┘ raise flag, wake, join
//! ```
//!
//! - [`acceptor`]: listening socket and accept loop
//! - [`dispatcher`]: round-robin assignment
//! - [`queue`]: per-worker FIFO with its own lock and condition variable
//! - [`worker`]: per-thread serve loop and drain
//! - [`shutdown`]: termination flag and the ordered shutdown sequence
//! - [`signals`]: SIGINT / SIGTERM routing
//! - [`server`]: lifecycle owner of all of the above
//!
//! All I/O is blocking; there is no event loop.
//!
//! # Limitations
//!
//! A handler call is never interrupted. Shutdown waits for every in-flight
//! handler to return, without a timeout.
//!
//! # Example
//!
//! ```no_run
//! use rotor_server::{HelloHandler, Server, ServerConfig};
//!
//! let config = ServerConfig::new().with_port(9000).with_workers(2);
//! let server = Server::install(config, HelloHandler::new()).unwrap();
//! let _signals = rotor_server::signals::install(server.stop_handle()).unwrap();
//! server.run().unwrap();
//! ```

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod signals;
pub mod worker;

pub use config::ServerConfig;
pub use connection::Connection;
pub use handler::{HelloHandler, RequestHandler};
pub use server::Server;
pub use shutdown::{StopHandle, TerminationFlag};
