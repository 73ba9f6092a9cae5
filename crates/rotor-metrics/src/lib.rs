//! Rotor Metrics Collection
//!
//! Lock-free counters describing where every accepted connection ended up.
//!
//! # Architecture
//!
//! - [`ServerMetrics`]: atomic counters updated from the acceptor and worker
//!   threads, plus one dispatch counter per worker
//! - [`MetricsSnapshot`]: serializable point-in-time copy of those counters
//!
//! # Accounting
//!
//! Each accepted connection is closed through exactly one path, so once the
//! server has fully shut down:
//!
//! ```text
//! accepted == completed + drained + aborted
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use rotor_metrics::ServerMetrics;
//!
//! let metrics = ServerMetrics::new(2);
//! metrics.record_accepted();
//! metrics.record_dispatched(0);
//! metrics.record_completed();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.accepted, 1);
//! assert_eq!(snapshot.in_flight(), 0);
//! ```

mod registry;
mod snapshot;

pub use registry::ServerMetrics;
pub use snapshot::{MetricsSnapshot, WorkerMetrics};
