// Copyright 2025 Rotor Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// Dispatch count for a single worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerMetrics {
    pub id: usize,
    pub dispatched: u64,
}

/// Point-in-time copy of [`ServerMetrics`](crate::ServerMetrics).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Connections returned by `accept`.
    pub accepted: u64,
    /// Connections closed by the request handler.
    pub completed: u64,
    /// Queued connections rejected by a draining worker.
    pub drained: u64,
    /// Connections accepted during shutdown that never reached a queue.
    pub aborted: u64,
    pub accept_errors: u64,
    pub workers: Vec<WorkerMetrics>,
    pub uptime_ms: u64,
}

impl MetricsSnapshot {
    /// Connections accepted but not yet closed through any path.
    pub fn in_flight(&self) -> u64 {
        self.accepted
            .saturating_sub(self.completed + self.drained + self.aborted)
    }

    /// True when every accepted connection has been closed exactly once.
    pub fn is_balanced(&self) -> bool {
        self.accepted == self.completed + self.drained + self.aborted
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
