//! Aggregate statistics snapshot returned by the read path

use serde::{Deserialize, Serialize};

/// Lifecycle state of the consumer worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Pulling and persisting items
    Running,
    /// Shutdown requested; finishing the in-flight item only
    Draining,
    /// Terminal
    Stopped,
}

impl WorkerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            WorkerState::Running => 0,
            WorkerState::Draining => 1,
            WorkerState::Stopped => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Running => write!(f, "running"),
            WorkerState::Draining => write!(f, "draining"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Human-readable uptime, e.g. `"12.34 seconds"`
    pub uptime: String,
    pub uptime_seconds: f64,
    /// Items accepted into the queue
    pub received: u64,
    /// Items that won the dedup race and were stored
    pub unique_processed: u64,
    /// Items that lost the dedup race
    pub duplicate_dropped: u64,
    /// Items lost to transient store faults
    pub failed: u64,
    /// Distinct topics among stored events
    pub topics_count: u64,
    /// Items currently waiting in the queue
    pub queue_size: usize,
    /// `None` when the queue is unbounded
    pub queue_capacity: Option<usize>,
    pub worker_state: WorkerState,
}

impl StatsSnapshot {
    /// Items that reached a terminal outcome
    pub fn settled(&self) -> u64 {
        self.unique_processed + self.duplicate_dropped + self.failed
    }

    /// True once every received item has a terminal outcome
    pub fn is_drained(&self) -> bool {
        self.queue_size == 0 && self.settled() == self.received
    }
}
