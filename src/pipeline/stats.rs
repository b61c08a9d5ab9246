//! Pipeline counters
//!
//! Provides process-wide counters shared by the gateway path, the worker and
//! the read path:
//! - `received`: bumped by the gateway when an item enters the queue
//! - `unique_processed` / `duplicate_dropped` / `failed`: bumped by the worker
//!
//! Uptime, topic count and queue depth are derived when a snapshot is taken.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::types::WorkerState;

/// Copy of the four counters at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicate_dropped: u64,
    pub failed: u64,
}

impl PipelineCounters {
    /// Items with a terminal outcome
    pub fn settled(&self) -> u64 {
        self.unique_processed + self.duplicate_dropped + self.failed
    }

    /// Items accepted but not yet settled
    pub fn in_flight(&self) -> u64 {
        self.received.saturating_sub(self.settled())
    }
}

/// Shared, lock-free counter block
#[derive(Debug)]
pub struct PipelineStats {
    started_at: Instant,
    received: AtomicU64,
    unique_processed: AtomicU64,
    duplicate_dropped: AtomicU64,
    failed: AtomicU64,
    worker_state: AtomicU8,
    /// Set while the worker holds a dequeued item
    in_flight: AtomicBool,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            received: AtomicU64::new(0),
            unique_processed: AtomicU64::new(0),
            duplicate_dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            worker_state: AtomicU8::new(WorkerState::Running.as_u8()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo `record_received` for an item the queue refused
    pub fn revert_received(&self) {
        self.received.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_stored(&self) {
        self.unique_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Read all counters
    ///
    /// Outcome counters are loaded before `received`, so a snapshot never
    /// shows more settled items than received ones.
    pub fn counters(&self) -> PipelineCounters {
        let unique_processed = self.unique_processed.load(Ordering::SeqCst);
        let duplicate_dropped = self.duplicate_dropped.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let received = self.received.load(Ordering::SeqCst);

        PipelineCounters {
            received,
            unique_processed,
            duplicate_dropped,
            failed,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn worker_state(&self) -> WorkerState {
        WorkerState::from_u8(self.worker_state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_worker_state(&self, state: WorkerState) {
        self.worker_state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn begin_in_flight(&self) {
        self.in_flight.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Clear the in-flight flag, returning whether it was set
    ///
    /// Whoever clears the flag owns recording the item's outcome.
    pub(crate) fn take_in_flight(&self) -> bool {
        self.in_flight.swap(false, Ordering::SeqCst)
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
