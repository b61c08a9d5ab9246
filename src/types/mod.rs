//! Data types for the event aggregator
//!
//! This module contains the core data structures shared by the store, the
//! pipeline and the HTTP boundary.

mod event;
mod stats;

pub use event::{Event, EventKey, StoredEvent};
pub use stats::{StatsSnapshot, WorkerState};
