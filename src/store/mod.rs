//! Durable Store for accepted events and their dedup records
//!
//! Two co-located relations live in one SQLite database:
//!
//! ```text
//! dedup_keys        (topic, event_id)  PRIMARY KEY    <- insert-if-absent
//! processed_events  (id, topic, event_id, ...)        <- append-only
//! ```
//!
//! Both rows for an event are written in one transaction, so readers never
//! observe a dedup record without its event or the reverse.

mod schema;
mod sqlite;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{Event, StoredEvent};

pub use sqlite::SqliteDedupStore;

/// Outcome of an insert-if-absent attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Key was new; event stored with this insertion sequence
    Stored { seq: i64 },
    /// Key already present; nothing written
    Duplicate,
}

/// Sizes of the two relations, used to check they never diverge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub events: u64,
    pub dedup_keys: u64,
}

impl StoreCounts {
    pub fn is_consistent(&self) -> bool {
        self.events == self.dedup_keys
    }
}

/// Persistent, deduplicating event store
///
/// `insert_if_absent` must be atomic per key: either both the dedup record
/// and the event are committed, or neither is.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Store the event unless its `(topic, event_id)` was already seen
    async fn insert_if_absent(&self, event: &Event) -> StoreResult<InsertOutcome> {
        self.insert_if_absent_within(event, None).await
    }

    /// Like [`DedupStore::insert_if_absent`], with `limit` bounding the work
    /// before the commit is issued.
    ///
    /// Expiry rolls the attempt back and returns [`crate::error::StoreError::Timeout`]. Once
    /// the commit has been issued it always runs to completion and its result
    /// is returned, so the outcome is never ambiguous.
    async fn insert_if_absent_within(
        &self,
        event: &Event,
        limit: Option<Duration>,
    ) -> StoreResult<InsertOutcome>;

    /// Stored events for a topic in insertion order (empty for unknown topics)
    async fn list_by_topic(&self, topic: &str) -> StoreResult<Vec<StoredEvent>>;

    /// Number of distinct topics among stored events
    async fn topic_count(&self) -> StoreResult<u64>;

    async fn counts(&self) -> StoreResult<StoreCounts>;

    /// Release the underlying connections
    async fn close(&self);
}
