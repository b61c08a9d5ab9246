//! Ingestion pipeline
//!
//! This module wires the ingestion queue, the single consumer worker and the
//! shared counters around a [`DedupStore`]:
//!
//! ```text
//! Write Path:
//! ┌──────────┐    ┌──────────────┐    ┌─────────────────┐    ┌──────────────┐
//! │ submit() │───►│ IngestQueue  │───►│ ConsumerWorker  │───►│ DedupStore   │
//! │ received │    │ (FIFO)       │    │ (exactly one)   │    │ insert-if-   │
//! └──────────┘    └──────────────┘    └────────┬────────┘    │ absent       │
//!                                              │             └──────────────┘
//!                                              ▼
//!                                     unique / duplicate / failed
//!
//! Read Path:
//! list_topic() ──► DedupStore          stats() ──► PipelineStats + store + queue
//! ```

mod queue;
mod stats;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{AggregatorError, AggregatorResult, StoreResult};
use crate::store::DedupStore;
use crate::types::{Event, StatsSnapshot, StoredEvent, WorkerState};
use crate::utils::format_uptime;

pub use queue::{channel, IngestQueue, QueueReceiver};
pub use stats::{PipelineCounters, PipelineStats};
pub use worker::{ConsumerWorker, DrainOutcome, PersistOutcome, WorkerHandle};

/// Result of a `submit` call
#[derive(Debug, Default)]
pub struct SubmitReport {
    /// Events placed on the queue
    pub accepted: usize,
    /// Events refused by the queue
    pub rejected: usize,
    /// Why the first refused event was refused
    pub error: Option<AggregatorError>,
}

impl SubmitReport {
    pub fn is_complete(&self) -> bool {
        self.rejected == 0
    }
}

/// Result of `Pipeline::shutdown`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub drain: DrainOutcome,
    /// Items still queued when the worker stopped; the queue is volatile
    pub abandoned: usize,
    pub counters: PipelineCounters,
}

/// The running ingestion pipeline
pub struct Pipeline {
    queue: IngestQueue,
    stats: Arc<PipelineStats>,
    store: Arc<dyn DedupStore>,
    worker: Mutex<Option<WorkerHandle>>,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Create the queue and spawn the worker on the current tokio runtime
    pub fn start(store: Arc<dyn DedupStore>, config: &PipelineConfig) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let (queue, receiver) = channel(config.queue_capacity);
        let (worker, shutdown_tx) = ConsumerWorker::new(
            store.clone(),
            stats.clone(),
            receiver,
            config.fault_policy.clone(),
        );
        let handle = worker.spawn(shutdown_tx);

        info!(
            queue_capacity = ?config.queue_capacity,
            "Ingestion pipeline started"
        );

        Self {
            queue,
            stats,
            store,
            worker: Mutex::new(Some(handle)),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Queue a single event, counting it as received
    pub fn enqueue(&self, event: Event) -> AggregatorResult<()> {
        // Counted before the worker can see it, reverted if refused
        self.stats.record_received();
        self.queue.enqueue(event).map_err(|e| {
            self.stats.revert_received();
            e
        })
    }

    /// Queue events in order, stopping at the first refusal
    pub fn submit<I>(&self, events: I) -> SubmitReport
    where
        I: IntoIterator<Item = Event>,
    {
        let mut report = SubmitReport::default();

        for event in events {
            if report.error.is_some() {
                report.rejected += 1;
                continue;
            }
            match self.enqueue(event) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    report.rejected += 1;
                    report.error = Some(e);
                }
            }
        }

        if let Some(e) = &report.error {
            warn!(
                accepted = report.accepted,
                rejected = report.rejected,
                error = %e,
                "Submission partially rejected"
            );
        }

        report
    }

    /// Stored events for `topic`, oldest first
    pub async fn list_topic(&self, topic: &str) -> StoreResult<Vec<StoredEvent>> {
        self.store.list_by_topic(topic).await
    }

    /// Counters plus store- and queue-derived figures
    pub async fn stats(&self) -> StoreResult<StatsSnapshot> {
        let counters = self.stats.counters();
        let topics_count = self.store.topic_count().await?;
        let uptime = self.stats.uptime();

        Ok(StatsSnapshot {
            uptime: format_uptime(uptime),
            uptime_seconds: uptime.as_secs_f64(),
            received: counters.received,
            unique_processed: counters.unique_processed,
            duplicate_dropped: counters.duplicate_dropped,
            failed: counters.failed,
            topics_count,
            queue_size: self.queue.depth(),
            queue_capacity: self.queue.capacity(),
            worker_state: self.stats.worker_state(),
        })
    }

    pub fn counters(&self) -> PipelineCounters {
        self.stats.counters()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.stats.worker_state()
    }

    pub fn store(&self) -> &Arc<dyn DedupStore> {
        &self.store
    }

    /// Wait until every received item has settled, up to `timeout`
    ///
    /// Returns `false` if items were still outstanding when the time ran out.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.stats.counters().in_flight() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Drain the worker within the configured bound, then close the store
    pub async fn shutdown(&self) -> ShutdownReport {
        let handle = self.worker.lock().take();

        let drain = match handle {
            Some(handle) => handle.shutdown(self.shutdown_timeout).await,
            None => DrainOutcome::AlreadyStopped,
        };

        if drain != DrainOutcome::AlreadyStopped {
            self.store.close().await;
        }

        let report = ShutdownReport {
            drain,
            abandoned: self.queue.depth(),
            counters: self.stats.counters(),
        };

        info!(
            drain = ?report.drain,
            abandoned = report.abandoned,
            received = report.counters.received,
            unique_processed = report.counters.unique_processed,
            duplicate_dropped = report.counters.duplicate_dropped,
            failed = report.counters.failed,
            "Ingestion pipeline shut down"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaultPolicy;
    use crate::store::SqliteDedupStore;
    use serde_json::json;
    use tempfile::TempDir;

    async fn start_pipeline(config: PipelineConfig) -> (Pipeline, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteDedupStore::open(temp_dir.path().join("aggregator.db"), 2)
            .await
            .unwrap();
        (Pipeline::start(Arc::new(store), &config), temp_dir)
    }

    fn event(topic: &str, id: &str) -> Event {
        Event::new(topic, id, "test-suite", json!({"id": id}))
    }

    #[tokio::test]
    async fn test_submit_and_stats() {
        let (pipeline, _temp_dir) = start_pipeline(PipelineConfig::default()).await;

        let report = pipeline.submit(vec![event("t", "a"), event("t", "a"), event("t", "b")]);
        assert_eq!(report.accepted, 3);
        assert!(report.is_complete());

        assert!(pipeline.wait_idle(Duration::from_secs(5)).await);

        let stats = pipeline.stats().await.unwrap();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.unique_processed, 2);
        assert_eq!(stats.duplicate_dropped, 1);
        assert_eq!(stats.topics_count, 1);
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.worker_state, WorkerState::Running);
        assert!(stats.uptime.ends_with(" seconds"));

        let ids: Vec<String> = pipeline
            .list_topic("t")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker_and_closes_queue() {
        let (pipeline, _temp_dir) = start_pipeline(PipelineConfig::default()).await;

        pipeline.submit(vec![event("t", "a")]);
        assert!(pipeline.wait_idle(Duration::from_secs(5)).await);

        let report = pipeline.shutdown().await;
        assert_eq!(report.drain, DrainOutcome::Clean);
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.counters.unique_processed, 1);
        assert_eq!(pipeline.worker_state(), WorkerState::Stopped);

        // Nothing is accepted or counted after shutdown
        let err = pipeline.enqueue(event("t", "b")).unwrap_err();
        assert!(matches!(err, AggregatorError::QueueClosed));
        assert_eq!(pipeline.counters().received, 1);

        let again = pipeline.shutdown().await;
        assert_eq!(again.drain, DrainOutcome::AlreadyStopped);
    }

    #[tokio::test]
    async fn test_fault_policy_is_applied() {
        let config = PipelineConfig {
            fault_policy: FaultPolicy {
                max_attempts: 2,
                backoff: Duration::from_millis(1),
                persist_timeout: None,
            },
            ..Default::default()
        };
        let (pipeline, _temp_dir) = start_pipeline(config).await;

        // A closed store makes every attempt fail
        pipeline.store().close().await;
        pipeline.submit(vec![event("t", "a"), event("t", "b")]);
        assert!(pipeline.wait_idle(Duration::from_secs(5)).await);

        let counters = pipeline.counters();
        assert_eq!(counters.received, 2);
        assert_eq!(counters.failed, 2);
        assert_eq!(counters.unique_processed, 0);
        assert_eq!(pipeline.worker_state(), WorkerState::Running);
    }
}
