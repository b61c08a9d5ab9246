//! Event Aggregator
//!
//! An idempotent event-aggregation sink: producers submit structured events,
//! which are deduplicated by `(topic, eventId)`, persisted once, and exposed
//! through per-topic listing and aggregate counters.
//!
//! # Features
//!
//! - **Exactly-once storage**: insert-if-absent over a durable dedup table
//! - **Decoupled ingestion**: producers enqueue, one worker persists
//! - **Bounded or unbounded queue**: rejection is reported, never silent
//! - **Fault policy**: optional bounded retry and per-attempt timeout
//! - **Two-phase shutdown**: drain the in-flight item, then release the store
//!
//! # Modules
//!
//! - `types`: Core data structures (Event, StoredEvent, StatsSnapshot)
//! - `store`: Durable dedup store (SQLite)
//! - `pipeline`: Ingestion queue, consumer worker and counters
//! - `api`: HTTP submission gateway and read endpoints
//! - `config`: Environment-driven configuration
//! - `error`: Error types
//! - `utils`: Logging bootstrap and formatting helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use event_aggregator::config::PipelineConfig;
//! use event_aggregator::store::SqliteDedupStore;
//! use event_aggregator::{Event, Pipeline};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteDedupStore::open("aggregator.db", 5).await?;
//! let pipeline = Pipeline::start(Arc::new(store), &PipelineConfig::default());
//!
//! pipeline.submit(vec![Event::new("orders", "order-1", "shop", serde_json::json!({}))]);
//! let stats = pipeline.stats().await?;
//! println!("received {}", stats.received);
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{AggregatorConfig, FaultPolicy, PipelineConfig};
pub use error::{AggregatorError, AggregatorResult, StoreError, StoreResult};
pub use pipeline::{Pipeline, ShutdownReport, SubmitReport};
pub use store::{DedupStore, InsertOutcome, SqliteDedupStore};
pub use types::{Event, StatsSnapshot, StoredEvent, WorkerState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
