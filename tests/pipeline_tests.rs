//! Integration tests for the ingestion pipeline and the SQLite dedup store

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use event_aggregator::config::PipelineConfig;
use event_aggregator::pipeline::DrainOutcome;
use event_aggregator::{
    AggregatorError, DedupStore, Event, Pipeline, SqliteDedupStore, WorkerState,
};

const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

async fn open_store(temp_dir: &TempDir) -> Arc<SqliteDedupStore> {
    Arc::new(
        SqliteDedupStore::open(temp_dir.path().join("aggregator.db"), 4)
            .await
            .unwrap(),
    )
}

async fn setup_pipeline(config: PipelineConfig) -> (Pipeline, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir).await;
    (Pipeline::start(store, &config), temp_dir)
}

fn event(topic: &str, id: &str) -> Event {
    Event::new(topic, id, "integration", json!({"id": id}))
}

#[tokio::test]
async fn test_duplicate_within_one_submission() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;

    pipeline.submit(vec![event("t", "a"), event("t", "a"), event("t", "b")]);
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.unique_processed, 2);
    assert_eq!(stats.duplicate_dropped, 1);
    assert_eq!(stats.topics_count, 1);

    let events = pipeline.list_topic("t").await.unwrap();
    let ids: Vec<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_batch_with_repeated_keys() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;

    // 100 distinct events, then 20 repeats of the first 20
    let mut batch: Vec<Event> = (0..100).map(|i| event("batch", &format!("e-{}", i))).collect();
    batch.extend((0..20).map(|i| event("batch", &format!("e-{}", i))));

    let report = pipeline.submit(batch);
    assert_eq!(report.accepted, 120);
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let counters = pipeline.counters();
    assert_eq!(counters.received, 120);
    assert_eq!(counters.unique_processed, 100);
    assert_eq!(counters.duplicate_dropped, 20);
    assert_eq!(counters.failed, 0);
    assert_eq!(pipeline.list_topic("batch").await.unwrap().len(), 100);
}

#[tokio::test]
async fn test_same_key_submitted_many_times() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;

    for _ in 0..25 {
        pipeline.enqueue(event("orders", "order-1")).unwrap();
    }
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let counters = pipeline.counters();
    assert_eq!(counters.unique_processed, 1);
    assert_eq!(counters.duplicate_dropped, 24);
    assert_eq!(pipeline.list_topic("orders").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;
    let pipeline = Arc::new(pipeline);

    // 8 producers, each submitting the same 50 identities
    let tasks = (0..8).map(|producer| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let events: Vec<Event> = (0..50)
                .map(|i| {
                    Event::new("shared", format!("k-{}", i), format!("producer-{}", producer), json!({}))
                })
                .collect();
            pipeline.submit(events)
        })
    });

    for report in futures::future::join_all(tasks).await {
        assert!(report.unwrap().is_complete());
    }
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let counters = pipeline.counters();
    assert_eq!(counters.received, 400);
    assert_eq!(counters.unique_processed, 50);
    assert_eq!(counters.duplicate_dropped, 350);

    let counts = pipeline.store().counts().await.unwrap();
    assert_eq!(counts.events, 50);
    assert!(counts.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_identities_all_stored() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;
    let pipeline = Arc::new(pipeline);

    // 8 producers, 25 identities each, no overlap
    let tasks = (0..8).map(|producer| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let events: Vec<Event> = (0..25)
                .map(|i| event("fan-in", &format!("p{}-e{}", producer, i)))
                .collect();
            pipeline.submit(events)
        })
    });

    for report in futures::future::join_all(tasks).await {
        assert_eq!(report.unwrap().accepted, 25);
    }
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let counters = pipeline.counters();
    assert_eq!(counters.received, 200);
    assert_eq!(counters.unique_processed, 200);
    assert_eq!(counters.duplicate_dropped, 0);

    let stored = pipeline.list_topic("fan-in").await.unwrap();
    assert_eq!(stored.len(), 200);
    let ids: std::collections::HashSet<&str> = stored.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids.len(), 200);
    for producer in 0..8 {
        for i in 0..25 {
            assert!(ids.contains(format!("p{}-e{}", producer, i).as_str()));
        }
    }
}

#[tokio::test]
async fn test_empty_payload_round_trip() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;

    let timestamp = "2025-10-16T10:00:00.123Z".parse().unwrap();
    let submitted = Event::new("t", "empty", "integration", json!({})).with_timestamp(timestamp);
    pipeline.enqueue(submitted.clone()).unwrap();
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let stored = pipeline.list_topic("t").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].payload, json!({}));
    assert_eq!(stored[0].timestamp, timestamp);
    assert_eq!(stored[0].clone().into_event(), submitted);
}

#[tokio::test]
async fn test_unknown_topic_is_empty() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;

    pipeline.enqueue(event("known", "a")).unwrap();
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    assert!(pipeline.list_topic("unknown").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dedup_survives_restart() {
    let temp_dir = TempDir::new().unwrap();

    let first = Pipeline::start(open_store(&temp_dir).await, &PipelineConfig::default());
    first.submit(vec![event("t", "a"), event("t", "b")]);
    assert!(first.wait_idle(IDLE_TIMEOUT).await);
    let report = first.shutdown().await;
    assert_eq!(report.drain, DrainOutcome::Clean);
    assert_eq!(report.counters.unique_processed, 2);

    // Counters start over, the dedup table does not
    let second = Pipeline::start(open_store(&temp_dir).await, &PipelineConfig::default());
    second.submit(vec![event("t", "a"), event("t", "c")]);
    assert!(second.wait_idle(IDLE_TIMEOUT).await);

    let counters = second.counters();
    assert_eq!(counters.received, 2);
    assert_eq!(counters.unique_processed, 1);
    assert_eq!(counters.duplicate_dropped, 1);

    let ids: Vec<String> = second
        .list_topic("t")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    second.shutdown().await;
}

#[tokio::test]
async fn test_bounded_queue_rejects_overflow() {
    let config = PipelineConfig {
        queue_capacity: Some(2),
        ..Default::default()
    };
    let (pipeline, _temp_dir) = setup_pipeline(config).await;

    // The worker cannot run until this task yields
    let report = pipeline.submit((0..5).map(|i| event("t", &format!("e-{}", i))));
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 3);
    assert!(matches!(report.error, Some(AggregatorError::QueueFull { capacity: 2 })));

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.queue_capacity, Some(2));

    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);
    assert_eq!(pipeline.counters().unique_processed, 2);
    assert_eq!(pipeline.queue_depth(), 0);
}

#[tokio::test]
async fn test_counters_settle_after_shutdown() {
    let (pipeline, _temp_dir) = setup_pipeline(PipelineConfig::default()).await;

    pipeline.submit((0..30).map(|i| event(&format!("topic-{}", i % 3), &format!("e-{}", i % 10))));
    assert!(pipeline.wait_idle(IDLE_TIMEOUT).await);

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.topics_count, 3);
    assert!(stats.is_drained());

    let report = pipeline.shutdown().await;
    let counters = report.counters;
    assert_eq!(
        counters.received,
        counters.unique_processed + counters.duplicate_dropped + counters.failed
    );
    assert_eq!(pipeline.worker_state(), WorkerState::Stopped);
}
