//! SQL schema for the durable store

pub(super) const CREATE_PROCESSED_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS processed_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    event_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    stored_at TEXT NOT NULL
)"#;

pub(super) const CREATE_PROCESSED_EVENTS_TOPIC_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_processed_events_topic
    ON processed_events (topic, id)"#;

pub(super) const CREATE_DEDUP_KEYS: &str = r#"
CREATE TABLE IF NOT EXISTS dedup_keys (
    topic TEXT NOT NULL,
    event_id TEXT NOT NULL,
    PRIMARY KEY (topic, event_id)
)"#;

pub(super) const INSERT_DEDUP_KEY: &str = r#"
INSERT INTO dedup_keys (topic, event_id) VALUES (?, ?)
ON CONFLICT (topic, event_id) DO NOTHING"#;

pub(super) const INSERT_EVENT: &str = r#"
INSERT INTO processed_events (topic, event_id, timestamp, source, payload_json, stored_at)
VALUES (?, ?, ?, ?, ?, ?)"#;

pub(super) const SELECT_BY_TOPIC: &str = r#"
SELECT id, topic, event_id, timestamp, source, payload_json, stored_at
FROM processed_events
WHERE topic = ?
ORDER BY id ASC"#;

pub(super) const COUNT_TOPICS: &str = "SELECT COUNT(DISTINCT topic) FROM processed_events";

pub(super) const COUNT_EVENTS: &str = "SELECT COUNT(*) FROM processed_events";

pub(super) const COUNT_DEDUP_KEYS: &str = "SELECT COUNT(*) FROM dedup_keys";

/// DDL statements applied in order by `init_schema`
pub(super) const MIGRATIONS: &[&str] = &[
    CREATE_PROCESSED_EVENTS,
    CREATE_PROCESSED_EVENTS_TOPIC_INDEX,
    CREATE_DEDUP_KEYS,
];
