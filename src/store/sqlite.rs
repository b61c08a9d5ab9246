//! SQLite implementation of the durable store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::schema;
use super::{DedupStore, InsertOutcome, StoreCounts};
use crate::error::{StoreError, StoreResult};
use crate::types::{Event, StoredEvent};

/// SQLite-backed dedup store.
pub struct SqliteDedupStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteDedupStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Uses WAL journaling so topic and stats reads don't block the worker.
    pub async fn open<P: AsRef<Path>>(path: P, max_connections: u32) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
            }
        }

        info!(path = %path.display(), "Opening dedup store");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool, path };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they don't exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(path = %self.path.display(), "Dedup store schema ready");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool closed".to_string()));
        }
        Ok(())
    }

    fn decode_row(row: &SqliteRow) -> StoreResult<StoredEvent> {
        let payload_json: String = row.try_get("payload_json")?;
        let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
        let stored_at: DateTime<Utc> = row.try_get("stored_at")?;

        Ok(StoredEvent {
            seq: row.try_get("id")?,
            topic: row.try_get("topic")?,
            event_id: row.try_get("event_id")?,
            timestamp,
            source: row.try_get("source")?,
            payload: serde_json::from_str(&payload_json)?,
            stored_at,
        })
    }

    /// Claim the dedup key and write the event row, leaving the transaction
    /// open. `None` means the key was already present.
    ///
    /// Dropping the returned transaction (or this future) without commit
    /// rolls it back, so an interrupted attempt leaves neither row behind.
    async fn stage_insert(
        &self,
        event: &Event,
        payload_json: &str,
    ) -> StoreResult<Option<(Transaction<'static, Sqlite>, i64)>> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(schema::INSERT_DEDUP_KEY)
            .bind(&event.topic)
            .bind(&event.event_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let seq = sqlx::query(schema::INSERT_EVENT)
            .bind(&event.topic)
            .bind(&event.event_id)
            .bind(event.timestamp)
            .bind(&event.source)
            .bind(payload_json)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        Ok(Some((tx, seq)))
    }

    async fn count(&self, query: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(query).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn insert_if_absent_within(
        &self,
        event: &Event,
        limit: Option<Duration>,
    ) -> StoreResult<InsertOutcome> {
        self.ensure_open()?;
        let payload_json = serde_json::to_string(&event.payload)?;

        let staged = self.stage_insert(event, &payload_json);
        let staged = match limit {
            Some(limit) => tokio::time::timeout(limit, staged)
                .await
                .map_err(|_| StoreError::Timeout(limit))??,
            None => staged.await?,
        };

        match staged {
            Some((tx, seq)) => {
                // Not cancelled by `limit`: a commit that was issued is awaited
                tx.commit().await?;
                Ok(InsertOutcome::Stored { seq })
            }
            None => Ok(InsertOutcome::Duplicate),
        }
    }

    async fn list_by_topic(&self, topic: &str) -> StoreResult<Vec<StoredEvent>> {
        self.ensure_open()?;
        let rows = sqlx::query(schema::SELECT_BY_TOPIC)
            .bind(topic)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn topic_count(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        self.count(schema::COUNT_TOPICS).await
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        self.ensure_open()?;
        Ok(StoreCounts {
            events: self.count(schema::COUNT_EVENTS).await?,
            dedup_keys: self.count(schema::COUNT_DEDUP_KEYS).await?,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        info!(path = %self.path.display(), "Dedup store closed");
    }
}
