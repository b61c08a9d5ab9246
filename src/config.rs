//! Runtime configuration
//!
//! All settings have defaults and can be overridden through `AGGREGATOR_*`
//! environment variables via [`AggregatorConfig::from_env`].

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AggregatorError, AggregatorResult};

pub const ENV_DATABASE_PATH: &str = "AGGREGATOR_DATABASE_PATH";
pub const ENV_BIND_ADDR: &str = "AGGREGATOR_BIND_ADDR";
pub const ENV_QUEUE_CAPACITY: &str = "AGGREGATOR_QUEUE_CAPACITY";
pub const ENV_MAX_ATTEMPTS: &str = "AGGREGATOR_MAX_ATTEMPTS";
pub const ENV_RETRY_BACKOFF_MS: &str = "AGGREGATOR_RETRY_BACKOFF_MS";
pub const ENV_PERSIST_TIMEOUT_MS: &str = "AGGREGATOR_PERSIST_TIMEOUT_MS";
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "AGGREGATOR_SHUTDOWN_TIMEOUT_MS";
pub const ENV_MAX_CONNECTIONS: &str = "AGGREGATOR_MAX_CONNECTIONS";

/// How the worker treats transient store faults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPolicy {
    /// Persist attempts per item (1 = no retry)
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub backoff: Duration,
    /// Upper bound on a single persist attempt
    pub persist_timeout: Option<Duration>,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(100),
            persist_timeout: None,
        }
    }
}

impl FaultPolicy {
    /// Delay to wait before the given retry (1-based attempt that just failed)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Settings for the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bounded queue size; `None` for an unbounded queue
    pub queue_capacity: Option<usize>,
    pub fault_policy: FaultPolicy,
    /// Bounded wait for the worker to finish its in-flight item on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            fault_policy: FaultPolicy::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level configuration for the aggregator server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// Connection pool size for the store
    pub max_connections: u32,
    pub pipeline: PipelineConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("aggregator.db"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 5,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AggregatorConfig {
    /// Create config with a custom database path
    pub fn new<P: AsRef<Path>>(database_path: P) -> Self {
        Self {
            database_path: database_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.pipeline.queue_capacity = Some(capacity);
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.pipeline.fault_policy = policy;
        self
    }

    /// Load configuration from `AGGREGATOR_*` environment variables
    pub fn from_env() -> AggregatorResult<Self> {
        let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_lookup(&current_dir, |key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Relative database paths are resolved against `base_dir`.
    pub fn from_lookup<F>(base_dir: &Path, lookup: F) -> AggregatorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            let path = PathBuf::from(path);
            config.database_path = if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            };
        } else {
            config.database_path = base_dir.join(&config.database_path);
        }

        if let Some(addr) = parse_var::<SocketAddr, _>(&lookup, ENV_BIND_ADDR)? {
            config.bind_addr = addr;
        }
        if let Some(max) = parse_var::<u32, _>(&lookup, ENV_MAX_CONNECTIONS)? {
            if max == 0 {
                return Err(AggregatorError::config(ENV_MAX_CONNECTIONS, "must be at least 1"));
            }
            config.max_connections = max;
        }

        let pipeline = &mut config.pipeline;
        if let Some(capacity) = parse_var::<usize, _>(&lookup, ENV_QUEUE_CAPACITY)? {
            if capacity == 0 {
                return Err(AggregatorError::config(ENV_QUEUE_CAPACITY, "must be at least 1"));
            }
            pipeline.queue_capacity = Some(capacity);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, ENV_MAX_ATTEMPTS)? {
            if attempts == 0 {
                return Err(AggregatorError::config(ENV_MAX_ATTEMPTS, "must be at least 1"));
            }
            pipeline.fault_policy.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_RETRY_BACKOFF_MS)? {
            pipeline.fault_policy.backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_PERSIST_TIMEOUT_MS)? {
            pipeline.fault_policy.persist_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_SHUTDOWN_TIMEOUT_MS)? {
            pipeline.shutdown_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> AggregatorResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AggregatorError::config(key, format!("'{}': {}", raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AggregatorConfig::from_lookup(Path::new("/srv"), lookup_from(&[])).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/srv/aggregator.db"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.pipeline.queue_capacity, None);
        assert_eq!(config.pipeline.fault_policy.max_attempts, 1);
        assert_eq!(config.pipeline.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = AggregatorConfig::from_lookup(
            Path::new("/srv"),
            lookup_from(&[
                (ENV_DATABASE_PATH, "data/events.db"),
                (ENV_BIND_ADDR, "127.0.0.1:9000"),
                (ENV_QUEUE_CAPACITY, "256"),
                (ENV_MAX_ATTEMPTS, "3"),
                (ENV_RETRY_BACKOFF_MS, "20"),
                (ENV_PERSIST_TIMEOUT_MS, "1500"),
                (ENV_SHUTDOWN_TIMEOUT_MS, "250"),
            ]),
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/srv/data/events.db"));
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.pipeline.queue_capacity, Some(256));
        assert_eq!(config.pipeline.fault_policy.max_attempts, 3);
        assert_eq!(config.pipeline.fault_policy.backoff, Duration::from_millis(20));
        assert_eq!(
            config.pipeline.fault_policy.persist_timeout,
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.pipeline.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_absolute_database_path_kept() {
        let config = AggregatorConfig::from_lookup(
            Path::new("/srv"),
            lookup_from(&[(ENV_DATABASE_PATH, "/var/lib/agg.db")]),
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/agg.db"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AggregatorConfig::from_lookup(
            Path::new("/srv"),
            lookup_from(&[(ENV_QUEUE_CAPACITY, "lots")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ENV_QUEUE_CAPACITY));

        let err = AggregatorConfig::from_lookup(
            Path::new("/srv"),
            lookup_from(&[(ENV_MAX_ATTEMPTS, "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, AggregatorError::Config { .. }));
    }

    #[test]
    fn test_builder() {
        let config = AggregatorConfig::new("/tmp/agg.db")
            .with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 3000)))
            .with_queue_capacity(64)
            .with_fault_policy(FaultPolicy {
                max_attempts: 4,
                ..Default::default()
            });

        assert_eq!(config.database_path, PathBuf::from("/tmp/agg.db"));
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.pipeline.queue_capacity, Some(64));
        assert_eq!(config.pipeline.fault_policy.max_attempts, 4);
    }

    #[test]
    fn test_backoff_scales_with_attempt() {
        let policy = FaultPolicy {
            backoff: Duration::from_millis(10),
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(30));
    }
}
