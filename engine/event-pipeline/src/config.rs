//! # Configuration Management
//!
//! Configuration structures for the batching pipeline and its store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of the hand-off channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default pre-sized capacity of a fresh batch
pub const DEFAULT_BATCH_CAPACITY_HINT: usize = 10;

/// Default flush period
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// Default size that forces a flush before the timer fires
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;

/// Batching pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded hand-off channel capacity
    pub channel_capacity: usize,

    /// Initial capacity of each new batch
    pub batch_capacity_hint: usize,

    /// Flush period (milliseconds)
    pub flush_interval_ms: u64,

    /// Batch length that triggers an early flush (0 disables)
    pub max_batch_size: usize,

    /// How long a producer may wait on a full channel (unset blocks forever)
    pub enqueue_timeout_ms: Option<u64>,

    /// Batch writer configuration
    pub writer: WriterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            batch_capacity_hint: DEFAULT_BATCH_CAPACITY_HINT,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            enqueue_timeout_ms: None,
            writer: WriterConfig::default(),
        }
    }
}

/// Batch writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Retries after the first failed insert
    pub retry_attempts: usize,

    /// Initial backoff between retries (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling (milliseconds)
    pub retry_max_delay_ms: u64,

    /// Directory for batches that exhausted their retries
    pub dead_letter_dir: Option<PathBuf>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5000,
            dead_letter_dir: Some(PathBuf::from("./data/dead-letter")),
        }
    }
}

/// Which store implementation backs the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// ClickHouse over HTTP
    ClickHouse,
    /// In-process store, for local runs
    Memory,
}

/// Analytical store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,

    /// ClickHouse HTTP URL
    pub url: String,

    /// Database name
    pub database: String,

    /// Events table name
    pub table: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Create the database and table at startup if absent
    pub create_schema: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::ClickHouse,
            url: "http://127.0.0.1:8123".to_string(),
            database: "sayGames".to_string(),
            table: "events".to_string(),
            username: None,
            password: None,
            create_schema: true,
        }
    }
}

impl PipelineConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn enqueue_timeout(&self) -> Option<Duration> {
        self.enqueue_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be greater than 0".to_string());
        }

        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be greater than 0".to_string());
        }

        if self.writer.retry_max_delay_ms < self.writer.retry_base_delay_ms {
            return Err("retry_max_delay_ms must not be below retry_base_delay_ms".to_string());
        }

        Ok(())
    }
}

impl WriterConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

impl StoreConfig {
    /// Fully qualified table name
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.kind == StoreKind::ClickHouse {
            if self.url.is_empty() {
                return Err("store url must not be empty".to_string());
            }
            if self.database.is_empty() || self.table.is_empty() {
                return Err("store database and table must not be empty".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.batch_capacity_hint, 10);
        assert_eq!(config.flush_interval(), Duration::from_secs(1));
        assert_eq!(config.enqueue_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_validation() {
        let config = PipelineConfig { channel_capacity: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { flush_interval_ms: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.writer.retry_max_delay_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.qualified_table(), "sayGames.events");
        assert!(config.validate().is_ok());

        let config = StoreConfig { url: String::new(), ..Default::default() };
        assert!(config.validate().is_err());

        let config = StoreConfig { kind: StoreKind::Memory, url: String::new(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_kind_names() {
        let kind: StoreKind = serde_json::from_str("\"clickhouse\"").unwrap();
        assert_eq!(kind, StoreKind::ClickHouse);
        let kind: StoreKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, StoreKind::Memory);
    }
}
