//! # Event Pipeline
//!
//! Buffers ingested analytics events in memory and flushes them to ClickHouse
//! as bulk inserts.
//!
//! ## Architecture
//!
//! - **IngestHandle**: producer side, cloned into every request handler
//! - **BatchAccumulator**: single task that owns the current batch and flushes
//!   it on a timer tick or when it reaches the size limit
//! - **BatchWriter**: one tracked task per flushed batch; retries, then
//!   dead-letters failed batches instead of stopping the process
//! - **EventStore**: destination trait, implemented by [`ClickHouseStore`]
//!   and [`MemoryStore`]
//!
//! ## Usage
//!
//! ```rust
//! use event_pipeline::{Event, MemoryStore, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = PipelineConfig::default();
//!     config.writer.dead_letter_dir = None;
//!
//!     let store = MemoryStore::new();
//!     let (ingest, pipeline) = Pipeline::start(config, Arc::new(store.clone()))?;
//!
//!     ingest.submit(Event { sequence: 1, ..Default::default() }).await?;
//!     pipeline.shutdown(Duration::from_secs(5)).await?;
//!
//!     assert_eq!(store.events().len(), 1);
//!     Ok(())
//! }
//! ```

pub mod accumulator;
pub mod clickhouse_store;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod writer;

pub use accumulator::BatchAccumulator;
pub use clickhouse_store::{ClickHouseStore, EventRow};
pub use config::{PipelineConfig, StoreConfig, StoreKind, WriterConfig};
pub use dead_letter::{DeadLetterLog, DeadLetterRecord};
pub use error::{PipelineError, Result};
pub use event::{Event, EventError, LocalDateTime, TIMESTAMP_FORMAT};
pub use pipeline::{IngestHandle, Pipeline, PipelineHandle};
pub use stats::{PipelineStats, StatsSnapshot};
pub use store::{EventStore, MemoryStore};
pub use writer::{Batch, BatchOutcome, BatchWriter};

use std::sync::Arc;

/// Build the store selected by `config`, creating its schema when asked to
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn EventStore>> {
    config.validate().map_err(PipelineError::config)?;

    let store: Arc<dyn EventStore> = match config.kind {
        StoreKind::ClickHouse => Arc::new(ClickHouseStore::new(config.clone())),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };

    if config.create_schema {
        store.ensure_schema().await?;
    }
    store.ping().await?;

    tracing::info!(store = store.name(), "event store ready");
    Ok(store)
}
