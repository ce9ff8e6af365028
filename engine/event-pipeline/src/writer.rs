//! # Batch Writer
//!
//! Persists one detached batch with bounded retries. A batch that still fails
//! is dead-lettered and dropped; the writer never takes the process down.

use crate::config::WriterConfig;
use crate::dead_letter::{DeadLetterLog, DeadLetterRecord};
use crate::error::Result;
use crate::event::Event;
use crate::stats::PipelineStats;
use crate::store::EventStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Events detached from the accumulator in one flush
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Monotonic per-process batch number
    pub id: u64,
    pub events: Vec<Event>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// What happened to a batch
#[derive(Debug)]
pub enum BatchOutcome {
    /// Committed after `attempts` tries
    Written { attempts: usize },
    /// Gave up and recorded the batch in the dead-letter log
    DeadLettered { path: PathBuf },
    /// Gave up with nowhere to record the batch
    Dropped,
}

/// Writes batches to an [`EventStore`]
pub struct BatchWriter {
    store: Arc<dyn EventStore>,
    config: WriterConfig,
    dead_letters: Option<Arc<DeadLetterLog>>,
    stats: Arc<PipelineStats>,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn EventStore>,
        config: WriterConfig,
        dead_letters: Option<Arc<DeadLetterLog>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self { store, config, dead_letters, stats }
    }

    /// Persist one batch, containing any failure to this batch
    pub async fn write(&self, batch: Batch) -> BatchOutcome {
        match self.insert_with_retry(&batch).await {
            Ok(attempts) => {
                self.stats.record_batch_written(batch.len());
                info!(batch_id = batch.id, events = batch.len(), attempts, "batch written");
                BatchOutcome::Written { attempts }
            }
            Err(e) => {
                self.stats.record_batch_failed();
                error!(
                    batch_id = batch.id,
                    events = batch.len(),
                    store = self.store.name(),
                    error = %e,
                    "batch failed after retries"
                );
                self.dead_letter(batch, e.to_string()).await
            }
        }
    }

    async fn insert_with_retry(&self, batch: &Batch) -> Result<usize> {
        let mut delay = self.config.retry_base_delay();
        let mut attempt = 0;

        loop {
            match self.store.insert_batch(&batch.events).await {
                Ok(()) => return Ok(attempt + 1),
                Err(e) if attempt < self.config.retry_attempts => {
                    attempt += 1;
                    self.stats.record_retry();
                    warn!(
                        batch_id = batch.id,
                        attempt,
                        max_attempts = self.config.retry_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "insert failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.retry_max_delay());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dead_letter(&self, batch: Batch, error: String) -> BatchOutcome {
        let record = DeadLetterRecord {
            batch_id: batch.id,
            failed_at: Utc::now(),
            store: self.store.name().to_string(),
            error,
            events: batch.events,
        };

        let Some(log) = &self.dead_letters else {
            // Last resort: the log line itself carries the batch for replay
            let payload = serde_json::to_string(&record.events).unwrap_or_default();
            error!(batch_id = record.batch_id, events = %payload, "batch dropped, no dead-letter log");
            return BatchOutcome::Dropped;
        };

        match log.append(&record).await {
            Ok(path) => {
                self.stats.record_dead_lettered(record.events.len());
                debug!(batch_id = record.batch_id, path = %path.display(), "batch dead-lettered");
                BatchOutcome::DeadLettered { path }
            }
            Err(e) => {
                let payload = serde_json::to_string(&record.events).unwrap_or_default();
                error!(
                    batch_id = record.batch_id,
                    error = %e,
                    events = %payload,
                    "failed to write dead-letter record, batch dropped"
                );
                BatchOutcome::Dropped
            }
        }
    }
}
