//! Service state management and component initialization

use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use event_gateway::EventGateway;
use event_pipeline::{
    connect_store, DeadLetterLog, EventStore, IngestHandle, Pipeline, PipelineHandle,
    StatsSnapshot,
};

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// Store the batch writers persist to
    pub store: Arc<dyn EventStore>,

    ingest: IngestHandle,
    pipeline: PipelineHandle,
}

impl ServiceState {
    /// Connect the store and start the batching pipeline
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        info!("Connecting {:?} event store...", config.store.kind);
        let store = connect_store(&config.store).await.context("Failed to connect event store")?;

        info!("Starting event pipeline...");
        let (ingest, pipeline) = Pipeline::start(config.pipeline.clone(), store.clone())
            .context("Failed to start event pipeline")?;

        Ok(Self { config, store, ingest, pipeline })
    }

    /// Producer handle, as given to the gateway
    pub fn ingest(&self) -> &IngestHandle {
        &self.ingest
    }

    /// Serve HTTP until `shutdown` resolves, then drain the pipeline.
    ///
    /// The gateway stops first so that no request is accepted after the
    /// final flush.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<StatsSnapshot> {
        let ServiceState { config, store: _, ingest, pipeline } = self;
        let shutdown_timeout = config.service.shutdown_timeout();

        let gateway = EventGateway::new(config.gateway.clone(), ingest);
        let server = match gateway.bind(shutdown) {
            Ok((addr, server)) => {
                info!("Event ingest service is running on {}", addr);
                server
            }
            Err(e) => {
                if let Err(shutdown_err) = pipeline.shutdown(shutdown_timeout).await {
                    error!("Failed to stop event pipeline: {}", shutdown_err);
                }
                return Err(e).context("Failed to start EventGateway");
            }
        };

        server.await;
        info!("EventGateway stopped, draining event pipeline...");

        let stats = pipeline
            .shutdown(shutdown_timeout)
            .await
            .context("Event pipeline did not drain within the shutdown timeout")?;

        info!("Graceful shutdown complete");
        Ok(stats)
    }
}

/// Outcome of re-inserting a dead-letter file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub batches: usize,
    pub events: usize,
    pub failed_batches: usize,
}

/// Re-insert every batch recorded in a dead-letter file.
///
/// A batch that fails again is reported and skipped; the rest still run.
pub async fn replay_dead_letters(store: &dyn EventStore, path: &Path) -> Result<ReplaySummary> {
    let records = DeadLetterLog::read_records(path)
        .await
        .with_context(|| format!("Failed to read dead-letter file: {:?}", path))?;

    info!("Replaying {} dead-lettered batches from {:?}", records.len(), path);

    let mut summary = ReplaySummary::default();
    for record in records {
        match store.insert_batch(&record.events).await {
            Ok(()) => {
                summary.batches += 1;
                summary.events += record.events.len();
                info!(batch_id = record.batch_id, events = record.events.len(), "batch replayed");
            }
            Err(e) => {
                summary.failed_batches += 1;
                warn!(batch_id = record.batch_id, error = %e, "batch replay failed");
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_pipeline::{DeadLetterRecord, Event, MemoryStore, StoreKind};
    use tempfile::TempDir;

    fn record(batch_id: u64, sequences: &[i32]) -> DeadLetterRecord {
        DeadLetterRecord {
            batch_id,
            failed_at: chrono::Utc::now(),
            store: "clickhouse".to_string(),
            error: "connection refused".to_string(),
            events: sequences
                .iter()
                .map(|&sequence| Event { sequence, ..Default::default() })
                .collect(),
        }
    }

    fn test_config(temp_dir: &TempDir) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.store.kind = StoreKind::Memory;
        config.gateway.host = "127.0.0.1".to_string();
        config.gateway.port = 0;
        config.pipeline.writer.dead_letter_dir = Some(temp_dir.path().join("dead-letter"));
        config.metrics.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_run_drains_pipeline_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let state = ServiceState::new(test_config(&temp_dir)).await.unwrap();

        let ingest = state.ingest().clone();
        for sequence in 1..=3 {
            ingest.submit(Event { sequence, ..Default::default() }).await.unwrap();
        }

        let stats = state.run(async {}).await.unwrap();

        assert_eq!(stats.events_received, 3);
        assert_eq!(stats.events_written, 3);
        assert!(ingest.is_closed());
    }

    #[tokio::test]
    async fn test_run_reports_invalid_listen_address() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.gateway.host = "256.0.0.1".to_string();
        let state = ServiceState::new(config).await.unwrap();
        assert!(state.run(async {}).await.is_err());
    }

    #[tokio::test]
    async fn test_replay_reinserts_dead_lettered_batches() {
        let temp_dir = TempDir::new().unwrap();
        let log = DeadLetterLog::new(temp_dir.path()).unwrap();

        log.append(&record(1, &[1, 2])).await.unwrap();
        let path = log.append(&record(2, &[3])).await.unwrap();

        let store = MemoryStore::new();
        let summary = replay_dead_letters(&store, &path).await.unwrap();

        assert_eq!(summary, ReplaySummary { batches: 2, events: 3, failed_batches: 0 });
        let sequences: Vec<i32> = store.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_replay_continues_past_failed_batches() {
        let temp_dir = TempDir::new().unwrap();
        let log = DeadLetterLog::new(temp_dir.path()).unwrap();
        log.append(&record(1, &[1])).await.unwrap();
        let path = log.append(&record(2, &[2])).await.unwrap();

        let store = MemoryStore::new();
        store.fail_next(1);
        let summary = replay_dead_letters(&store, &path).await.unwrap();

        assert_eq!(summary.batches, 1);
        assert_eq!(summary.failed_batches, 1);
    }
}
