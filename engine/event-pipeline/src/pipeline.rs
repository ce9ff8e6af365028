//! Pipeline wiring: hand-off channel, accumulator task and writer tracker.
//!
//! [`Pipeline::start`] is called once at startup. It returns the producer
//! side ([`IngestHandle`], cloned into every request handler) and the owner
//! side ([`PipelineHandle`], used once to shut the pipeline down).

use crate::accumulator::BatchAccumulator;
use crate::config::PipelineConfig;
use crate::dead_letter::DeadLetterLog;
use crate::error::{PipelineError, Result};
use crate::event::Event;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::store::EventStore;
use crate::writer::BatchWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Entry point for building a running pipeline
pub struct Pipeline;

impl Pipeline {
    /// Spawn the accumulator and return both ends of the pipeline.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: PipelineConfig,
        store: Arc<dyn EventStore>,
    ) -> Result<(IngestHandle, PipelineHandle)> {
        config.validate().map_err(PipelineError::config)?;

        let dead_letters = match &config.writer.dead_letter_dir {
            Some(dir) => Some(Arc::new(DeadLetterLog::new(dir)?)),
            None => None,
        };

        let stats = Arc::new(PipelineStats::default());
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let writers = TaskTracker::new();
        let shutdown = CancellationToken::new();

        let writer = Arc::new(BatchWriter::new(
            store,
            config.writer.clone(),
            dead_letters,
            stats.clone(),
        ));
        let accumulator = BatchAccumulator::new(
            receiver,
            writer,
            writers.clone(),
            shutdown.clone(),
            config.clone(),
            stats.clone(),
        );
        let accumulator = tokio::spawn(accumulator.run());

        info!(
            channel_capacity = config.channel_capacity,
            flush_interval_ms = config.flush_interval_ms,
            "event pipeline started"
        );

        let ingest =
            IngestHandle { sender, enqueue_timeout: config.enqueue_timeout(), stats: stats.clone() };
        let handle = PipelineHandle { accumulator, writers, shutdown, stats };

        Ok((ingest, handle))
    }
}

/// Producer side of the pipeline
#[derive(Debug, Clone)]
pub struct IngestHandle {
    sender: mpsc::Sender<Event>,
    enqueue_timeout: Option<Duration>,
    stats: Arc<PipelineStats>,
}

impl IngestHandle {
    /// Hand one enriched event to the accumulator.
    ///
    /// Waits while the channel is full: indefinitely, or up to the configured
    /// enqueue timeout.
    pub async fn submit(&self, event: Event) -> Result<()> {
        let sent = match self.enqueue_timeout {
            Some(limit) => match self.sender.send_timeout(event, limit).await {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => {
                    self.stats.record_event_rejected();
                    Err(PipelineError::EnqueueTimeout(limit))
                }
                Err(SendTimeoutError::Closed(_)) => Err(PipelineError::Closed),
            },
            None => self.sender.send(event).await.map_err(|_| PipelineError::Closed),
        };

        if sent.is_ok() {
            self.stats.record_event_received();
            metrics::gauge!("ingest_queue_depth", self.queue_depth() as f64);
        }
        sent
    }

    /// Events waiting in the hand-off channel
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Owner side of the pipeline
#[derive(Debug)]
pub struct PipelineHandle {
    accumulator: JoinHandle<()>,
    writers: TaskTracker,
    shutdown: CancellationToken,
    stats: Arc<PipelineStats>,
}

impl PipelineHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting events, flush what is buffered and wait for every
    /// in-flight write, for at most `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<StatsSnapshot> {
        let PipelineHandle { accumulator, writers, shutdown, stats } = self;

        info!(in_flight_writers = writers.len(), "shutting down event pipeline");
        shutdown.cancel();

        let drained = async {
            if let Err(e) = accumulator.await {
                error!("batch accumulator task failed: {}", e);
            }
            writers.close();
            writers.wait().await;
        };

        tokio::time::timeout(timeout, drained).await.map_err(|_| {
            PipelineError::timeout(format!("writers still running after {timeout:?}"))
        })?;

        let snapshot = stats.snapshot();
        info!(
            events_received = snapshot.events_received,
            events_written = snapshot.events_written,
            batches_written = snapshot.batches_written,
            batches_failed = snapshot.batches_failed,
            events_dead_lettered = snapshot.events_dead_lettered,
            "event pipeline stopped"
        );

        Ok(snapshot)
    }
}
