//! # Batch Accumulator
//!
//! Sole consumer of the hand-off channel. Owns the in-progress batch and
//! decides when it is flushed: on every timer tick with a non-empty batch,
//! and early once the batch reaches `max_batch_size`.

use crate::config::PipelineConfig;
use crate::event::Event;
use crate::stats::PipelineStats;
use crate::writer::{Batch, BatchWriter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Aggregation loop between producers and batch writers
pub struct BatchAccumulator {
    receiver: mpsc::Receiver<Event>,
    writer: Arc<BatchWriter>,
    writers: TaskTracker,
    shutdown: CancellationToken,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    batch: Vec<Event>,
    last_batch_id: u64,
}

impl BatchAccumulator {
    pub fn new(
        receiver: mpsc::Receiver<Event>,
        writer: Arc<BatchWriter>,
        writers: TaskTracker,
        shutdown: CancellationToken,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let batch = Vec::with_capacity(config.batch_capacity_hint);

        Self { receiver, writer, writers, shutdown, config, stats, batch, last_batch_id: 0 }
    }

    /// Run until shutdown is requested or every producer is gone.
    ///
    /// On exit the remaining events are flushed and the writer tracker is
    /// closed; in-flight writes keep running and can be awaited on it.
    pub async fn run(mut self) {
        let period = self.config.flush_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            flush_interval_ms = self.config.flush_interval_ms,
            max_batch_size = self.config.max_batch_size,
            "batch accumulator started"
        );

        loop {
            tokio::select! {
                received = self.receiver.recv() => {
                    match received {
                        Some(event) => self.push(event),
                        None => {
                            info!("hand-off channel closed");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    debug!(events = self.batch.len(), "flush tick");
                    self.flush();
                }
                _ = self.shutdown.cancelled() => {
                    self.drain().await;
                    break;
                }
            }
        }

        self.flush();
        self.writers.close();

        info!(batches = self.last_batch_id, "batch accumulator stopped");
    }

    fn push(&mut self, event: Event) {
        self.batch.push(event);

        if self.config.max_batch_size > 0 && self.batch.len() >= self.config.max_batch_size {
            debug!(events = self.batch.len(), "batch reached size limit");
            self.flush();
        }
    }

    /// Stop accepting events and pull in everything already queued
    async fn drain(&mut self) {
        self.receiver.close();

        let mut drained = 0usize;
        while let Some(event) = self.receiver.recv().await {
            self.push(event);
            drained += 1;
        }

        info!(drained, "shutdown requested, hand-off channel drained");
    }

    /// Detach the current batch and hand it to a tracked writer task
    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let events =
            std::mem::replace(&mut self.batch, Vec::with_capacity(self.config.batch_capacity_hint));
        self.last_batch_id += 1;
        let batch = Batch { id: self.last_batch_id, events };

        debug!(batch_id = batch.id, events = batch.len(), "flushing batch");
        self.stats.record_flush(batch.len());

        let writer = Arc::clone(&self.writer);
        self.writers.spawn(async move {
            writer.write(batch).await;
        });
    }
}
