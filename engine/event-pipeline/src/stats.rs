//! Counters collected by the pipeline
//!
//! Every counter is kept locally for snapshots and mirrored to the `metrics`
//! facade so an installed exporter can scrape it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Events accepted onto the hand-off channel
    pub events_received: u64,

    /// Events rejected because the channel stayed full
    pub events_rejected: u64,

    /// Batches detached from the accumulator
    pub batches_flushed: u64,

    /// Batches committed to the store
    pub batches_written: u64,

    /// Events committed to the store
    pub events_written: u64,

    /// Insert attempts that were retried
    pub write_retries: u64,

    /// Batches that exhausted their retries
    pub batches_failed: u64,

    /// Events written to the dead-letter log
    pub events_dead_lettered: u64,
}

/// Live pipeline counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    events_received: AtomicU64,
    events_rejected: AtomicU64,
    batches_flushed: AtomicU64,
    batches_written: AtomicU64,
    events_written: AtomicU64,
    write_retries: AtomicU64,
    batches_failed: AtomicU64,
    events_dead_lettered: AtomicU64,
}

impl PipelineStats {
    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_events_received_total", 1);
    }

    pub fn record_event_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_events_rejected_total", 1);
    }

    pub fn record_flush(&self, events: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_batches_flushed_total", 1);
        metrics::histogram!("ingest_batch_size", events as f64);
    }

    pub fn record_batch_written(&self, events: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.events_written.fetch_add(events as u64, Ordering::Relaxed);
        metrics::counter!("ingest_batches_written_total", 1);
        metrics::counter!("ingest_events_written_total", events as u64);
    }

    pub fn record_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_write_retries_total", 1);
    }

    pub fn record_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingest_batches_failed_total", 1);
    }

    pub fn record_dead_lettered(&self, events: usize) {
        self.events_dead_lettered.fetch_add(events as u64, Ordering::Relaxed);
        metrics::counter!("ingest_events_dead_lettered_total", events as u64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            events_dead_lettered: self.events_dead_lettered.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_recorded_counts() {
        let stats = PipelineStats::default();
        stats.record_event_received();
        stats.record_event_received();
        stats.record_flush(2);
        stats.record_batch_written(2);
        stats.record_retry();
        stats.record_batch_failed();
        stats.record_dead_lettered(5);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.batches_flushed, 1);
        assert_eq!(snapshot.batches_written, 1);
        assert_eq!(snapshot.events_written, 2);
        assert_eq!(snapshot.write_retries, 1);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.events_dead_lettered, 5);
        assert_eq!(snapshot.events_rejected, 0);
    }
}
