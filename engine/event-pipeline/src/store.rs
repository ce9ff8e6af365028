//! Store abstraction for batch persistence

use crate::error::{PipelineError, Result};
use crate::event::Event;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Destination for flushed batches
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Create the events table if it does not exist yet
    async fn ensure_schema(&self) -> Result<()>;

    /// Persist one batch as a single bulk insert, in batch order.
    ///
    /// Either every row is committed or none is.
    async fn insert_batch(&self, events: &[Event]) -> Result<()>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Short name used in logs and dead-letter records
    fn name(&self) -> &str;
}

/// In-process store keeping committed batches in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    batches: Mutex<Vec<Vec<Event>>>,
    insert_calls: AtomicUsize,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    schema_ready: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inserts fail
    pub fn fail_next(&self, count: usize) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    /// Make every insert fail until switched off
    pub fn fail_always(&self, enabled: bool) {
        self.inner.fail_always.store(enabled, Ordering::SeqCst);
    }

    /// Committed batches, in commit order
    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.inner.batches.lock().clone()
    }

    /// All committed events, flattened in commit order
    pub fn events(&self) -> Vec<Event> {
        self.inner.batches.lock().iter().flatten().cloned().collect()
    }

    /// Number of insert attempts, failed ones included
    pub fn insert_calls(&self) -> usize {
        self.inner.insert_calls.load(Ordering::SeqCst)
    }

    pub fn schema_ready(&self) -> bool {
        self.inner.schema_ready.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        if self.inner.fail_always.load(Ordering::SeqCst) {
            return true;
        }

        self.inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.inner.schema_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_batch(&self, events: &[Event]) -> Result<()> {
        self.inner.insert_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_failure() {
            return Err(PipelineError::store("injected insert failure"));
        }

        self.inner.batches.lock().push(events.to_vec());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
