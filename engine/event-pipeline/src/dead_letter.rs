//! Dead-letter log for batches the store refused.
//!
//! Each failed batch is appended as one JSON line to a per-day file, with
//! enough context to replay it later.

use crate::error::Result;
use crate::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One failed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Accumulator-assigned batch number
    pub batch_id: u64,

    /// When the final attempt failed
    pub failed_at: DateTime<Utc>,

    /// Store that rejected the batch
    pub store: String,

    /// Last error reported by the store
    pub error: String,

    /// The batch, in its original order
    pub events: Vec<Event>,
}

/// Append-only JSON-lines dead-letter log
#[derive(Debug)]
pub struct DeadLetterLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DeadLetterLog {
    /// Open a dead-letter log in `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that records failing at `at` are appended to
    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!("dead-letter-{}.jsonl", at.format("%Y%m%d")))
    }

    /// Append one record and sync it to disk. Returns the file written.
    pub async fn append(&self, record: &DeadLetterRecord) -> Result<PathBuf> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let path = self.path_for(record.failed_at);

        // Concurrent writers must not interleave partial lines
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&line).await?;
        file.sync_data().await?;

        Ok(path)
    }

    /// Read every record from a dead-letter file
    pub async fn read_records(path: &Path) -> Result<Vec<DeadLetterRecord>> {
        let content = fs::read_to_string(path).await?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}
