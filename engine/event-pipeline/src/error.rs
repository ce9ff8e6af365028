//! Error types for the event pipeline

use crate::event::EventError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur in the event pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// ClickHouse client errors (connection, insert, commit)
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    /// I/O errors (dead-letter files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed event payloads
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store-level failures not raised by a client library
    #[error("Store error: {0}")]
    Store(String),

    /// The hand-off channel no longer accepts events
    #[error("pipeline is shutting down")]
    Closed,

    /// The hand-off channel stayed full for the whole enqueue timeout
    #[error("hand-off channel full for {0:?}")]
    EnqueueTimeout(Duration),

    /// Timeout errors
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl PipelineError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
