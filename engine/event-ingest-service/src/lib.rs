//! Event Ingest Production Service Library
//!
//! Configuration loading, logging and metrics setup, component wiring and
//! graceful shutdown for the analytics event ingest service.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod exporter;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use exporter::install_exporter;
pub use logging::initialize_logging;
pub use service::{replay_dead_letters, ReplaySummary, ServiceState};
pub use signals::setup_signal_handlers;

/// Load configuration from files and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
