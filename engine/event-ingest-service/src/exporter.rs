//! Prometheus exporter for the `metrics` facade

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::MetricsConfig;

/// Install the global recorder and its scrape endpoint.
///
/// Must be called once, from within the tokio runtime.
pub fn install_exporter(config: &MetricsConfig) -> Result<Option<SocketAddr>> {
    if !config.enabled {
        info!("Metrics exporter disabled");
        return Ok(None);
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid metrics address {}:{}", config.host, config.port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    describe_metrics();
    info!("Metrics exporter listening on http://{}/metrics", addr);

    Ok(Some(addr))
}

fn describe_metrics() {
    describe_counter!("ingest_events_received_total", "Events accepted onto the hand-off channel");
    describe_counter!("ingest_events_rejected_total", "Events rejected because the channel stayed full");
    describe_counter!("ingest_batches_flushed_total", "Batches detached from the accumulator");
    describe_counter!("ingest_batches_written_total", "Batches committed to the store");
    describe_counter!("ingest_events_written_total", "Events committed to the store");
    describe_counter!("ingest_write_retries_total", "Insert attempts that were retried");
    describe_counter!("ingest_batches_failed_total", "Batches that exhausted their retries");
    describe_counter!("ingest_events_dead_lettered_total", "Events written to the dead-letter log");
    describe_counter!("ingest_http_errors_total", "Error replies sent by the gateway, by code");
    describe_gauge!("ingest_queue_depth", "Events waiting in the hand-off channel");
    describe_histogram!("ingest_batch_size", "Events per flushed batch");
}
