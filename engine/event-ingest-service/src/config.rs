//! Service configuration management
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `INGEST_*` environment variables (`__` separates nested keys, for example
//! `INGEST_PIPELINE__FLUSH_INTERVAL_MS=500`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use event_gateway::GatewayConfig;
use event_pipeline::{PipelineConfig, StoreConfig};

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "INGEST";

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "INGEST_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service-level configuration
    pub service: ServiceSettings,

    /// Batching pipeline configuration
    pub pipeline: PipelineConfig,

    /// HTTP gateway configuration
    pub gateway: GatewayConfig,

    /// Analytical store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    pub enabled: bool,

    /// Exporter bind host
    pub host: String,

    /// Exporter port
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, host: "0.0.0.0".to_string(), port: 9090 }
    }
}

impl ServiceSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Load configuration from an optional file and the process environment.
///
/// Without an explicit path, `INGEST_CONFIG` names the file if set.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

    load_config_with_env(path.as_deref(), env_source())
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Layer defaults, file and the given environment source, then validate
pub fn load_config_with_env(path: Option<&Path>, env: Environment) -> Result<ServiceConfig> {
    let defaults =
        Config::try_from(&ServiceConfig::default()).context("Failed to encode default configuration")?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    let config: ServiceConfig = builder
        .add_source(env)
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    // Validate log level
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    // Validate metrics port
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    if config.service.shutdown_timeout_secs == 0 {
        return Err(anyhow::anyhow!("shutdown_timeout_secs must be greater than 0"));
    }

    config.pipeline.validate().map_err(|e| anyhow::anyhow!("Invalid pipeline configuration: {e}"))?;
    config.gateway.validate().map_err(|e| anyhow::anyhow!("Invalid gateway configuration: {e}"))?;
    config.store.validate().map_err(|e| anyhow::anyhow!("Invalid store configuration: {e}"))?;

    Ok(())
}

/// Save configuration to a TOML file
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to encode configuration")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write configuration file: {:?}", path))?;
    Ok(())
}
