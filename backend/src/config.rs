//! Configuration management for the stock ledger engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{HealthStatus, MetricThresholds};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// External inventory API configuration
    pub external: ExternalConfig,

    pub ledger: LedgerConfig,

    pub sync: SyncConfig,

    pub conflicts: ConflictConfig,

    pub health: HealthConfig,

    pub archival: ArchivalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExternalConfig {
    /// API root, e.g. `https://www.zohoapis.com/inventory/v1`
    pub base_url: String,

    /// Organization every request is scoped to
    pub organization_id: String,

    /// Bearer token
    pub access_token: String,

    /// Location whose zones back the delivery agents' bins
    pub delivery_location_id: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Random extra delay as a fraction of the backoff, 0.0 to 1.0
    pub jitter_factor: f64,

    pub page_size: u32,

    /// Upper bound on pages followed for one listing
    pub max_pages: u32,

    /// Lifetime of cached zone and bin listings
    pub cache_ttl_secs: u64,
}

impl ExternalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub default_low_stock_threshold: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// A lease older than this is considered abandoned
    pub lease_timeout_secs: u64,
}

impl SyncConfig {
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConflictConfig {
    /// Stock divergence value at which a mismatch becomes critical
    pub critical_value_threshold: Decimal,

    /// Unit gap at which a mismatch becomes high severity
    pub high_quantity_threshold: i64,
}

/// Healthy, warning and unhealthy boundaries for one metric
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ThresholdConfig {
    pub healthy: f64,
    pub warning: f64,
    pub unhealthy: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    /// Rolling window for the sync success rate
    pub window_hours: i64,

    /// Poll interval of continuous monitoring
    pub interval_secs: u64,

    /// Recovery runs when overall status is at or past this level
    pub alert_threshold: String,

    pub success_rate: ThresholdConfig,
    pub open_conflicts: ThresholdConfig,
    pub queue_backlog: ThresholdConfig,
    pub memory_mb: ThresholdConfig,
    pub latency_ms: ThresholdConfig,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn alert_status(&self) -> AppResult<HealthStatus> {
        self.alert_threshold
            .parse()
            .map_err(|e: String| AppError::Configuration(format!("health.alert_threshold: {}", e)))
    }
}

/// Per-check thresholds resolved from [`HealthConfig`]
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub success_rate: MetricThresholds,
    pub open_conflicts: MetricThresholds,
    pub queue_backlog: MetricThresholds,
    pub memory_mb: MetricThresholds,
    pub latency_ms: MetricThresholds,
}

impl From<&HealthConfig> for HealthThresholds {
    fn from(cfg: &HealthConfig) -> Self {
        let higher = |t: ThresholdConfig| MetricThresholds::higher_is_better(t.healthy, t.warning, t.unhealthy);
        let lower = |t: ThresholdConfig| MetricThresholds::lower_is_better(t.healthy, t.warning, t.unhealthy);
        Self {
            success_rate: higher(cfg.success_rate),
            open_conflicts: lower(cfg.open_conflicts),
            queue_backlog: lower(cfg.queue_backlog),
            memory_mb: lower(cfg.memory_mb),
            latency_ms: lower(cfg.latency_ms),
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            success_rate: MetricThresholds::higher_is_better(95.0, 80.0, 50.0),
            open_conflicts: MetricThresholds::lower_is_better(0.0, 5.0, 20.0),
            queue_backlog: MetricThresholds::lower_is_better(10.0, 50.0, 200.0),
            memory_mb: MetricThresholds::lower_is_better(256.0, 512.0, 1024.0),
            latency_ms: MetricThresholds::lower_is_better(1000.0, 3000.0, 10000.0),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchivalConfig {
    /// Rows flagged per transaction
    pub batch_size: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("external.base_url", "https://www.zohoapis.com/inventory/v1")?
            .set_default("external.timeout_secs", 15)?
            .set_default("external.max_retries", 3)?
            .set_default("external.base_delay_ms", 500)?
            .set_default("external.max_delay_ms", 30_000)?
            .set_default("external.jitter_factor", 0.25)?
            .set_default("external.page_size", 200)?
            .set_default("external.max_pages", 500)?
            .set_default("external.cache_ttl_secs", 300)?
            .set_default("ledger.default_low_stock_threshold", 10)?
            .set_default("sync.lease_timeout_secs", 600)?
            .set_default("conflicts.critical_value_threshold", "50000")?
            .set_default("conflicts.high_quantity_threshold", 10)?
            .set_default("health.window_hours", 24)?
            .set_default("health.interval_secs", 60)?
            .set_default("health.alert_threshold", "warning")?
            .set_default("health.success_rate.healthy", 95.0)?
            .set_default("health.success_rate.warning", 80.0)?
            .set_default("health.success_rate.unhealthy", 50.0)?
            .set_default("health.open_conflicts.healthy", 0.0)?
            .set_default("health.open_conflicts.warning", 5.0)?
            .set_default("health.open_conflicts.unhealthy", 20.0)?
            .set_default("health.queue_backlog.healthy", 10.0)?
            .set_default("health.queue_backlog.warning", 50.0)?
            .set_default("health.queue_backlog.unhealthy", 200.0)?
            .set_default("health.memory_mb.healthy", 256.0)?
            .set_default("health.memory_mb.warning", 512.0)?
            .set_default("health.memory_mb.unhealthy", 1024.0)?
            .set_default("health.latency_ms.healthy", 1000.0)?
            .set_default("health.latency_ms.warning", 3000.0)?
            .set_default("health.latency_ms.unhealthy", 10000.0)?
            .set_default("archival.batch_size", 500)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
