//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingestion: IngestionConfig,
    pub acquisition: AcquisitionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed to call the read API (e.g. "https://dashboard.example.com").
    /// Empty means any origin.
    #[serde(default)]
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Hours between full ingestion cycles
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// One-shot kickoff delay after startup, giving storage time to connect
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    /// Minutes between stats-only recomputations
    #[serde(default = "default_stats_interval_mins")]
    pub stats_interval_mins: u64,
    /// Retry budget for stats recomputation
    #[serde(default = "default_stats_max_attempts")]
    pub stats_max_attempts: u32,
    /// Upper bound on waiting for storage readiness within one attempt
    #[serde(default = "default_readiness_wait_secs")]
    pub readiness_wait_secs: u64,
    /// Skip a scheduled cycle while another is still running.
    /// Upserts are idempotent, so overlap is low-risk either way.
    #[serde(default = "default_serialize_cycles")]
    pub serialize_cycles: bool,
}

fn default_interval_hours() -> u64 {
    6
}

fn default_startup_delay_secs() -> u64 {
    15
}

fn default_stats_interval_mins() -> u64 {
    60
}

fn default_stats_max_attempts() -> u32 {
    5
}

fn default_readiness_wait_secs() -> u64 {
    30
}

fn default_serialize_cycles() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    /// Official statistics feed endpoint probed by the primary tier.
    /// Empty disables the probe and the tier synthesizes directly.
    #[serde(default)]
    pub feed_url: String,
    /// Statistics site root probed by the scraping tier
    #[serde(default)]
    pub site_url: String,
    /// Timeout for each outbound acquisition call
    #[serde(default = "default_acquire_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_acquire_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";

        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(config::Environment::with_prefix("ARRIVALS").separator("__"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        // Validate database config
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate ingestion timing
        if self.ingestion.interval_hours == 0 {
            anyhow::bail!("ingestion.interval_hours must be at least 1");
        }
        if self.ingestion.stats_interval_mins == 0 {
            anyhow::bail!("ingestion.stats_interval_mins must be at least 1");
        }
        if self.ingestion.stats_max_attempts == 0 {
            anyhow::bail!("ingestion.stats_max_attempts must be at least 1");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion.interval_hours * 3600)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.ingestion.startup_delay_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion.stats_interval_mins * 60)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition.timeout_secs)
    }
}
