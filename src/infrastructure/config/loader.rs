use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid first_rescan: {0}. Must be at least 2")]
    InvalidFirstRescan(u32),

    #[error("Invalid max_scan_ceiling: {ceiling}. Must be greater than first_rescan ({first})")]
    InvalidScanCeiling { first: u32, ceiling: u32 },

    #[error("Node pool list cannot be empty")]
    NoNodePools,

    #[error("Node pool names cannot be empty")]
    EmptyNodePoolName,

    #[error("Invalid poll_interval_ms: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error("Invalid {0} timeout: must be at least 1 second")]
    InvalidTimeout(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .compliance-convergence/config.yaml (project config)
    /// 3. .compliance-convergence/local.yaml (local overrides, optional)
    /// 4. Environment variables (CONVERGENCE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            // 1. Start with programmatic defaults
            .merge(Serialized::defaults(Config::default()))
            // 2. Merge project config
            .merge(Yaml::file(".compliance-convergence/config.yaml"))
            // 3. Merge local overrides (optional, for slower or faster clusters)
            .merge(Yaml::file(".compliance-convergence/local.yaml"))
            // 4. Merge environment variables (highest priority)
            .merge(Env::prefixed("CONVERGENCE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Rescan bounds: the first scan is number 1
        let convergence = &config.convergence;
        if convergence.first_rescan < 2 {
            return Err(ConfigError::InvalidFirstRescan(convergence.first_rescan));
        }
        if convergence.max_scan_ceiling <= convergence.first_rescan {
            return Err(ConfigError::InvalidScanCeiling {
                first: convergence.first_rescan,
                ceiling: convergence.max_scan_ceiling,
            });
        }

        if config.scan.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("scan"));
        }

        // Validate node pools
        if config.node_pools.names.is_empty() {
            return Err(ConfigError::NoNodePools);
        }
        if config.node_pools.names.iter().any(|n| n.trim().is_empty()) {
            return Err(ConfigError::EmptyNodePoolName);
        }
        if config.node_pools.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(
                config.node_pools.poll_interval_ms,
            ));
        }
        if config.node_pools.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("node pool"));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
