use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for the convergence verifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Scan execution settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Rescan loop bounds and grace periods
    #[serde(default)]
    pub convergence: ConvergenceConfig,

    /// Node pools to wait on after remediation
    #[serde(default)]
    pub node_pools: NodePoolConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScanConfig {
    /// How long to wait for a suite to finish one scan
    #[serde(default = "default_scan_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_scan_timeout_secs() -> u64 {
    1800
}

impl ScanConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scan_timeout_secs(),
        }
    }
}

/// Convergence loop configuration
///
/// The grace periods stand in for readiness signals the platform does not
/// expose; they are plain settings so slower or faster platforms can be
/// driven without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConvergenceConfig {
    /// Number of the first rescan (the initial scan is number 1)
    #[serde(default = "default_first_rescan")]
    pub first_rescan: u32,

    /// Scan number that is never reached by a converging run
    #[serde(default = "default_max_scan_ceiling")]
    pub max_scan_ceiling: u32,

    /// Wait after the first scan before watching node pools
    #[serde(default = "default_remediation_grace_secs")]
    pub remediation_grace_secs: u64,

    /// Wait after pools settle before applying manual remediations
    #[serde(default = "default_manual_grace_secs")]
    pub manual_grace_secs: u64,

    /// Wait after applying manual remediations before watching node pools
    #[serde(default = "default_post_manual_grace_secs")]
    pub post_manual_grace_secs: u64,

    /// Wait after a non-final rescan before watching node pools
    #[serde(default = "default_rescan_grace_secs")]
    pub rescan_grace_secs: u64,

    /// Extra wait after pools settle for slow-starting dependent services
    #[serde(default = "default_dependent_service_grace_secs")]
    pub dependent_service_grace_secs: u64,

    /// Skip every remediation-related step and assertion after the first scan
    #[serde(default)]
    pub bypass_remediations: bool,
}

const fn default_first_rescan() -> u32 {
    2
}

const fn default_max_scan_ceiling() -> u32 {
    5
}

const fn default_remediation_grace_secs() -> u64 {
    30
}

const fn default_manual_grace_secs() -> u64 {
    60
}

const fn default_post_manual_grace_secs() -> u64 {
    30
}

const fn default_rescan_grace_secs() -> u64 {
    30
}

const fn default_dependent_service_grace_secs() -> u64 {
    45
}

impl ConvergenceConfig {
    pub const fn remediation_grace(&self) -> Duration {
        Duration::from_secs(self.remediation_grace_secs)
    }

    pub const fn manual_grace(&self) -> Duration {
        Duration::from_secs(self.manual_grace_secs)
    }

    pub const fn post_manual_grace(&self) -> Duration {
        Duration::from_secs(self.post_manual_grace_secs)
    }

    pub const fn rescan_grace(&self) -> Duration {
        Duration::from_secs(self.rescan_grace_secs)
    }

    pub const fn dependent_service_grace(&self) -> Duration {
        Duration::from_secs(self.dependent_service_grace_secs)
    }
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            first_rescan: default_first_rescan(),
            max_scan_ceiling: default_max_scan_ceiling(),
            remediation_grace_secs: default_remediation_grace_secs(),
            manual_grace_secs: default_manual_grace_secs(),
            post_manual_grace_secs: default_post_manual_grace_secs(),
            rescan_grace_secs: default_rescan_grace_secs(),
            dependent_service_grace_secs: default_dependent_service_grace_secs(),
            bypass_remediations: false,
        }
    }
}

/// Node pool wait configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodePoolConfig {
    /// Pools to wait on, in order
    #[serde(default = "default_pool_names")]
    pub names: Vec<String>,

    /// Interval between pool status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a single pool may take to settle
    #[serde(default = "default_pool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_pool_names() -> Vec<String> {
    vec!["worker".to_string(), "master".to_string()]
}

const fn default_poll_interval_ms() -> u64 {
    10_000
}

const fn default_pool_timeout_secs() -> u64 {
    3600
}

impl NodePoolConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NodePoolConfig {
    fn default() -> Self {
        Self {
            names: default_pool_names(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_pool_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolled log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
