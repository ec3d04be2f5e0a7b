//! Compliance convergence verifier
//!
//! Drives a compliance suite from its first scan through remediation and
//! bounded re-scans, then verifies that the cluster converged: the set of
//! checks stayed stable, failures went down and no check produced an invalid
//! result.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, fatal errors and platform ports
//! - **Service Layer** (`services`): the convergence loop and its collaborators
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **Adapters** (`adapters`): in-memory platform implementations
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use compliance_convergence::{ConfigLoader, ConvergenceLoop, Suite};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let convergence = ConvergenceLoop::new(platform, node_pools, &config);
//!     let report = convergence.run(&Suite::new("cis", "compliance")).await?;
//!     assert!(report.passed());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ConvergenceError, ConvergenceResult};
pub use domain::models::{
    AssertionMismatch, CheckOutcome, CheckResult, Config, ConvergenceOutcome, ConvergenceReport,
    LoopPhase, MismatchKind, NodePoolState, RemediationRef, ScanSnapshot, Suite,
};
pub use domain::ports::{CompliancePlatform, NodePoolClient, PlatformError, PlatformResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::{LogConfig, LoggerImpl};
pub use services::ConvergenceLoop;
