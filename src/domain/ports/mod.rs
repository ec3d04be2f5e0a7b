//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that platform adapters must implement:
//! - CompliancePlatform: scan triggering, result and remediation queries
//! - NodePoolClient: node pool rollout status
//!
//! These traits keep the convergence logic independent of the transport the
//! platform is reached through.

pub mod compliance_platform;
pub mod errors;
pub mod node_pool_client;

pub use compliance_platform::CompliancePlatform;
pub use errors::{PlatformError, PlatformResult};
pub use node_pool_client::NodePoolClient;
