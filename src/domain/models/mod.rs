//! Domain models for the convergence verifier

pub mod config;
pub mod convergence;
pub mod node_pool;
pub mod snapshot;
pub mod suite;

pub use config::{Config, ConvergenceConfig, LoggingConfig, NodePoolConfig, ScanConfig};
pub use convergence::{
    AssertionMismatch, ConvergenceOutcome, ConvergenceReport, IterationCounter, LoopPhase,
    MismatchKind,
};
pub use node_pool::NodePoolState;
pub use snapshot::ScanSnapshot;
pub use suite::{CheckOutcome, CheckResult, RemediationRef, Suite};
