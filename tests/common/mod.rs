//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

use std::sync::Arc;

use compliance_convergence::adapters::memory::{InMemoryNodePools, InMemoryPlatform};
use compliance_convergence::{CheckOutcome, Config, ConvergenceLoop, Suite};

pub use compliance_convergence::adapters::memory::ScanFixture;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// The suite every in-memory platform in these tests serves
pub fn suite() -> Suite {
    Suite::new("ocp4-cis", "openshift-compliance")
}

/// A scan producing `failures` failing and `passes` passing checks
#[allow(dead_code)]
pub fn scan(failures: usize, passes: usize) -> ScanFixture {
    ScanFixture::new()
        .with_results("fail", CheckOutcome::Fail, failures)
        .with_results("pass", CheckOutcome::Pass, passes)
}

/// Worker and master pools that are settled on every poll
#[allow(dead_code)]
pub fn settled_pools() -> Arc<InMemoryNodePools> {
    Arc::new(InMemoryNodePools::settled(["worker", "master"]))
}

pub type TestLoop = ConvergenceLoop<InMemoryPlatform, InMemoryNodePools>;

#[allow(dead_code)]
pub fn convergence_loop(
    platform: &Arc<InMemoryPlatform>,
    pools: &Arc<InMemoryNodePools>,
    config: &Config,
) -> TestLoop {
    ConvergenceLoop::new(Arc::clone(platform), Arc::clone(pools), config)
}
