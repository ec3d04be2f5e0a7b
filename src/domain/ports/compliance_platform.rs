use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::PlatformResult;
use crate::domain::models::{CheckResult, RemediationRef, Suite};

/// Access to the compliance scanning platform
///
/// Everything except [`trigger_scan`](Self::trigger_scan) and
/// [`apply_remediation`](Self::apply_remediation) is a read-only query; the
/// suite and its results stay owned by the platform.
#[async_trait]
pub trait CompliancePlatform: Send + Sync {
    /// Start a (re)scan of the suite
    ///
    /// Safe to call repeatedly.
    async fn trigger_scan(&self, suite: &Suite) -> PlatformResult<()>;

    /// Block until the suite reports its scan as done
    ///
    /// # Returns
    /// * `Ok(())` once the suite is done
    /// * `Err(PlatformError::Timeout)` if `timeout` elapses first
    async fn wait_for_suite_done(&self, suite: &Suite, timeout: Duration) -> PlatformResult<()>;

    /// All check results currently stored for the suite
    async fn check_results(&self, suite: &Suite) -> PlatformResult<Vec<CheckResult>>;

    /// All remediations currently generated for the suite, with their
    /// platform-side applied status
    async fn remediations(&self, suite: &Suite) -> PlatformResult<Vec<RemediationRef>>;

    /// Names of the rules in the suite's profile
    async fn rule_catalog(&self, suite: &Suite) -> PlatformResult<HashSet<String>>;

    /// Apply one remediation the platform would not apply on its own
    async fn apply_remediation(&self, remediation: &RemediationRef) -> PlatformResult<()>;
}
