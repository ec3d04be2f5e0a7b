use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::domain::models::RemediationRef;
use crate::domain::ports::CompliancePlatform;

/// Outcome of applying a batch of manual remediations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Names of the remediations applied, in order
    pub applied: Vec<String>,
    /// Remediation name and the reason it could not be applied
    pub failed: Vec<(String, String)>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies remediations the platform cannot apply on its own.
///
/// No idempotence check is made: callers must not pass overlapping sets
/// within one iteration.
pub struct ManualRemediationApplier<P: CompliancePlatform + ?Sized> {
    platform: Arc<P>,
}

impl<P: CompliancePlatform + ?Sized> ManualRemediationApplier<P> {
    pub const fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Apply every listed remediation, best effort.
    ///
    /// A failure is logged and recorded; the rest are still applied.
    #[instrument(skip_all, fields(count = remediations.len()))]
    pub async fn apply(&self, remediations: &[RemediationRef]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for remediation in remediations {
            match self.platform.apply_remediation(remediation).await {
                Ok(()) => {
                    info!(remediation = %remediation.name, "manual remediation applied");
                    report.applied.push(remediation.name.clone());
                }
                Err(err) => {
                    error!(remediation = %remediation.name, error = %err, "failed to apply manual remediation");
                    report.failed.push((remediation.name.clone(), err.to_string()));
                }
            }
        }
        report
    }
}
