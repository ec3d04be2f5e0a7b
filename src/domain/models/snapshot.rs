use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::suite::RemediationRef;

/// Aggregate state of a suite after one scan completed.
///
/// Snapshots are produced by the result aggregator and never mutated; each
/// scan iteration yields a fresh one and the previous one is only kept for
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    /// Scan iteration the snapshot was taken after (the first scan is 1)
    pub iteration: u32,
    /// Remediations the platform applies on its own
    pub remediations: usize,
    /// Check results with a `FAIL` outcome
    pub failures: usize,
    /// All check results of the suite
    pub check_results: usize,
    /// Check results with an ERROR or NONE outcome
    pub invalid: usize,
    /// Remediations that must be applied out of band
    pub manual_remediations: Vec<RemediationRef>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl ScanSnapshot {
    /// Whether anything is left to remediate, automatically or manually
    pub fn needs_remediation(&self) -> bool {
        self.remediations > 0 || !self.manual_remediations.is_empty()
    }
}
