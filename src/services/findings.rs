//! Per-outcome summary of a suite's findings, logged after scans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::errors::{ConvergenceError, ConvergenceResult};
use crate::domain::models::{CheckOutcome, CheckResult, Suite};
use crate::domain::ports::CompliancePlatform;

/// Outcome tallies and failing checks of one suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    /// Number of check results
    pub total: usize,
    /// Result count per outcome; outcomes never seen are absent
    pub by_outcome: BTreeMap<CheckOutcome, usize>,
    /// Failing check names grouped by severity
    pub failing_by_severity: BTreeMap<String, Vec<String>>,
    /// Names of checks with an invalid outcome
    pub invalid: Vec<String>,
}

impl FindingsSummary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            *summary.by_outcome.entry(result.outcome).or_default() += 1;
            if result.outcome == CheckOutcome::Fail {
                summary
                    .failing_by_severity
                    .entry(result.severity.clone())
                    .or_default()
                    .push(result.name.clone());
            }
            if !result.outcome.is_valid() {
                summary.invalid.push(result.name.clone());
            }
        }
        for names in summary.failing_by_severity.values_mut() {
            names.sort();
        }
        summary.invalid.sort();
        summary
    }

    pub fn count(&self, outcome: CheckOutcome) -> usize {
        self.by_outcome.get(&outcome).copied().unwrap_or(0)
    }
}

/// Fetch the suite's results, log a summary and return it
pub async fn summarize_findings<P: CompliancePlatform + ?Sized>(
    platform: &P,
    suite: &Suite,
    iteration: u32,
) -> ConvergenceResult<FindingsSummary> {
    let results = platform
        .check_results(suite)
        .await
        .map_err(|e| ConvergenceError::from_platform(&suite.to_string(), iteration, e))?;
    let summary = FindingsSummary::from_results(&results);

    info!(
        suite = %suite,
        iteration,
        total = summary.total,
        pass = summary.count(CheckOutcome::Pass),
        fail = summary.count(CheckOutcome::Fail),
        info = summary.count(CheckOutcome::Info),
        skip = summary.count(CheckOutcome::Skip),
        manual = summary.count(CheckOutcome::Manual),
        error = summary.count(CheckOutcome::Error),
        not_applicable = summary.count(CheckOutcome::NotApplicable),
        none = summary.count(CheckOutcome::None),
        "suite findings"
    );
    for (severity, checks) in &summary.failing_by_severity {
        info!(suite = %suite, iteration, severity = %severity, count = checks.len(), checks = ?checks, "failing checks");
    }
    if !summary.invalid.is_empty() {
        warn!(suite = %suite, iteration, checks = ?summary.invalid, "checks with invalid results");
    }

    Ok(summary)
}
