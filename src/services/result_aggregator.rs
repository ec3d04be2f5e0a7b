//! Scalar counts and remediation classification for one suite.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, instrument};

use crate::domain::errors::{ConvergenceError, ConvergenceResult};
use crate::domain::models::{
    AssertionMismatch, CheckOutcome, MismatchKind, RemediationRef, ScanSnapshot, Suite,
};
use crate::domain::ports::CompliancePlatform;

/// Result of [`ResultAggregator::summarize`].
#[derive(Debug, Clone, Default)]
pub struct SuiteSummary {
    /// Number of check results stored for the suite
    pub check_results: usize,
    /// Remediations the platform cannot apply on its own
    pub manual_remediations: Vec<RemediationRef>,
    /// Strict-mode findings (results whose rule vanished from the catalog)
    pub mismatches: Vec<AssertionMismatch>,
}

/// Snapshot plus the mismatches found while building it.
#[derive(Debug, Clone)]
pub struct AggregatedScan {
    /// Counts of the scan
    pub snapshot: ScanSnapshot,
    /// Strict-mode findings recorded while building the snapshot
    pub mismatches: Vec<AssertionMismatch>,
}

/// Read-only aggregation of a suite's stored results.
///
/// A missing suite is a fatal setup error; count discrepancies are reported
/// as [`AssertionMismatch`]es and never abort.
pub struct ResultAggregator<P: CompliancePlatform + ?Sized> {
    platform: Arc<P>,
}

impl<P: CompliancePlatform + ?Sized> ResultAggregator<P> {
    pub const fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Classify every check result of the suite and pick out manual-only
    /// remediations.
    ///
    /// In strict mode every rule referenced by a result must still exist in
    /// the suite's rule catalog; each vanished rule becomes a
    /// [`MismatchKind::MissingRule`] mismatch.
    #[instrument(skip(self, suite), fields(suite = %suite))]
    pub async fn summarize(
        &self,
        suite: &Suite,
        strict: bool,
        iteration: u32,
    ) -> ConvergenceResult<SuiteSummary> {
        let results = self
            .platform
            .check_results(suite)
            .await
            .map_err(|e| ConvergenceError::from_platform(&suite.to_string(), iteration, e))?;
        let remediations = self.fetch_remediations(suite, iteration).await?;

        let manual_remediations: Vec<RemediationRef> = remediations
            .into_iter()
            .filter(|r| r.manual_only)
            .collect();

        let mut mismatches = Vec::new();
        if strict {
            let catalog = self
                .platform
                .rule_catalog(suite)
                .await
                .map_err(|e| ConvergenceError::from_platform(&suite.to_string(), iteration, e))?;
            for result in results.iter().filter(|r| !catalog.contains(&r.rule)) {
                let mismatch = AssertionMismatch::new(
                    iteration,
                    MismatchKind::MissingRule,
                    format!("rule {} in catalog", result.rule),
                    "missing",
                    format!(
                        "check result {} references rule {} which no longer exists",
                        result.name, result.rule
                    ),
                );
                error!(
                    iteration,
                    check = %result.name,
                    rule = %result.rule,
                    "check result references a vanished rule"
                );
                mismatches.push(mismatch);
            }
        }

        debug!(
            iteration,
            check_results = results.len(),
            manual = manual_remediations.len(),
            strict,
            "suite summarized"
        );

        Ok(SuiteSummary {
            check_results: results.len(),
            manual_remediations,
            mismatches,
        })
    }

    /// Remediations the platform applies automatically
    pub async fn count_remediations(&self, suite: &Suite, iteration: u32) -> ConvergenceResult<usize> {
        let remediations = self.fetch_remediations(suite, iteration).await?;
        Ok(remediations.iter().filter(|r| !r.manual_only).count())
    }

    /// Check results with a `FAIL` outcome
    pub async fn count_failures(&self, suite: &Suite, iteration: u32) -> ConvergenceResult<usize> {
        self.count_results(suite, iteration, |o| o == CheckOutcome::Fail)
            .await
    }

    /// Check results with an ERROR or NONE outcome
    pub async fn count_invalid(&self, suite: &Suite, iteration: u32) -> ConvergenceResult<usize> {
        self.count_results(suite, iteration, |o| !o.is_valid()).await
    }

    /// Build a fresh snapshot of the suite after scan `iteration`
    pub async fn snapshot(
        &self,
        suite: &Suite,
        iteration: u32,
        strict: bool,
    ) -> ConvergenceResult<AggregatedScan> {
        let remediations = self.count_remediations(suite, iteration).await?;
        let failures = self.count_failures(suite, iteration).await?;
        let summary = self.summarize(suite, strict, iteration).await?;
        let invalid = self.count_invalid(suite, iteration).await?;

        let snapshot = ScanSnapshot {
            iteration,
            remediations,
            failures,
            check_results: summary.check_results,
            invalid,
            manual_remediations: summary.manual_remediations,
            captured_at: Utc::now(),
        };

        Ok(AggregatedScan {
            snapshot,
            mismatches: summary.mismatches,
        })
    }

    async fn fetch_remediations(
        &self,
        suite: &Suite,
        iteration: u32,
    ) -> ConvergenceResult<Vec<RemediationRef>> {
        self.platform
            .remediations(suite)
            .await
            .map_err(|e| ConvergenceError::from_platform(&suite.to_string(), iteration, e))
    }

    async fn count_results<F>(&self, suite: &Suite, iteration: u32, predicate: F) -> ConvergenceResult<usize>
    where
        F: Fn(CheckOutcome) -> bool + Send,
    {
        let results = self
            .platform
            .check_results(suite)
            .await
            .map_err(|e| ConvergenceError::from_platform(&suite.to_string(), iteration, e))?;
        Ok(results.iter().filter(|r| predicate(r.outcome)).count())
    }
}
