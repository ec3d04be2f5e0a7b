//! Scan, remediate, rescan until converged, then verify.
//!
//! The loop runs one scan, captures a baseline [`ScanSnapshot`] and exits
//! early when nothing needs remediation. Otherwise it lets the platform apply
//! its remediations, applies manual ones itself, and rescans a bounded number
//! of times:
//!
//! - **Settling** -- every configured node pool must settle before any rescan,
//!   since results produced during a rollout are not trustworthy.
//! - **Rescanning** -- the dependency resolver is consulted *before* each
//!   rescan; only a rescan preceded by "no unmet dependencies" is final.
//! - **Verified** -- first and final snapshot are compared. Mismatches are
//!   recorded and logged without stopping the remaining checks.
//!
//! Reaching the scan ceiling without a final rescan is fatal
//! ([`ConvergenceError::ConvergenceExhausted`]).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::dependency_resolver::DependencyResolver;
use super::findings::summarize_findings;
use super::manual_remediation::ManualRemediationApplier;
use super::node_pool_waiter::NodePoolSyncWaiter;
use super::result_aggregator::ResultAggregator;
use crate::domain::errors::{ConvergenceError, ConvergenceResult};
use crate::domain::models::{
    AssertionMismatch, Config, ConvergenceConfig, ConvergenceOutcome, ConvergenceReport,
    IterationCounter, LoopPhase, MismatchKind, NodePoolConfig, ScanConfig, ScanSnapshot, Suite,
};
use crate::domain::ports::{CompliancePlatform, NodePoolClient};

/// Number of the initial scan
const FIRST_SCAN: u32 = 1;

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Mutable bookkeeping of one run. Snapshots are not kept here; they flow
/// between steps by return value.
struct Run {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    phases: Vec<LoopPhase>,
    mismatches: Vec<AssertionMismatch>,
    rescans: u32,
    late_unmet_dependencies: bool,
}

impl Run {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            phases: Vec::new(),
            mismatches: Vec::new(),
            rescans: 0,
            late_unmet_dependencies: false,
        }
    }

    fn enter(&mut self, phase: LoopPhase) {
        debug!(run_id = %self.run_id, phase = ?phase, "entering phase");
        self.phases.push(phase);
    }

    /// Record a mismatch that has not been logged yet
    fn mismatch(&mut self, mismatch: AssertionMismatch) {
        error!(
            run_id = %self.run_id,
            iteration = mismatch.iteration,
            kind = %mismatch.kind,
            expected = %mismatch.expected,
            measured = %mismatch.measured,
            "{}",
            mismatch.message
        );
        self.mismatches.push(mismatch);
    }

    /// Record mismatches already logged where they were found
    fn extend(&mut self, mismatches: Vec<AssertionMismatch>) {
        self.mismatches.extend(mismatches);
    }

    fn finish(
        self,
        suite: &Suite,
        outcome: ConvergenceOutcome,
        initial: ScanSnapshot,
        final_snapshot: Option<ScanSnapshot>,
    ) -> ConvergenceReport {
        ConvergenceReport {
            run_id: self.run_id,
            suite: suite.clone(),
            outcome,
            initial,
            final_snapshot,
            rescans: self.rescans,
            phases: self.phases,
            mismatches: self.mismatches,
            late_unmet_dependencies: self.late_unmet_dependencies,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Fixed wait standing in for a readiness signal the platform lacks
async fn grace(period: Duration, reason: &str) {
    if period.is_zero() {
        return;
    }
    debug!(seconds = period.as_secs(), reason, "waiting");
    sleep(period).await;
}

// ---------------------------------------------------------------------------
// ConvergenceLoop
// ---------------------------------------------------------------------------

/// Orchestrates the bounded iterate-until-converged protocol.
///
/// Strictly sequential: no step overlaps another, pools are waited on one
/// after another, and any fatal error aborts the remaining steps.
pub struct ConvergenceLoop<P: CompliancePlatform + ?Sized, N: NodePoolClient + ?Sized> {
    platform: Arc<P>,
    aggregator: ResultAggregator<P>,
    resolver: DependencyResolver<P>,
    applier: ManualRemediationApplier<P>,
    pool_waiter: NodePoolSyncWaiter<N>,
    scan: ScanConfig,
    convergence: ConvergenceConfig,
    node_pools: NodePoolConfig,
}

impl<P: CompliancePlatform + ?Sized, N: NodePoolClient + ?Sized> ConvergenceLoop<P, N> {
    pub fn new(platform: Arc<P>, node_pools: Arc<N>, config: &Config) -> Self {
        Self {
            aggregator: ResultAggregator::new(Arc::clone(&platform)),
            resolver: DependencyResolver::new(Arc::clone(&platform)),
            applier: ManualRemediationApplier::new(Arc::clone(&platform)),
            pool_waiter: NodePoolSyncWaiter::new(node_pools, config.node_pools.poll_interval()),
            platform,
            scan: config.scan.clone(),
            convergence: config.convergence.clone(),
            node_pools: config.node_pools.clone(),
        }
    }

    /// Run the full protocol against `suite`.
    ///
    /// # Returns
    /// * `Ok(report)` on every terminal success; check
    ///   [`ConvergenceReport::passed`] for verification mismatches
    /// * `Err(_)` on setup failures, timeouts and exhausted rescans
    #[instrument(skip(self, suite), fields(suite = %suite))]
    pub async fn run(&self, suite: &Suite) -> ConvergenceResult<ConvergenceReport> {
        let mut run = Run::new();
        match self.drive(suite, &mut run).await {
            Ok((outcome, initial, final_snapshot)) => {
                info!(
                    run_id = %run.run_id,
                    outcome = ?outcome,
                    rescans = run.rescans,
                    mismatches = run.mismatches.len(),
                    "convergence run finished"
                );
                let report = run.finish(suite, outcome, initial, final_snapshot);
                match report.to_json() {
                    Ok(json) => debug!(report = %json, "convergence report"),
                    Err(err) => warn!(error = %err, "could not serialize convergence report"),
                }
                Ok(report)
            }
            Err(err) => {
                run.enter(LoopPhase::Failed);
                error!(
                    run_id = %run.run_id,
                    error = %err,
                    phases = ?run.phases,
                    "convergence run failed"
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        suite: &Suite,
        run: &mut Run,
    ) -> ConvergenceResult<(ConvergenceOutcome, ScanSnapshot, Option<ScanSnapshot>)> {
        run.enter(LoopPhase::Init);
        let initial = self.first_scan(suite, run).await?;
        run.enter(LoopPhase::FirstScanDone);

        if self.convergence.bypass_remediations {
            info!("Bypassing remediations and assertions relating to remediations");
            run.enter(LoopPhase::Bypassed);
            return Ok((ConvergenceOutcome::Bypassed, initial, None));
        }

        if !initial.needs_remediation() {
            info!("No remediations were generated from this profile");
            run.enter(LoopPhase::NoRemediationsNeeded);
            Self::verify_no_invalid(&initial, run);
            return Ok((ConvergenceOutcome::NoRemediationsNeeded, initial, None));
        }

        run.enter(LoopPhase::RemediationsApplied);
        grace(self.convergence.remediation_grace(), "remediations to start applying")
            .await;
        self.settle(FIRST_SCAN, run).await?;

        if !initial.manual_remediations.is_empty() {
            grace(self.convergence.manual_grace(), "node pools before manual remediation")
                .await;
            self.apply_manual(&initial, run).await;
            grace(
                self.convergence.post_manual_grace(),
                "manual remediations to start applying",
            )
            .await;
            self.settle(FIRST_SCAN, run).await?;
        }

        let final_snapshot = self.rescan_until_converged(suite, run).await?;
        Self::verify(&initial, &final_snapshot, run);
        self.log_findings(suite, final_snapshot.iteration).await;
        run.enter(LoopPhase::Verified);

        Ok((ConvergenceOutcome::Verified, initial, Some(final_snapshot)))
    }

    async fn first_scan(&self, suite: &Suite, run: &mut Run) -> ConvergenceResult<ScanSnapshot> {
        self.scan_once(suite, FIRST_SCAN).await?;
        let scan = self.aggregator.snapshot(suite, FIRST_SCAN, false).await?;
        run.extend(scan.mismatches);
        let initial = scan.snapshot;

        info!(
            iteration = FIRST_SCAN,
            remediations = initial.remediations,
            manual_remediations = initial.manual_remediations.len(),
            failures = initial.failures,
            check_results = initial.check_results,
            invalid = initial.invalid,
            "baseline snapshot"
        );
        self.log_findings(suite, FIRST_SCAN).await;
        Ok(initial)
    }

    /// Log the suite's findings. Report-only: a failed query is logged and
    /// never fails the run.
    async fn log_findings(&self, suite: &Suite, iteration: u32) {
        if let Err(err) = summarize_findings(self.platform.as_ref(), suite, iteration).await {
            warn!(iteration, error = %err, "could not summarize suite findings");
        }
    }

    /// Rescan until a rescan is known to be final.
    ///
    /// Returns the strict snapshot of the final rescan.
    async fn rescan_until_converged(
        &self,
        suite: &Suite,
        run: &mut Run,
    ) -> ConvergenceResult<ScanSnapshot> {
        let mut counter = IterationCounter::new(
            self.convergence.first_rescan,
            self.convergence.max_scan_ceiling,
        );

        while let Some(iteration) = counter.next() {
            // Evaluated before the rescan: it decides whether this rescan is final
            let needs_more_scans = self.resolver.has_unmet_dependencies(suite, iteration).await?;
            info!(iteration, needs_more_scans, "checked remediation dependencies before scan");

            run.enter(LoopPhase::Rescanning { iteration });
            self.scan_once(suite, iteration).await?;
            run.rescans = counter.rescans();

            if !needs_more_scans {
                let scan = self.aggregator.snapshot(suite, iteration, true).await?;
                run.extend(scan.mismatches);
                info!(
                    iteration,
                    remediations = scan.snapshot.remediations,
                    failures = scan.snapshot.failures,
                    check_results = scan.snapshot.check_results,
                    invalid = scan.snapshot.invalid,
                    "final snapshot"
                );
                run.late_unmet_dependencies = self.late_unmet_dependencies(suite, iteration).await;
                run.enter(LoopPhase::Converged { iteration });
                return Ok(scan.snapshot);
            }

            run.enter(LoopPhase::NeedsMoreScans { iteration });
            grace(self.convergence.rescan_grace(), "remediations to start applying")
                .await;
            self.settle(iteration, run).await?;
            // Some remediated services start slowly after their pool settles
            grace(
                self.convergence.dependent_service_grace(),
                "dependent services to start",
            )
            .await;
        }

        let cycle = match self.resolver.find_cycle(suite, counter.ceiling()).await {
            Ok(cycle) => cycle,
            Err(err) => {
                warn!(error = %err, "could not inspect remediations for a dependency cycle");
                None
            }
        };
        Err(ConvergenceError::ConvergenceExhausted {
            ceiling: counter.ceiling(),
            cycle,
        })
    }

    /// Re-query dependencies after the final rescan.
    ///
    /// A remediation surfaced only by the final rescan would otherwise go
    /// unnoticed. It is reported, not acted upon; a failed query counts as
    /// nothing surfaced.
    async fn late_unmet_dependencies(&self, suite: &Suite, iteration: u32) -> bool {
        let unmet = match self.resolver.unmet_dependencies(suite, iteration).await {
            Ok(unmet) => unmet,
            Err(err) => {
                warn!(iteration, error = %err, "could not re-check remediation dependencies after final scan");
                return false;
            }
        };
        for dep in &unmet {
            warn!(
                iteration,
                remediation = %dep.remediation,
                dependency = %dep.dependency,
                "final scan surfaced a remediation with unmet dependencies"
            );
        }
        !unmet.is_empty()
    }

    async fn scan_once(&self, suite: &Suite, iteration: u32) -> ConvergenceResult<()> {
        let suite_name = suite.to_string();
        info!(iteration, "running compliance scan");
        self.platform
            .trigger_scan(suite)
            .await
            .map_err(|e| ConvergenceError::from_platform(&suite_name, iteration, e))?;
        self.platform
            .wait_for_suite_done(suite, self.scan.timeout())
            .await
            .map_err(|e| ConvergenceError::from_platform(&suite_name, iteration, e))
    }

    async fn settle(&self, iteration: u32, run: &mut Run) -> ConvergenceResult<()> {
        run.enter(LoopPhase::Settling { iteration });
        self.pool_waiter
            .wait_for_all(&self.node_pools.names, self.node_pools.timeout(), iteration)
            .await
    }

    async fn apply_manual(&self, initial: &ScanSnapshot, run: &mut Run) {
        let report = self.applier.apply(&initial.manual_remediations).await;
        for (name, reason) in report.failed {
            run.mismatch(AssertionMismatch::new(
                initial.iteration,
                MismatchKind::ManualApplyFailed,
                "applied",
                "failed",
                format!("manual remediation {name} could not be applied: {reason}"),
            ));
        }
        run.enter(LoopPhase::ManualRemediationsApplied);
    }

    fn verify(initial: &ScanSnapshot, final_snapshot: &ScanSnapshot, run: &mut Run) {
        let iteration = final_snapshot.iteration;

        if initial.check_results == final_snapshot.check_results {
            info!(
                init = initial.check_results,
                end = final_snapshot.check_results,
                "the amount of check results are the same"
            );
        } else {
            run.mismatch(AssertionMismatch::new(
                iteration,
                MismatchKind::CheckCountChanged,
                initial.check_results,
                final_snapshot.check_results,
                format!(
                    "the amount of check results are NOT the same: init -> {} end {}",
                    initial.check_results, final_snapshot.check_results
                ),
            ));
        }

        if final_snapshot.failures < initial.failures {
            info!(
                init = initial.failures,
                end = final_snapshot.failures,
                "there are less failures now"
            );
        } else {
            run.mismatch(AssertionMismatch::new(
                iteration,
                MismatchKind::FailuresNotReduced,
                format!("< {}", initial.failures),
                final_snapshot.failures,
                format!(
                    "the failures didn't diminish: init -> {} end {}",
                    initial.failures, final_snapshot.failures
                ),
            ));
        }

        Self::verify_no_invalid(final_snapshot, run);
    }

    fn verify_no_invalid(snapshot: &ScanSnapshot, run: &mut Run) {
        if snapshot.invalid > 0 {
            run.mismatch(AssertionMismatch::new(
                snapshot.iteration,
                MismatchKind::InvalidResults,
                0,
                snapshot.invalid,
                format!(
                    "expected no ERROR or NONE results from platform scans, got {} Error/None results",
                    snapshot.invalid
                ),
            ));
        }
    }
}
