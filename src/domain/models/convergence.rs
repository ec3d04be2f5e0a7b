//! Convergence loop state, verification mismatches and the final report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::ScanSnapshot;
use super::suite::Suite;

// ---------------------------------------------------------------------------
// IterationCounter
// ---------------------------------------------------------------------------

/// Bounded rescan counter.
///
/// Yields scan numbers in `[first, ceiling)`. The first scan of a run is
/// number 1 and happens before the counter is consulted, so with the default
/// bounds of 2 and 5 at most three rescans are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounter {
    first: u32,
    next: u32,
    ceiling: u32,
}

impl IterationCounter {
    pub const DEFAULT_FIRST: u32 = 2;
    pub const DEFAULT_CEILING: u32 = 5;

    pub const fn new(first: u32, ceiling: u32) -> Self {
        Self {
            first,
            next: first,
            ceiling,
        }
    }

    /// The ceiling was reached without the loop breaking out
    pub const fn is_exhausted(&self) -> bool {
        self.next >= self.ceiling
    }

    /// Number of scan numbers handed out so far
    pub const fn rescans(&self) -> u32 {
        self.next.saturating_sub(self.first)
    }

    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

impl Default for IterationCounter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FIRST, Self::DEFAULT_CEILING)
    }
}

impl Iterator for IterationCounter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        let current = self.next;
        self.next += 1;
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// LoopPhase
// ---------------------------------------------------------------------------

/// States of the scan, remediate, rescan state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum LoopPhase {
    Init,
    FirstScanDone,
    NoRemediationsNeeded,
    Bypassed,
    RemediationsApplied,
    Settling { iteration: u32 },
    ManualRemediationsApplied,
    Rescanning { iteration: u32 },
    NeedsMoreScans { iteration: u32 },
    Converged { iteration: u32 },
    Verified,
    Failed,
}

impl LoopPhase {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoRemediationsNeeded | Self::Bypassed | Self::Verified | Self::Failed
        )
    }
}

// ---------------------------------------------------------------------------
// AssertionMismatch
// ---------------------------------------------------------------------------

/// Which verification a mismatch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Check-result count differs between first and final scan
    CheckCountChanged,
    /// Failures did not strictly decrease after remediation
    FailuresNotReduced,
    /// A snapshot used for verification holds invalid results
    InvalidResults,
    /// A check result references a rule missing from the suite's catalog
    MissingRule,
    /// A manual remediation could not be applied
    ManualApplyFailed,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CheckCountChanged => "check_count_changed",
            Self::FailuresNotReduced => "failures_not_reduced",
            Self::InvalidResults => "invalid_results",
            Self::MissingRule => "missing_rule",
            Self::ManualApplyFailed => "manual_apply_failed",
        };
        f.write_str(s)
    }
}

/// A failed, non-fatal verification.
///
/// Mismatches are recorded and logged; they never stop the remaining checks
/// from running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionMismatch {
    /// Scan iteration the measured value comes from
    pub iteration: u32,
    /// Verification that failed
    pub kind: MismatchKind,
    /// Value the verification expected
    pub expected: String,
    /// Value actually measured
    pub measured: String,
    /// Human-readable description
    pub message: String,
}

impl AssertionMismatch {
    pub fn new(
        iteration: u32,
        kind: MismatchKind,
        expected: impl ToString,
        measured: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self {
            iteration,
            kind,
            expected: expected.to_string(),
            measured: measured.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AssertionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[scan {}] {}: {} (expected {}, measured {})",
            self.iteration, self.kind, self.message, self.expected, self.measured
        )
    }
}

// ---------------------------------------------------------------------------
// ConvergenceReport
// ---------------------------------------------------------------------------

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceOutcome {
    /// Remediation handling was skipped on request after the first scan
    Bypassed,
    /// The first scan produced nothing to remediate
    NoRemediationsNeeded,
    /// The loop converged and the final snapshot was verified
    Verified,
}

/// Everything a run measured, returned to the caller on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceReport {
    /// Unique id of the run, for correlating logs
    pub run_id: Uuid,
    /// Suite the run verified
    pub suite: Suite,
    /// How the run ended
    pub outcome: ConvergenceOutcome,
    /// Snapshot after the first scan
    pub initial: ScanSnapshot,
    /// Snapshot after the final rescan, when the loop got that far
    pub final_snapshot: Option<ScanSnapshot>,
    /// Rescans performed after the first scan
    pub rescans: u32,
    /// Every state the loop passed through, in order
    pub phases: Vec<LoopPhase>,
    /// Every verification that failed, in the order found
    pub mismatches: Vec<AssertionMismatch>,
    /// Unmet remediation dependencies surfaced by the final rescan
    pub late_unmet_dependencies: bool,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}

impl ConvergenceReport {
    /// No verification mismatch was recorded
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn mismatches_of(&self, kind: MismatchKind) -> impl Iterator<Item = &AssertionMismatch> {
        self.mismatches.iter().filter(move |m| m.kind == kind)
    }

    /// Serialize the report for archiving next to the scan results
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
