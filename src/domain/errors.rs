//! Fatal errors of the convergence loop.
//!
//! Verification mismatches are not errors: they are recorded in the
//! [`ConvergenceReport`](crate::domain::models::ConvergenceReport) and the run
//! keeps going. Everything here stops the enclosing step.

use std::time::Duration;

use thiserror::Error;

use crate::domain::ports::PlatformError;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle(cycle: &Option<Vec<String>>) -> String {
    match cycle {
        Some(path) if !path.is_empty() => {
            let mut names = path.clone();
            names.push(path[0].clone());
            format!(" (cycle: {})", names.join(" -> "))
        }
        _ => String::new(),
    }
}

/// Errors that abort a convergence run.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("Suite {suite} is not usable: {reason}")]
    SetupFatal { suite: String, reason: String },

    #[error("Timed out after {waited:?} waiting for {operation} (scan {iteration})")]
    Timeout {
        operation: String,
        iteration: u32,
        waited: Duration,
    },

    #[error(
        "Reached maximum number of re-scans (scan {ceiling}). There might be a remediation dependency issue{}",
        format_cycle(.cycle)
    )]
    ConvergenceExhausted {
        ceiling: u32,
        cycle: Option<Vec<String>>,
    },

    #[error("Platform request failed during scan {iteration}: {source}")]
    Platform {
        iteration: u32,
        #[source]
        source: PlatformError,
    },
}

impl ConvergenceError {
    /// Map a platform error raised while working on `suite` at `iteration`.
    ///
    /// A missing suite is a setup problem; platform-side timeouts keep their
    /// timeout classification.
    pub fn from_platform(suite: &str, iteration: u32, err: PlatformError) -> Self {
        match err {
            PlatformError::SuiteNotFound(_) => Self::SetupFatal {
                suite: suite.to_string(),
                reason: err.to_string(),
            },
            PlatformError::Timeout { operation, waited } => Self::Timeout {
                operation,
                iteration,
                waited,
            },
            other => Self::Platform {
                iteration,
                source: other,
            },
        }
    }
}

pub type ConvergenceResult<T> = Result<T, ConvergenceError>;
