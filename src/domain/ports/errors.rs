use std::time::Duration;

use thiserror::Error;

/// Errors raised by platform adapters
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Suite not found: {0}")]
    SuiteNotFound(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Timed out after {waited:?} waiting for {operation}")]
    Timeout { operation: String, waited: Duration },

    #[error("Platform unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;
