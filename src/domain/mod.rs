//! Domain layer for the convergence verifier
//!
//! This module contains the models, the fatal error taxonomy and the ports
//! the platform adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ConvergenceError, ConvergenceResult};
