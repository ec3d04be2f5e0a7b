//! In-memory platform adapters
//!
//! Scripted implementations of the platform ports, used by the test suites
//! and for dry runs of the convergence loop without a live cluster.

pub mod node_pools;
pub mod platform;

pub use node_pools::InMemoryNodePools;
pub use platform::{InMemoryPlatform, PlatformQuery, ScanFixture};
