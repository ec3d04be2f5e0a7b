pub mod convergence_loop;
pub mod dependency_resolver;
pub mod findings;
pub mod manual_remediation;
pub mod node_pool_waiter;
pub mod result_aggregator;

pub use convergence_loop::ConvergenceLoop;
pub use dependency_resolver::{DependencyResolver, UnmetDependency};
pub use findings::{summarize_findings, FindingsSummary};
pub use manual_remediation::{ApplyReport, ManualRemediationApplier};
pub use node_pool_waiter::NodePoolSyncWaiter;
pub use result_aggregator::{AggregatedScan, ResultAggregator, SuiteSummary};
