use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::errors::{ConvergenceError, ConvergenceResult};
use crate::domain::models::{RemediationRef, Suite};
use crate::domain::ports::CompliancePlatform;

/// A remediation waiting on another remediation that is not applied yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetDependency {
    /// Remediation that is waiting
    pub remediation: String,
    /// Remediation it waits on
    pub dependency: String,
}

/// Service deciding whether another scan cycle is needed before results can
/// be trusted
///
/// Applied status is always re-read from the platform: its remediation
/// controller converges in the background, so answers must not be cached
/// across a wait.
pub struct DependencyResolver<P: CompliancePlatform + ?Sized> {
    platform: Arc<P>,
}

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                // Cycle detected
                if let Some(cycle_start) = path.iter().position(|&name| name == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

/// Dependencies of `rem` that are not applied in `applied`.
///
/// A dependency missing from the set entirely counts as unmet.
fn unmet_of<'a>(
    rem: &'a RemediationRef,
    applied: &'a HashMap<&str, bool>,
) -> impl Iterator<Item = &'a String> + 'a {
    rem.depends_on
        .iter()
        .filter(|dep| !applied.get(dep.as_str()).copied().unwrap_or(false))
}

fn applied_by_name(remediations: &[RemediationRef]) -> HashMap<&str, bool> {
    remediations
        .iter()
        .map(|r| (r.name.as_str(), r.applied))
        .collect()
}

/// Every dependency declared in `remediations` that is not applied.
///
/// A dependency missing from the set entirely counts as unmet.
pub fn unmet_in(remediations: &[RemediationRef]) -> Vec<UnmetDependency> {
    let applied = applied_by_name(remediations);

    remediations
        .iter()
        .flat_map(|rem| {
            unmet_of(rem, &applied)
                .map(|dep| UnmetDependency {
                    remediation: rem.name.clone(),
                    dependency: dep.clone(),
                })
        })
        .collect()
}

/// Detect a circular dependency among remediations.
///
/// Returns the names along the cycle, in dependency order.
pub fn detect_cycle(remediations: &[RemediationRef]) -> Option<Vec<String>> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();

    // Build adjacency list, sorted so the reported cycle is stable
    let mut sorted: Vec<&RemediationRef> = remediations.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for rem in &sorted {
        graph
            .entry(rem.name.as_str())
            .or_default()
            .extend(rem.depends_on.iter().map(String::as_str));
    }

    // DFS-based cycle detection
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for rem in &sorted {
        let name = rem.name.as_str();
        if !visited.contains(name)
            && detect_cycle_util(name, &graph, &mut visited, &mut rec_stack, &mut path)
        {
            return Some(path.into_iter().map(str::to_string).collect());
        }
    }

    None
}

impl<P: CompliancePlatform + ?Sized> DependencyResolver<P> {
    pub const fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Whether any remediation still waits on an unapplied dependency.
    ///
    /// Stops at the first unmet dependency found.
    #[instrument(skip(self, suite), fields(suite = %suite))]
    pub async fn has_unmet_dependencies(&self, suite: &Suite, iteration: u32) -> ConvergenceResult<bool> {
        let remediations = self.current_remediations(suite, iteration).await?;
        let applied = applied_by_name(&remediations);

        let unmet = remediations.iter().find_map(|rem| {
            unmet_of(rem, &applied)
                .next()
                .map(|dep| (rem.name.as_str(), dep.as_str()))
        });

        if let Some((remediation, dependency)) = unmet {
            debug!(iteration, remediation, dependency, "remediation has unmet dependency");
        }
        Ok(unmet.is_some())
    }

    /// Every unmet dependency of the suite's current remediations
    pub async fn unmet_dependencies(
        &self,
        suite: &Suite,
        iteration: u32,
    ) -> ConvergenceResult<Vec<UnmetDependency>> {
        let remediations = self.current_remediations(suite, iteration).await?;
        Ok(unmet_in(&remediations))
    }

    /// Dependency cycle among the suite's current remediations, if any
    pub async fn find_cycle(&self, suite: &Suite, iteration: u32) -> ConvergenceResult<Option<Vec<String>>> {
        let remediations = self.current_remediations(suite, iteration).await?;
        Ok(detect_cycle(&remediations))
    }

    async fn current_remediations(
        &self,
        suite: &Suite,
        iteration: u32,
    ) -> ConvergenceResult<Vec<RemediationRef>> {
        self.platform
            .remediations(suite)
            .await
            .map_err(|e| ConvergenceError::from_platform(&suite.to_string(), iteration, e))
    }
}
