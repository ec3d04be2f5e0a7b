//! Scripted in-memory compliance platform.
//!
//! Each completed scan advances to the next scripted [`ScanFixture`]; once
//! the script runs out the last fixture keeps being served. Calls are
//! recorded so tests can assert which collaborators were invoked.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::models::{CheckOutcome, CheckResult, RemediationRef, Suite};
use crate::domain::ports::{CompliancePlatform, PlatformError, PlatformResult};

/// Platform state after one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanFixture {
    /// Check results stored after the scan
    pub check_results: Vec<CheckResult>,
    /// Remediations generated by the scan
    pub remediations: Vec<RemediationRef>,
}

impl ScanFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` check results with the given outcome, named `<prefix>-<n>`
    #[must_use]
    pub fn with_results(mut self, prefix: &str, outcome: CheckOutcome, count: usize) -> Self {
        let offset = self.check_results.len();
        for i in 0..count {
            let name = format!("{prefix}-{}", offset + i);
            self.check_results
                .push(CheckResult::new(name.clone(), name, outcome));
        }
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: CheckResult) -> Self {
        self.check_results.push(result);
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: RemediationRef) -> Self {
        self.remediations.push(remediation);
        self
    }

    /// Add `count` automatic remediations named `<prefix>-<n>`
    #[must_use]
    pub fn with_remediations(mut self, prefix: &str, count: usize) -> Self {
        for i in 0..count {
            self.remediations
                .push(RemediationRef::new(format!("{prefix}-{i}")));
        }
        self
    }
}

/// Read queries whose failure can be scripted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformQuery {
    /// [`CompliancePlatform::check_results`]
    CheckResults,
    /// [`CompliancePlatform::remediations`]
    Remediations,
}

#[derive(Debug, Default)]
struct PlatformState {
    fixtures: Vec<ScanFixture>,
    /// Index of the fixture currently served, `None` before any scan finished
    current: Option<usize>,
    scans_triggered: u32,
    scans_completed: u32,
    /// Clock reading at every scan trigger
    triggered_at: Vec<Instant>,
    applied: Vec<String>,
    rejected: HashSet<String>,
    stalled: bool,
    catalog: Option<HashSet<String>>,
    query_calls: HashMap<PlatformQuery, u32>,
    /// Call number from which a query starts failing, and the error it returns
    failing: HashMap<PlatformQuery, (u32, PlatformError)>,
}

impl PlatformState {
    fn fixture(&self) -> Option<&ScanFixture> {
        self.current.and_then(|i| self.fixtures.get(i))
    }

    fn record_query(&mut self, query: PlatformQuery) -> PlatformResult<()> {
        let calls = self.query_calls.entry(query).or_default();
        *calls += 1;
        let call = *calls;
        match self.failing.get(&query) {
            Some((from, err)) if call >= *from => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

/// In-memory [`CompliancePlatform`] serving a single suite.
#[derive(Debug)]
pub struct InMemoryPlatform {
    suite: Suite,
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new(suite: Suite) -> Self {
        Self {
            suite,
            state: Mutex::new(PlatformState::default()),
        }
    }

    /// Script the state the next completed scan produces
    #[must_use]
    pub fn with_scan(mut self, fixture: ScanFixture) -> Self {
        self.state.get_mut().fixtures.push(fixture);
        self
    }

    /// Make [`apply_remediation`](CompliancePlatform::apply_remediation)
    /// reject the named remediation
    #[must_use]
    pub fn rejecting(mut self, remediation: &str) -> Self {
        self.state.get_mut().rejected.insert(remediation.to_string());
        self
    }

    /// Scans never finish; every wait times out
    #[must_use]
    pub fn stalled(mut self) -> Self {
        self.state.get_mut().stalled = true;
        self
    }

    /// Override the rule catalog (defaults to every rule seen in any fixture)
    #[must_use]
    pub fn with_catalog<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.get_mut().catalog = Some(rules.into_iter().map(Into::into).collect());
        self
    }

    /// Make `query` fail with `error` from its `call`-th invocation on
    /// (counting from 1)
    #[must_use]
    pub fn failing_from(mut self, query: PlatformQuery, call: u32, error: PlatformError) -> Self {
        self.state.get_mut().failing.insert(query, (call, error));
        self
    }

    pub async fn scans_triggered(&self) -> u32 {
        self.state.lock().await.scans_triggered
    }

    pub async fn scans_completed(&self) -> u32 {
        self.state.lock().await.scans_completed
    }

    /// Clock reading at every scan trigger, in order
    pub async fn triggered_at(&self) -> Vec<Instant> {
        self.state.lock().await.triggered_at.clone()
    }

    /// How often `query` was issued, failed calls included
    pub async fn query_calls(&self, query: PlatformQuery) -> u32 {
        self.state
            .lock()
            .await
            .query_calls
            .get(&query)
            .copied()
            .unwrap_or(0)
    }

    /// Names of remediations applied through the port, in order
    pub async fn applied(&self) -> Vec<String> {
        self.state.lock().await.applied.clone()
    }

    fn check_suite(&self, suite: &Suite) -> PlatformResult<()> {
        if *suite == self.suite {
            Ok(())
        } else {
            Err(PlatformError::SuiteNotFound(suite.to_string()))
        }
    }
}

#[async_trait]
impl CompliancePlatform for InMemoryPlatform {
    async fn trigger_scan(&self, suite: &Suite) -> PlatformResult<()> {
        self.check_suite(suite)?;
        let mut state = self.state.lock().await;
        state.scans_triggered += 1;
        state.triggered_at.push(Instant::now());
        Ok(())
    }

    async fn wait_for_suite_done(&self, suite: &Suite, timeout: Duration) -> PlatformResult<()> {
        self.check_suite(suite)?;
        let mut state = self.state.lock().await;
        if state.stalled || state.fixtures.is_empty() {
            return Err(PlatformError::Timeout {
                operation: format!("suite {suite} to finish scanning"),
                waited: timeout,
            });
        }
        if state.scans_completed < state.scans_triggered {
            state.scans_completed = state.scans_triggered;
            let last = state.fixtures.len() - 1;
            let next = state.current.map_or(0, |i| (i + 1).min(last));
            state.current = Some(next);
        }
        Ok(())
    }

    async fn check_results(&self, suite: &Suite) -> PlatformResult<Vec<CheckResult>> {
        self.check_suite(suite)?;
        let mut state = self.state.lock().await;
        state.record_query(PlatformQuery::CheckResults)?;
        Ok(state
            .fixture()
            .map(|f| f.check_results.clone())
            .unwrap_or_default())
    }

    async fn remediations(&self, suite: &Suite) -> PlatformResult<Vec<RemediationRef>> {
        self.check_suite(suite)?;
        let mut state = self.state.lock().await;
        state.record_query(PlatformQuery::Remediations)?;
        Ok(state
            .fixture()
            .map(|f| f.remediations.clone())
            .unwrap_or_default())
    }

    async fn rule_catalog(&self, suite: &Suite) -> PlatformResult<HashSet<String>> {
        self.check_suite(suite)?;
        let state = self.state.lock().await;
        if let Some(catalog) = &state.catalog {
            return Ok(catalog.clone());
        }
        Ok(state
            .fixtures
            .iter()
            .flat_map(|f| f.check_results.iter().map(|r| r.rule.clone()))
            .collect())
    }

    async fn apply_remediation(&self, remediation: &RemediationRef) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        if state.rejected.contains(&remediation.name) {
            return Err(PlatformError::Rejected(format!(
                "remediation {} cannot be applied",
                remediation.name
            )));
        }
        let current = state.current;
        let found = current
            .and_then(|i| state.fixtures.get_mut(i))
            .and_then(|f| f.remediations.iter_mut().find(|r| r.name == remediation.name));
        match found {
            Some(stored) => stored.applied = true,
            None => return Err(PlatformError::NotFound(remediation.name.clone())),
        }
        state.applied.push(remediation.name.clone());
        Ok(())
    }
}
