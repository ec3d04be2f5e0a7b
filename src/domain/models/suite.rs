//! Suite, check result and remediation records as read from the platform.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one compliance run configuration (a profile bound to a target).
///
/// Suites are created by setup code and never mutated by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Suite {
    /// Suite name, unique within its namespace
    pub name: String,
    /// Namespace the suite lives in
    pub namespace: String,
}

impl Suite {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Outcome reported for a single check.
///
/// `Error` and `None` mark a check the platform failed to evaluate and count
/// as invalid results. `Manual` and `NotApplicable` are legitimate outcomes of
/// real profiles and are valid alongside `Pass`, `Fail`, `Info` and `Skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Info,
    Skip,
    Manual,
    Error,
    NotApplicable,
    None,
}

impl CheckOutcome {
    /// All outcomes, in reporting order
    pub const ALL: [Self; 8] = [
        Self::Pass,
        Self::Fail,
        Self::Info,
        Self::Skip,
        Self::Manual,
        Self::Error,
        Self::NotApplicable,
        Self::None,
    ];

    /// Whether this outcome is one a healthy scan may produce
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Error | Self::None)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Info => "INFO",
            Self::Skip => "SKIP",
            Self::Manual => "MANUAL",
            Self::Error => "ERROR",
            Self::NotApplicable => "NOT-APPLICABLE",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckOutcome {
    type Err = std::convert::Infallible;

    /// Unknown or empty status strings parse as [`CheckOutcome::None`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            "INFO" => Self::Info,
            "SKIP" => Self::Skip,
            "MANUAL" => Self::Manual,
            "ERROR" => Self::Error,
            "NOT-APPLICABLE" => Self::NotApplicable,
            _ => Self::None,
        })
    }
}

/// One check result belonging to a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check result object
    pub name: String,
    /// Rule the check was generated from
    pub rule: String,
    /// Outcome of the check
    pub outcome: CheckOutcome,
    /// Severity as reported by the platform (e.g. `high`, `medium`, `low`)
    #[serde(default)]
    pub severity: String,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, rule: impl Into<String>, outcome: CheckOutcome) -> Self {
        Self {
            name: name.into(),
            rule: rule.into(),
            outcome,
            severity: String::from("medium"),
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }
}

/// A remediation object belonging to a suite.
///
/// `applied` mirrors the platform's own remediation status and must always be
/// re-read from the platform, never tracked locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRef {
    /// Remediation object name
    pub name: String,
    /// Check this remediation fixes
    #[serde(default)]
    pub rule: String,
    /// The platform cannot apply this remediation on its own
    #[serde(default)]
    pub manual_only: bool,
    /// Names of remediations that must be applied before this one takes effect
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the platform reports the remediation as applied
    #[serde(default)]
    pub applied: bool,
}

impl RemediationRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule: String::new(),
            manual_only: false,
            depends_on: Vec::new(),
            applied: false,
        }
    }

    #[must_use]
    pub fn for_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    #[must_use]
    pub const fn manual(mut self) -> Self {
        self.manual_only = true;
        self
    }

    #[must_use]
    pub fn depending_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    #[must_use]
    pub const fn applied(mut self) -> Self {
        self.applied = true;
        self
    }
}
