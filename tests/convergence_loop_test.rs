//! End-to-end runs of the convergence loop against in-memory platforms.
//!
//! Time is paused, so grace periods and pool polling elapse instantly while
//! the clock still advances by exactly the time waited.

mod common;

use std::sync::Arc;

use tokio::time::Instant;

use common::{convergence_loop, scan, settled_pools, setup_test_logging, suite};
use compliance_convergence::adapters::memory::{InMemoryNodePools, InMemoryPlatform, PlatformQuery};
use compliance_convergence::{
    CheckOutcome, Config, ConvergenceError, ConvergenceOutcome, LoopPhase, MismatchKind, NodePoolState,
    PlatformError, RemediationRef, Suite,
};

/// Seconds from `started` to each scan trigger
async fn trigger_offsets(platform: &InMemoryPlatform, started: Instant) -> Vec<u64> {
    platform
        .triggered_at()
        .await
        .iter()
        .map(|t| t.duration_since(started).as_secs())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_dependent_remediation_needs_two_rescans() {
    setup_test_logging();

    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            // After scan 1: rem-c waits on rem-a
            .with_scan(
                scan(5, 15)
                    .with_remediation(RemediationRef::new("rem-a"))
                    .with_remediation(RemediationRef::new("rem-b"))
                    .with_remediation(RemediationRef::new("rem-c").depending_on("rem-a")),
            )
            // After scan 2: rem-a is in, rem-c can apply now
            .with_scan(
                scan(3, 17)
                    .with_remediation(RemediationRef::new("rem-a").applied())
                    .with_remediation(RemediationRef::new("rem-b").applied())
                    .with_remediation(RemediationRef::new("rem-c").depending_on("rem-a")),
            )
            .with_scan(
                scan(1, 19)
                    .with_remediation(RemediationRef::new("rem-a").applied())
                    .with_remediation(RemediationRef::new("rem-b").applied())
                    .with_remediation(
                        RemediationRef::new("rem-c").depending_on("rem-a").applied(),
                    ),
            ),
    );
    let pools = settled_pools();
    let convergence = convergence_loop(&platform, &pools, &Config::default());

    let started = Instant::now();
    let report = convergence.run(&suite()).await.unwrap();

    // 30s for remediations, then 30s rescan grace and 45s for dependent
    // services after the non-final scan 2
    assert_eq!(started.elapsed().as_secs(), 105);
    assert_eq!(trigger_offsets(&platform, started).await, vec![0, 30, 105]);

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert!(report.passed(), "unexpected mismatches: {:?}", report.mismatches);
    assert_eq!(report.rescans, 2);
    assert!(!report.late_unmet_dependencies);

    assert_eq!(report.initial.remediations, 3);
    assert_eq!(report.initial.failures, 5);
    assert_eq!(report.initial.check_results, 20);
    assert_eq!(report.initial.invalid, 0);

    let final_snapshot = report.final_snapshot.as_ref().unwrap();
    assert_eq!(final_snapshot.iteration, 3);
    assert_eq!(final_snapshot.failures, 1);
    assert_eq!(final_snapshot.check_results, 20);

    assert_eq!(platform.scans_triggered().await, 3);
    assert!(report.phases.contains(&LoopPhase::NeedsMoreScans { iteration: 2 }));
    assert!(report.phases.contains(&LoopPhase::Converged { iteration: 3 }));
    assert_eq!(report.phases.last(), Some(&LoopPhase::Verified));

    // Settled once after remediation and once before scan 3
    assert_eq!(
        pools.poll_sequence().await,
        vec!["worker", "master", "worker", "master"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_remediations_are_applied_before_rescan() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(
                scan(4, 6)
                    .with_remediation(RemediationRef::new("manual-a").manual())
                    .with_remediation(RemediationRef::new("manual-b").manual()),
            )
            .with_scan(
                scan(0, 10)
                    .with_remediation(RemediationRef::new("manual-a").manual().applied())
                    .with_remediation(RemediationRef::new("manual-b").manual().applied()),
            ),
    );
    let pools = settled_pools();
    let convergence = convergence_loop(&platform, &pools, &Config::default());

    let started = Instant::now();
    let report = convergence.run(&suite()).await.unwrap();

    // 30s for remediations, 60s before and 30s after the manual apply
    assert_eq!(started.elapsed().as_secs(), 120);
    assert_eq!(trigger_offsets(&platform, started).await, vec![0, 120]);

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert!(report.passed(), "unexpected mismatches: {:?}", report.mismatches);
    assert_eq!(report.initial.remediations, 0);
    assert_eq!(report.initial.manual_remediations.len(), 2);
    assert_eq!(platform.applied().await, vec!["manual-a", "manual-b"]);
    assert_eq!(report.rescans, 1);

    let settling = report
        .phases
        .iter()
        .filter(|p| **p == LoopPhase::Settling { iteration: 1 })
        .count();
    assert_eq!(settling, 2, "pools settle before and after manual remediation");

    let applied_at = report
        .phases
        .iter()
        .position(|p| *p == LoopPhase::ManualRemediationsApplied)
        .unwrap();
    let rescan_at = report
        .phases
        .iter()
        .position(|p| *p == LoopPhase::Rescanning { iteration: 2 })
        .unwrap();
    assert!(applied_at < rescan_at);

    assert_eq!(
        pools.poll_sequence().await,
        vec!["worker", "master", "worker", "master"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_manual_remediation_is_a_mismatch() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(
                scan(2, 8)
                    .with_remediation(RemediationRef::new("manual-a").manual())
                    .with_remediation(RemediationRef::new("manual-b").manual()),
            )
            .with_scan(scan(1, 9))
            .rejecting("manual-a"),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert!(!report.passed());
    let failed: Vec<_> = report
        .mismatches_of(MismatchKind::ManualApplyFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].iteration, 1);
    assert!(failed[0].message.contains("manual-a"));
    // The rest of the set is still applied
    assert_eq!(platform.applied().await, vec!["manual-b"]);
}

#[tokio::test(start_paused = true)]
async fn test_manual_and_not_applicable_results_are_valid() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite()).with_scan(
            scan(0, 5)
                .with_results("manual", CheckOutcome::Manual, 3)
                .with_results("na", CheckOutcome::NotApplicable, 2),
        ),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::NoRemediationsNeeded);
    assert_eq!(report.initial.check_results, 10);
    assert_eq!(report.initial.invalid, 0);
    assert!(report.passed(), "unexpected mismatches: {:?}", report.mismatches);
}

#[tokio::test(start_paused = true)]
async fn test_dependency_cycle_exhausts_rescans() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite()).with_scan(
            scan(3, 7)
                .with_remediation(RemediationRef::new("rem-a").depending_on("rem-b"))
                .with_remediation(RemediationRef::new("rem-b").depending_on("rem-a")),
        ),
    );
    let pools = settled_pools();
    let convergence = convergence_loop(&platform, &pools, &Config::default());

    let err = convergence.run(&suite()).await.unwrap_err();

    match &err {
        ConvergenceError::ConvergenceExhausted { ceiling, cycle } => {
            assert_eq!(*ceiling, 5);
            assert_eq!(
                cycle.as_deref(),
                Some(&["rem-a".to_string(), "rem-b".to_string()][..])
            );
        }
        other => panic!("Expected ConvergenceExhausted, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("maximum number of re-scans"));
    assert!(message.contains("rem-a -> rem-b"));

    // The first scan plus rescans 2, 3 and 4
    assert_eq!(platform.scans_triggered().await, 4);
}

#[tokio::test(start_paused = true)]
async fn test_missing_dependency_exhausts_without_cycle() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite()).with_scan(
            scan(1, 1).with_remediation(RemediationRef::new("rem-a").depending_on("rem-gone")),
        ),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let err = convergence.run(&suite()).await.unwrap_err();

    assert!(matches!(
        err,
        ConvergenceError::ConvergenceExhausted { ceiling: 5, cycle: None }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_changed_check_count_is_recorded() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(4, 6).with_remediations("rem", 2))
            .with_scan(scan(0, 8)),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert_eq!(report.mismatches.len(), 1);
    let mismatch = &report.mismatches[0];
    assert_eq!(mismatch.kind, MismatchKind::CheckCountChanged);
    assert_eq!(mismatch.expected, "10");
    assert_eq!(mismatch.measured, "8");
    assert_eq!(mismatch.iteration, 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_results_after_remediation() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(4, 6).with_remediations("rem", 1))
            .with_scan(scan(1, 8).with_results("err", CheckOutcome::Error, 1)),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    let kinds: Vec<_> = report.mismatches.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MismatchKind::InvalidResults]);
    assert_eq!(report.final_snapshot.unwrap().invalid, 1);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_rule_is_flagged_in_final_scan_only() {
    let catalog: Vec<String> = (0..9).map(|i| format!("pass-{i}")).collect();
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(4, 6).with_remediations("rem", 1))
            .with_scan(scan(0, 10))
            .with_catalog(catalog),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    let missing: Vec<_> = report.mismatches_of(MismatchKind::MissingRule).collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].iteration, 2);
    assert!(missing[0].message.contains("pass-9"));
}

#[tokio::test(start_paused = true)]
async fn test_remediation_surfaced_by_final_scan_is_reported() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(2, 8).with_remediations("rem", 1))
            .with_scan(
                scan(0, 10)
                    .with_remediation(RemediationRef::new("rem-0").applied())
                    .with_remediation(RemediationRef::new("rem-late").depending_on("rem-new")),
            ),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert!(report.late_unmet_dependencies);
    assert_eq!(report.rescans, 1);
    assert_eq!(platform.scans_triggered().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_pool_that_never_settles_times_out() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite()).with_scan(scan(2, 8).with_remediations("rem", 1)),
    );
    let pools = Arc::new(
        InMemoryNodePools::new()
            .with_statuses("worker", [NodePoolState::updating("worker", 3, 1)])
            .with_statuses("master", [NodePoolState::settled("master", 3)]),
    );
    let convergence = convergence_loop(&platform, &pools, &Config::default());

    let err = convergence.run(&suite()).await.unwrap_err();

    match err {
        ConvergenceError::Timeout {
            operation,
            iteration,
            ..
        } => {
            assert!(operation.contains("worker"), "operation was {operation}");
            assert_eq!(iteration, 1);
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    // Fail-fast: the second pool is never waited on
    assert!(!pools.polls().await.iter().any(|p| p == "master"));
    assert_eq!(platform.scans_triggered().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pools_settle_after_rollout_and_transient_errors() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(2, 8).with_remediations("rem", 1))
            .with_scan(scan(0, 10)),
    );
    let pools = Arc::new(
        InMemoryNodePools::new()
            .with_statuses(
                "worker",
                [
                    NodePoolState::updating("worker", 3, 2),
                    NodePoolState::updating("worker", 3, 1),
                    NodePoolState::settled("worker", 3),
                ],
            )
            .with_transient_error(
                "worker",
                PlatformError::Unavailable("api server restarting".to_string()),
            )
            .with_statuses("master", [NodePoolState::settled("master", 3)]),
    );
    let convergence = convergence_loop(&platform, &pools, &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert!(report.passed());
    let worker_polls = pools.polls().await.iter().filter(|p| *p == "worker").count();
    assert_eq!(worker_polls, 4);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_suite_is_fatal_setup_error() {
    let platform = Arc::new(InMemoryPlatform::new(suite()).with_scan(scan(0, 3)));
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let err = convergence
        .run(&Suite::new("missing", "openshift-compliance"))
        .await
        .unwrap_err();

    match err {
        ConvergenceError::SetupFatal { suite, .. } => {
            assert_eq!(suite, "openshift-compliance/missing");
        }
        other => panic!("Expected SetupFatal, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_grace_periods_still_converge() {
    let mut config = Config::default();
    config.convergence.remediation_grace_secs = 0;
    config.convergence.rescan_grace_secs = 0;
    config.convergence.dependent_service_grace_secs = 0;

    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(3, 7).with_remediations("rem", 3))
            .with_scan(scan(0, 10)),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &config);

    let started = Instant::now();
    let report = convergence.run(&suite()).await.unwrap();
    assert_eq!(started.elapsed().as_secs(), 0);
    assert!(report.passed());
    assert_eq!(report.rescans, 1);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["outcome"], "verified");
    assert_eq!(json["final_snapshot"]["iteration"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_rescan_waits_for_rolling_pool_to_settle() {
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(2, 8).with_remediations("rem", 1))
            .with_scan(scan(0, 10)),
    );
    let pools = Arc::new(
        InMemoryNodePools::new()
            .with_statuses(
                "worker",
                [
                    NodePoolState::updating("worker", 3, 2),
                    NodePoolState::updating("worker", 3, 1),
                    NodePoolState::settled("worker", 3),
                ],
            )
            .with_statuses("master", [NodePoolState::settled("master", 3)]),
    );
    let convergence = convergence_loop(&platform, &pools, &Config::default());

    let started = Instant::now();
    let report = convergence.run(&suite()).await.unwrap();

    assert!(report.passed());
    // 30s remediation grace plus two 10s polls of the rolling worker pool
    assert_eq!(trigger_offsets(&platform, started).await, vec![0, 50]);
    assert_eq!(
        pools.poll_sequence().await,
        vec!["worker", "master"],
        "every pool settles before the rescan"
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_dependency_recheck_keeps_converged_run() {
    // Remediations are read twice per snapshot and once before scan 2, so
    // the 6th read is the re-check after the final scan
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(2, 8).with_remediations("rem", 1))
            .with_scan(scan(0, 10))
            .failing_from(
                PlatformQuery::Remediations,
                6,
                PlatformError::Unavailable("api server restarting".to_string()),
            ),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert!(report.passed(), "unexpected mismatches: {:?}", report.mismatches);
    assert!(!report.late_unmet_dependencies);
    assert_eq!(report.final_snapshot.unwrap().failures, 0);
    assert_eq!(platform.query_calls(PlatformQuery::Remediations).await, 6);
}

#[tokio::test(start_paused = true)]
async fn test_failed_findings_summary_keeps_converged_run() {
    // Check results are read three times per snapshot and once per findings
    // summary, so the 8th read is the summary after verification
    let platform = Arc::new(
        InMemoryPlatform::new(suite())
            .with_scan(scan(4, 6).with_remediations("rem", 1))
            .with_scan(scan(0, 8))
            .failing_from(
                PlatformQuery::CheckResults,
                8,
                PlatformError::Unavailable("api server restarting".to_string()),
            ),
    );
    let convergence = convergence_loop(&platform, &settled_pools(), &Config::default());

    let report = convergence.run(&suite()).await.unwrap();

    assert_eq!(report.outcome, ConvergenceOutcome::Verified);
    assert_eq!(report.phases.last(), Some(&LoopPhase::Verified));
    // Mismatches recorded before the failed summary survive
    let kinds: Vec<_> = report.mismatches.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MismatchKind::CheckCountChanged]);
    assert_eq!(platform.query_calls(PlatformQuery::CheckResults).await, 8);
}
