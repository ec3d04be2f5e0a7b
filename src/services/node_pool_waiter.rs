//! Blocks until node pools finish rolling out configuration changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{ConvergenceError, ConvergenceResult};
use crate::domain::ports::NodePoolClient;

/// Polls pool status at a fixed interval until the pool reports no pending
/// configuration updates.
pub struct NodePoolSyncWaiter<N: NodePoolClient + ?Sized> {
    client: Arc<N>,
    poll_interval: Duration,
}

impl<N: NodePoolClient + ?Sized> NodePoolSyncWaiter<N> {
    pub const fn new(client: Arc<N>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Wait until `pool` is settled.
    ///
    /// Status errors are treated as transient and polling continues until
    /// the deadline.
    ///
    /// # Returns
    /// * `Ok(())` once the pool is settled
    /// * `Err(ConvergenceError::Timeout)` if `timeout` elapses first
    #[instrument(skip(self))]
    pub async fn wait_for_settled(
        &self,
        pool: &str,
        timeout: Duration,
        iteration: u32,
    ) -> ConvergenceResult<()> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            match self.client.pool_status(pool).await {
                Ok(state) if state.is_settled() => {
                    info!(
                        pool,
                        iteration,
                        machines = state.machine_count,
                        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "node pool settled"
                    );
                    return Ok(());
                }
                Ok(state) => {
                    debug!(
                        pool,
                        iteration,
                        machines = state.machine_count,
                        updated = state.updated_machine_count,
                        ready = state.ready_machine_count,
                        degraded = state.degraded_machine_count,
                        "node pool still updating"
                    );
                }
                Err(err) => {
                    warn!(pool, iteration, error = %err, "failed to read node pool status, retrying");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ConvergenceError::Timeout {
                    operation: format!("node pool {pool} to settle"),
                    iteration,
                    waited: now - started,
                });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Wait on every pool in order, one after another.
    ///
    /// One settled pool says nothing about another, so each is waited on
    /// individually. The first timeout aborts the remaining waits.
    pub async fn wait_for_all<S: AsRef<str> + Sync>(
        &self,
        pools: &[S],
        timeout: Duration,
        iteration: u32,
    ) -> ConvergenceResult<()> {
        for pool in pools {
            self.wait_for_settled(pool.as_ref(), timeout, iteration).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryNodePools;
    use crate::domain::models::NodePoolState;
    use crate::domain::ports::PlatformError;

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_pool_settles() {
        let pools = Arc::new(InMemoryNodePools::new().with_statuses(
            "worker",
            [
                NodePoolState::updating("worker", 3, 3),
                NodePoolState::updating("worker", 3, 1),
                NodePoolState::settled("worker", 3),
            ],
        ));
        let waiter = NodePoolSyncWaiter::new(pools.clone(), Duration::from_secs(10));

        waiter
            .wait_for_settled("worker", Duration::from_secs(600), 1)
            .await
            .unwrap();
        assert_eq!(pools.polls().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_on_stuck_pool() {
        let pools = Arc::new(
            InMemoryNodePools::new().with_statuses("master", [NodePoolState::updating("master", 3, 1)]),
        );
        let waiter = NodePoolSyncWaiter::new(pools, Duration::from_secs(10));

        let err = waiter
            .wait_for_settled("master", Duration::from_secs(60), 4)
            .await
            .unwrap_err();
        match err {
            ConvergenceError::Timeout {
                operation,
                iteration,
                waited,
            } => {
                assert!(operation.contains("master"));
                assert_eq!(iteration, 4);
                assert!(waited >= Duration::from_secs(60));
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let pools = Arc::new(
            InMemoryNodePools::settled(["worker"]).with_transient_error(
                "worker",
                PlatformError::Unavailable("api server restarting".to_string()),
            ),
        );
        let waiter = NodePoolSyncWaiter::new(pools.clone(), Duration::from_secs(1));

        waiter
            .wait_for_settled("worker", Duration::from_secs(30), 1)
            .await
            .unwrap();
        assert_eq!(pools.polls().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_on_pools_in_order() {
        let pools = Arc::new(InMemoryNodePools::settled(["worker", "master"]));
        let waiter = NodePoolSyncWaiter::new(pools.clone(), Duration::from_secs(1));

        waiter
            .wait_for_all(&["master", "worker"], Duration::from_secs(30), 3)
            .await
            .unwrap();
        assert_eq!(pools.polls().await, vec!["master", "worker"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_timeout_stops_remaining_waits() {
        let pools = Arc::new(
            InMemoryNodePools::settled(["master"])
                .with_statuses("worker", [NodePoolState::updating("worker", 2, 2)]),
        );
        let waiter = NodePoolSyncWaiter::new(pools.clone(), Duration::from_secs(5));

        let result = waiter
            .wait_for_all(&["worker", "master"], Duration::from_secs(20), 1)
            .await;
        assert!(matches!(result, Err(ConvergenceError::Timeout { .. })));
        assert!(!pools.polls().await.contains(&"master".to_string()));
    }
}
