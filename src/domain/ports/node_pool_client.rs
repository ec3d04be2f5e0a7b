use async_trait::async_trait;

use super::errors::PlatformResult;
use crate::domain::models::NodePoolState;

/// Read access to node pool rollout status
#[async_trait]
pub trait NodePoolClient: Send + Sync {
    /// Current status of the named pool
    async fn pool_status(&self, pool: &str) -> PlatformResult<NodePoolState>;
}
