//! Scripted in-memory node pools.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::models::NodePoolState;
use crate::domain::ports::{NodePoolClient, PlatformError, PlatformResult};

#[derive(Debug, Default)]
struct PoolScript {
    /// Statuses served by successive polls; the last one repeats
    statuses: VecDeque<PlatformResult<NodePoolState>>,
}

impl PoolScript {
    fn poll(&mut self) -> Option<PlatformResult<NodePoolState>> {
        if self.statuses.len() > 1 {
            self.statuses.pop_front()
        } else {
            self.statuses.front().cloned()
        }
    }
}

/// In-memory [`NodePoolClient`] serving scripted pool statuses.
///
/// Polling a pool that was never scripted returns
/// [`PlatformError::NotFound`].
#[derive(Debug, Default)]
pub struct InMemoryNodePools {
    pools: Mutex<HashMap<String, PoolScript>>,
    polls: Mutex<Vec<String>>,
}

impl InMemoryNodePools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pools that report settled on every poll
    pub fn settled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(Self::new(), |pools, name| {
            let name = name.into();
            let state = NodePoolState::settled(name.clone(), 3);
            pools.with_statuses(name, [state])
        })
    }

    /// Script the statuses successive polls of `name` return
    #[must_use]
    pub fn with_statuses<I>(mut self, name: impl Into<String>, statuses: I) -> Self
    where
        I: IntoIterator<Item = NodePoolState>,
    {
        self.pools.get_mut().insert(
            name.into(),
            PoolScript {
                statuses: statuses.into_iter().map(Ok).collect(),
            },
        );
        self
    }

    /// Make the next poll of `name` fail before the scripted statuses resume
    #[must_use]
    pub fn with_transient_error(mut self, name: &str, error: PlatformError) -> Self {
        if let Some(script) = self.pools.get_mut().get_mut(name) {
            script.statuses.push_front(Err(error));
        }
        self
    }

    /// Pool names in the order they were polled
    pub async fn polls(&self) -> Vec<String> {
        self.polls.lock().await.clone()
    }

    /// Pool names in the order they were first polled after each change of
    /// pool, collapsing consecutive polls of the same pool
    pub async fn poll_sequence(&self) -> Vec<String> {
        let mut sequence: Vec<String> = Vec::new();
        for name in self.polls.lock().await.iter() {
            if sequence.last() != Some(name) {
                sequence.push(name.clone());
            }
        }
        sequence
    }
}

#[async_trait]
impl NodePoolClient for InMemoryNodePools {
    async fn pool_status(&self, pool: &str) -> PlatformResult<NodePoolState> {
        self.polls.lock().await.push(pool.to_string());
        let mut pools = self.pools.lock().await;
        pools
            .get_mut(pool)
            .and_then(PoolScript::poll)
            .unwrap_or_else(|| Err(PlatformError::NotFound(format!("node pool {pool}"))))
    }
}
