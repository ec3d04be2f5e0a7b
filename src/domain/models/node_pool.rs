use serde::{Deserialize, Serialize};

/// Rollout status of a named node pool (e.g. `worker`, `master`).
///
/// Read-only from this crate's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolState {
    /// Pool name
    pub name: String,
    /// Machines in the pool
    pub machine_count: u32,
    /// Machines running the latest configuration
    pub updated_machine_count: u32,
    /// Machines ready to run workloads
    pub ready_machine_count: u32,
    /// Machines that failed to apply the configuration
    #[serde(default)]
    pub degraded_machine_count: u32,
}

impl NodePoolState {
    /// A pool whose machines are all updated and ready
    pub fn settled(name: impl Into<String>, machine_count: u32) -> Self {
        Self {
            name: name.into(),
            machine_count,
            updated_machine_count: machine_count,
            ready_machine_count: machine_count,
            degraded_machine_count: 0,
        }
    }

    /// A pool still rolling out configuration to `pending` machines
    pub fn updating(name: impl Into<String>, machine_count: u32, pending: u32) -> Self {
        let updated = machine_count.saturating_sub(pending);
        Self {
            name: name.into(),
            machine_count,
            updated_machine_count: updated,
            ready_machine_count: updated,
            degraded_machine_count: 0,
        }
    }

    /// No configuration update is pending on any machine of the pool
    pub const fn is_settled(&self) -> bool {
        self.updated_machine_count == self.machine_count
            && self.ready_machine_count == self.machine_count
            && self.degraded_machine_count == 0
    }
}
