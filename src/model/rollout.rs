//! `AppRollout`: the companion object driving source→target migration for
//! one designated component (§3, §4.7). The state machine is a tagged
//! variant (§9) rather than scattered booleans.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RolloutStrategy {
    IncreaseFirst,
}

/// One batch of the rollout plan: the target replica count to reach before
/// advancing (the source is scaled down by the same delta once the target
/// batch is ready).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RolloutBatch {
    pub replicas: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RolloutPlan {
    pub strategy: RolloutStrategy,
    pub batches: Vec<RolloutBatch>,
    pub target_size: i32,
    #[serde(default)]
    pub manual_gating: bool,
}

/// One event in the rollout's observability log (§9).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RolloutEvent {
    pub sequence: u64,
    pub from: String,
    pub to: String,
    pub message: String,
}

/// Tagged-variant rollout state machine. Initial: `LocatingTarget`.
/// Terminal: `Succeeded`, `Failed`, `Finalized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "phase")]
pub enum RolloutState {
    LocatingTarget,
    InBatches { batch_partition: usize },
    Finalizing,
    Succeeded,
    Failed { reason: String },
    Deleting,
    Finalized,
    /// A spec change (new source/target) arrived while a batch was
    /// in-flight (`RollingModified`, §4.7). The current phase completes
    /// against `completing_target` before the new source/target is
    /// adopted and the machine re-enters `LocatingTarget`.
    Abandoning {
        batch_partition: usize,
        completing_target: String,
        next_source: String,
        next_target: String,
    },
}

impl Default for RolloutState {
    fn default() -> Self {
        RolloutState::LocatingTarget
    }
}

impl RolloutState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutState::Succeeded | RolloutState::Failed { .. } | RolloutState::Finalized
        )
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "standard.oam.dev",
    version = "v1alpha1",
    kind = "AppRollout",
    plural = "approllouts",
    namespaced,
    status = "AppRolloutStatus",
    shortname = "approllout"
)]
pub struct AppRolloutSpec {
    pub source_revision: String,
    pub target_revision: String,
    /// Size 1 in the current core (§3).
    #[serde(default)]
    pub component_list: Vec<String>,
    pub rollout_plan: RolloutPlan,
    #[serde(default)]
    pub revert_on_delete: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppRolloutStatus {
    #[serde(default)]
    pub state: RolloutState,
    #[serde(default)]
    pub last_upgraded_target_app_revision: String,
    #[serde(default)]
    pub last_source_app_revision: String,
    #[serde(default)]
    pub observed_target_replicas: i32,
    #[serde(default)]
    pub observed_source_replicas: i32,
    #[serde(default)]
    pub events: Vec<RolloutEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_locating_target() {
        assert_eq!(RolloutState::default(), RolloutState::LocatingTarget);
    }

    #[test]
    fn terminal_states_are_recognized() {
        assert!(RolloutState::Succeeded.is_terminal());
        assert!(RolloutState::Failed { reason: "x".into() }.is_terminal());
        assert!(RolloutState::Finalized.is_terminal());
        assert!(!RolloutState::LocatingTarget.is_terminal());
        assert!(!RolloutState::InBatches { batch_partition: 0 }.is_terminal());
    }
}
