//! Status entities (§3): workload/trait/component/application health, with
//! the pending-trait invariant threaded through.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkloadStatus {
    pub healthy: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TraitStatus {
    #[serde(rename = "type")]
    pub trait_type: String,
    /// Positional index among same-typed traits on this component; part of
    /// the `(type, index)` dedup key (§4.6, §9).
    pub index: usize,
    pub healthy: bool,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl TraitStatus {
    pub const PENDING_MESSAGE: &'static str = "\u{23f3}";

    pub fn pending(trait_type: impl Into<String>, index: usize) -> Self {
        TraitStatus {
            trait_type: trait_type.into(),
            index,
            healthy: false,
            pending: true,
            message: Self::PENDING_MESSAGE.to_string(),
            outputs: BTreeMap::new(),
        }
    }

    /// Invariant: a pending trait has healthy=false (§3).
    pub fn is_well_formed(&self) -> bool {
        !self.pending || !self.healthy
    }

    /// A trait counts towards component health unless it is pending.
    pub fn counts_as_healthy(&self) -> bool {
        self.pending || self.healthy
    }

    pub fn key(&self) -> (String, usize) {
        (self.trait_type.clone(), self.index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentStatus {
    pub name: String,
    pub workload: WorkloadStatus,
    #[serde(default)]
    pub traits: Vec<TraitStatus>,
}

impl ComponentStatus {
    /// component.healthy = workloadHealthy ∧ ∀t (t.pending ∨ t.healthy)
    pub fn healthy(&self) -> bool {
        self.workload.healthy && self.traits.iter().all(TraitStatus::counts_as_healthy)
    }

    /// No duplicates by (type, index) — invariant 4, §8.
    pub fn has_no_duplicate_traits(&self) -> bool {
        let mut seen = std::collections::BTreeSet::new();
        self.traits.iter().all(|t| seen.insert(t.key()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    #[default]
    Parsing,
    Rendered,
    Dispatching,
    Running,
    RollingOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ApplicationStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub components: Vec<ComponentStatus>,
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
    /// The `ApplicationRevision` name last upserted for this Application
    /// (§4.4, §4.5). Read back on the next reconcile to find the prior
    /// revision's `ResourceTracker` for ownership transfer, before it is
    /// overwritten with the freshly upserted revision's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<String>,
}

impl ApplicationStatus {
    /// application.healthy = ∀c component.healthy (§3, invariant 5 §8).
    pub fn healthy(&self) -> bool {
        self.components.iter().all(ComponentStatus::healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_component() -> ComponentStatus {
        ComponentStatus {
            name: "c1".into(),
            workload: WorkloadStatus {
                healthy: true,
                ..Default::default()
            },
            traits: vec![],
        }
    }

    #[test]
    fn pending_trait_never_makes_component_unhealthy() {
        let mut c = healthy_component();
        c.traits.push(TraitStatus::pending("expose", 0));
        assert!(c.healthy());
    }

    #[test]
    fn unhealthy_non_pending_trait_makes_component_unhealthy() {
        let mut c = healthy_component();
        c.traits.push(TraitStatus {
            trait_type: "expose".into(),
            index: 0,
            healthy: false,
            pending: false,
            message: "service not ready".into(),
            outputs: Default::default(),
        });
        assert!(!c.healthy());
    }

    #[test]
    fn unhealthy_workload_makes_component_unhealthy_even_if_traits_pending() {
        let mut c = healthy_component();
        c.workload.healthy = false;
        c.traits.push(TraitStatus::pending("expose", 0));
        assert!(!c.healthy());
    }

    #[test]
    fn application_healthy_iff_all_components_healthy() {
        let status = ApplicationStatus {
            components: vec![healthy_component()],
            ..Default::default()
        };
        assert!(status.healthy());
    }

    #[test]
    fn duplicate_trait_keys_are_detected() {
        let mut c = healthy_component();
        c.traits.push(TraitStatus::pending("annotations", 0));
        c.traits.push(TraitStatus::pending("annotations", 0));
        assert!(!c.has_no_duplicate_traits());
    }

    #[test]
    fn same_type_different_index_is_not_duplicate() {
        let mut c = healthy_component();
        c.traits.push(TraitStatus::pending("annotations", 0));
        c.traits.push(TraitStatus::pending("annotations", 1));
        assert!(c.has_no_duplicate_traits());
    }
}
