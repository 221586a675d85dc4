//! Definition CRDs: immutable (per-revision) bundles of template + metadata
//! that the registry resolves and the renderer consumes.
//!
//! The template body itself is opaque here — compiling it into manifests is
//! the job of an external template runtime (out of scope, §1).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::placement::Condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum DefinitionKind {
    Component,
    Trait,
    Policy,
    WorkflowStep,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DefinitionKind::Component => "ComponentDefinition",
            DefinitionKind::Trait => "TraitDefinition",
            DefinitionKind::Policy => "PolicyDefinition",
            DefinitionKind::WorkflowStep => "WorkflowStepDefinition",
        };
        f.write_str(s)
    }
}

/// PreDispatch (default) or PostDispatch (deferred until workload readiness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum DispatchStage {
    #[default]
    PreDispatch,
    PostDispatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PatchStrategy {
    StrategicMerge,
    JsonMerge,
    JsonPatch,
}

/// A health policy is, in the full system, a CUE expression evaluated
/// against live outputs. The template runtime that compiles/evaluates it is
/// out of scope; this crate treats it as a name plus an optional custom
/// expression body, and ships one built-in evaluator for the common
/// workload kinds (see `crate::health`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind")]
pub enum HealthPolicy {
    /// Always reports healthy once applied (e.g. most auxiliary traits).
    AlwaysHealthy,
    /// Use the built-in readiness check for a known workload shape.
    Builtin(BuiltinHealthCheck),
    /// An opaque expression for the external template runtime to evaluate.
    Custom { expression: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BuiltinHealthCheck {
    DeploymentReady,
    StatefulSetReady,
    DaemonSetReady,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        HealthPolicy::AlwaysHealthy
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DefinitionMetadata {
    #[serde(default)]
    pub applies_to_workloads: BTreeSet<String>,
    #[serde(default)]
    pub pod_disruptive: bool,
    #[serde(default)]
    pub stage: DispatchStage,
    #[serde(default)]
    pub health_policy: HealthPolicy,
    /// Template used to format a human-readable status message; opaque.
    #[serde(default)]
    pub status_formatter: Option<String>,
    #[serde(default)]
    pub placement: Option<PlacementSpec>,
    /// Structural parameter validation: fields that must be present in the
    /// user parameter bag (§4.2).
    #[serde(default)]
    pub required_parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlacementSpec {
    #[serde(default)]
    pub run_on: Option<Condition>,
    #[serde(default)]
    pub not_run_on: Option<Condition>,
}

impl PlacementSpec {
    /// Reject constructs whose constraints can never be satisfied:
    /// an identical condition in both slots, or a runOn that is a subset
    /// of notRunOn (spec.md §4.1).
    pub fn validate(&self) -> Result<(), String> {
        match (&self.run_on, &self.not_run_on) {
            (Some(run), Some(not)) if run == not => {
                Err("runOn and notRunOn express the identical condition".to_string())
            }
            (Some(run), Some(not)) if run.implies(not) => {
                Err("runOn is a subset of notRunOn; constraint is unsatisfiable".to_string())
            }
            _ => Ok(()),
        }
    }
}

macro_rules! definition_crd {
    ($spec_name:ident, $crd_name:literal, $plural:literal) => {
        #[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
        #[kube(
            group = "core.oam.dev",
            version = "v1beta1",
            kind = $crd_name,
            plural = $plural,
            namespaced
        )]
        pub struct $spec_name {
            pub template: String,
            #[serde(default)]
            pub metadata_spec: DefinitionMetadata,
        }
    };
}

definition_crd!(
    ComponentDefinitionSpec,
    "ComponentDefinition",
    "componentdefinitions"
);
definition_crd!(TraitDefinitionSpec, "TraitDefinition", "traitdefinitions");
definition_crd!(
    PolicyDefinitionSpec,
    "PolicyDefinition",
    "policydefinitions"
);
definition_crd!(
    WorkflowStepDefinitionSpec,
    "WorkflowStepDefinition",
    "workflowstepdefinitions"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::{Condition, Label, Op};

    #[test]
    fn identical_run_on_not_run_on_is_rejected() {
        let cond = Condition::Label(Label {
            key: "provider".into(),
            op: Op::Eq,
            values: vec!["aws".into()],
        });
        let spec = PlacementSpec {
            run_on: Some(cond.clone()),
            not_run_on: Some(cond),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn disjoint_constraints_are_accepted() {
        let run_on = Condition::Label(Label {
            key: "provider".into(),
            op: Op::Eq,
            values: vec!["aws".into()],
        });
        let not_run_on = Condition::Label(Label {
            key: "provider".into(),
            op: Op::Eq,
            values: vec!["gcp".into()],
        });
        let spec = PlacementSpec {
            run_on: Some(run_on),
            not_run_on: Some(not_run_on),
        };
        assert!(spec.validate().is_ok());
    }
}
