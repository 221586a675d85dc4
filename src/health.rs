//! Health Collector (§4.6): per-reconcile `WorkloadStatus`/`TraitStatus`
//! aggregation, including the pending-trait gate for PostDispatch traits
//! whose workload has not yet reported ready.
//!
//! Pure: takes the rendered plan, the resolved definitions pinned to the
//! revision, and whatever the Dispatcher observed this reconcile; touches no
//! cluster state itself.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::definition::{BuiltinHealthCheck, DefinitionKind, DispatchStage, HealthPolicy};
use crate::model::revision::{ManifestPlan, ResolvedDefinition};
use crate::model::status::{ApplicationStatus, ComponentStatus, Phase, TraitStatus, WorkloadStatus};

/// What the Dispatcher (§4.5) observed about one trait patch this reconcile.
#[derive(Debug, Clone, Default)]
pub struct TraitDispatchRecord {
    pub trait_type: String,
    pub index: usize,
    pub applied: bool,
    /// False when placement filtering left no eligible cluster (§4.5).
    pub eligible: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ComponentDispatchRecord {
    pub workload_applied: bool,
    pub workload_eligible: bool,
    pub trait_records: Vec<TraitDispatchRecord>,
}

impl ComponentDispatchRecord {
    fn trait_record(&self, trait_type: &str, index: usize) -> Option<&TraitDispatchRecord> {
        self.trait_records
            .iter()
            .find(|r| r.trait_type == trait_type && r.index == index)
    }
}

/// Per-component dispatch observations, keyed by component name.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub components: BTreeMap<String, ComponentDispatchRecord>,
}

/// Evaluate a single workload (or trait target) against its definition's
/// health policy. `live` is `None` when the object has not been observed
/// (not yet applied, or applied this reconcile but not re-fetched).
pub fn evaluate_workload(policy: &HealthPolicy, live: Option<&Value>) -> WorkloadStatus {
    match policy {
        HealthPolicy::AlwaysHealthy => WorkloadStatus {
            healthy: true,
            message: String::new(),
            outputs: BTreeMap::new(),
        },
        HealthPolicy::Builtin(check) => evaluate_builtin(*check, live),
        // The expression language itself is an external collaborator (§1
        // Non-goals); this crate reports the honest state rather than
        // guessing at an evaluation it cannot perform.
        HealthPolicy::Custom { .. } => WorkloadStatus {
            healthy: false,
            message: "awaiting external template-runtime health evaluation".to_string(),
            outputs: BTreeMap::new(),
        },
    }
}

fn evaluate_builtin(check: BuiltinHealthCheck, live: Option<&Value>) -> WorkloadStatus {
    let Some(live) = live else {
        return WorkloadStatus {
            healthy: false,
            message: "not yet observed".to_string(),
            outputs: BTreeMap::new(),
        };
    };
    let status = live.get("status");
    let (ready, desired, unit) = match check {
        BuiltinHealthCheck::DeploymentReady | BuiltinHealthCheck::StatefulSetReady => {
            let ready = status
                .and_then(|s| s.get("readyReplicas"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let desired = live
                .get("spec")
                .and_then(|s| s.get("replicas"))
                .and_then(Value::as_i64)
                .unwrap_or(1);
            (ready, desired, "replicas")
        }
        BuiltinHealthCheck::DaemonSetReady => {
            let ready = status
                .and_then(|s| s.get("numberReady"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let desired = status
                .and_then(|s| s.get("desiredNumberScheduled"))
                .and_then(Value::as_i64)
                .unwrap_or(1);
            (ready, desired, "scheduled replicas")
        }
    };
    if desired > 0 && ready >= desired {
        WorkloadStatus {
            healthy: true,
            message: String::new(),
            outputs: BTreeMap::new(),
        }
    } else {
        WorkloadStatus {
            healthy: false,
            message: format!("{ready}/{desired} {unit} ready"),
            outputs: BTreeMap::new(),
        }
    }
}

/// §4.6, steps 1-5. `live_workloads` holds the primary workload object last
/// observed for each component, when the Dispatcher applied (and could
/// re-read) it this reconcile.
pub fn collect(
    plan: &ManifestPlan,
    resolved_definitions: &[ResolvedDefinition],
    live_workloads: &BTreeMap<String, Value>,
    outcome: &DispatchOutcome,
    multi_stage_apply_enabled: bool,
) -> ApplicationStatus {
    let defs: BTreeMap<(DefinitionKind, &str), &ResolvedDefinition> = resolved_definitions
        .iter()
        .map(|d| ((d.kind, d.name.as_str()), d))
        .collect();

    let mut components = Vec::with_capacity(plan.components.len());
    let no_record = ComponentDispatchRecord::default();

    for manifest in &plan.components {
        let record = outcome
            .components
            .get(&manifest.component_name)
            .unwrap_or(&no_record);

        let component_health_policy = defs
            .get(&(DefinitionKind::Component, manifest.component_type.as_str()))
            .map(|d| d.metadata.health_policy.clone())
            .unwrap_or_default();

        let workload = if !record.workload_eligible {
            WorkloadStatus {
                healthy: false,
                message: "no eligible cluster for placement".to_string(),
                outputs: BTreeMap::new(),
            }
        } else {
            let live = live_workloads.get(&manifest.component_name);
            evaluate_workload(&component_health_policy, live)
        };

        // §4.6 step 2-4: every trait in the rendered plan gets an entry,
        // rebuilt deterministically in plan order; none are ever filtered
        // out of the list (step 5's "scan for unprocessed" is a no-op here
        // because nothing is dropped from the loop below).
        let mut traits = Vec::with_capacity(manifest.traits.len());
        for t in &manifest.traits {
            let trait_record = record.trait_record(&t.trait_type, t.index);
            let status = if !record.workload_eligible || trait_record.is_some_and(|r| !r.eligible) {
                TraitStatus {
                    trait_type: t.trait_type.clone(),
                    index: t.index,
                    healthy: false,
                    pending: false,
                    message: "no eligible cluster for placement".to_string(),
                    outputs: BTreeMap::new(),
                }
            } else if t.stage == DispatchStage::PostDispatch
                && !workload.healthy
                && multi_stage_apply_enabled
            {
                TraitStatus::pending(t.trait_type.clone(), t.index)
            } else {
                let policy = defs
                    .get(&(DefinitionKind::Trait, t.trait_type.as_str()))
                    .map(|d| d.metadata.health_policy.clone())
                    .unwrap_or_default();
                let evaluated = evaluate_workload(&policy, None);
                TraitStatus {
                    trait_type: t.trait_type.clone(),
                    index: t.index,
                    healthy: evaluated.healthy,
                    pending: false,
                    message: evaluated.message,
                    outputs: if evaluated.outputs.is_empty() {
                        t.outputs.clone()
                    } else {
                        evaluated.outputs
                    },
                }
            };
            traits.push(status);
        }

        components.push(ComponentStatus {
            name: manifest.component_name.clone(),
            workload,
            traits,
        });
    }

    let healthy = components.iter().all(ComponentStatus::healthy);
    let phase = if healthy {
        Phase::Running
    } else {
        Phase::Dispatching
    };

    ApplicationStatus {
        observed_generation: 0,
        phase,
        components,
        conditions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definition::PatchStrategy;
    use crate::model::revision::{ComponentManifest, ManifestLabels, TraitManifest};

    fn manifest(traits: Vec<TraitManifest>) -> ManifestPlan {
        ManifestPlan {
            components: vec![ComponentManifest {
                component_name: "c1".into(),
                component_type: "webservice".into(),
                labels: ManifestLabels {
                    app_name: "app1".into(),
                    component_name: "c1".into(),
                    component_revision: "c1-v1".into(),
                    app_revision: "app1-v1".into(),
                    cluster: None,
                },
                workload: serde_json::json!({"apiVersion": "apps/v1", "kind": "Deployment"}),
                auxiliary: vec![],
                traits,
            }],
        }
    }

    fn post_dispatch_trait() -> TraitManifest {
        TraitManifest {
            trait_type: "expose".into(),
            index: 0,
            stage: DispatchStage::PostDispatch,
            patch_strategy: PatchStrategy::JsonMerge,
            patch: serde_json::json!({}),
            outputs: Default::default(),
        }
    }

    #[test]
    fn post_dispatch_trait_is_pending_while_workload_unhealthy() {
        let plan = manifest(vec![post_dispatch_trait()]);
        let status = collect(&plan, &[], &BTreeMap::new(), &DispatchOutcome::default(), true);
        assert!(!status.healthy());
        assert!(status.components[0].traits[0].pending);
        assert_eq!(status.components[0].traits[0].message, TraitStatus::PENDING_MESSAGE);
    }

    #[test]
    fn post_dispatch_trait_evaluates_once_workload_healthy() {
        let plan = manifest(vec![post_dispatch_trait()]);
        let mut live = BTreeMap::new();
        live.insert(
            "c1".to_string(),
            serde_json::json!({"spec": {"replicas": 1}, "status": {"readyReplicas": 1}}),
        );
        let mut defs = vec![crate::model::revision::ResolvedDefinition {
            kind: DefinitionKind::Component,
            name: "webservice".into(),
            template: String::new(),
            metadata: crate::model::definition::DefinitionMetadata {
                health_policy: HealthPolicy::Builtin(BuiltinHealthCheck::DeploymentReady),
                ..Default::default()
            },
        }];
        defs.push(crate::model::revision::ResolvedDefinition {
            kind: DefinitionKind::Trait,
            name: "expose".into(),
            template: String::new(),
            metadata: crate::model::definition::DefinitionMetadata::default(),
        });
        let mut outcome = DispatchOutcome::default();
        outcome.components.insert(
            "c1".to_string(),
            ComponentDispatchRecord {
                workload_applied: true,
                workload_eligible: true,
                trait_records: vec![],
            },
        );
        let status = collect(&plan, &defs, &live, &outcome, true);
        assert!(status.components[0].workload.healthy);
        assert!(!status.components[0].traits[0].pending);
        assert!(status.components[0].traits[0].healthy);
    }

    #[test]
    fn no_eligible_cluster_marks_workload_unhealthy_without_blocking_other_components() {
        let mut outcome = DispatchOutcome::default();
        outcome.components.insert(
            "c1".to_string(),
            ComponentDispatchRecord {
                workload_applied: false,
                workload_eligible: false,
                trait_records: vec![],
            },
        );
        let plan = manifest(vec![]);
        let status = collect(&plan, &[], &BTreeMap::new(), &outcome, true);
        assert!(!status.components[0].workload.healthy);
        assert_eq!(status.components[0].workload.message, "no eligible cluster for placement");
    }
}
