//! The Rollout Controller (§4.7): drives one `AppRollout` from
//! `LocatingTarget` through to `Succeeded`/`Failed`, calling into the
//! Resource Keeper only for the single rolled component's workload.
//!
//! The Dispatcher (§4.5) always applies a component's workload under one
//! canonical name (the component name; `render.rs` stamps identity from
//! context, never from the revision). A rollout therefore never deals with
//! two live objects: it scales that one object's replica count up batch by
//! batch, and the "source" count IncreaseFirst reports is derived
//! bookkeeping (`targetSize - targetReplicas`), not an independent read of a
//! second object. `ResourceKeeper::dispatch`'s `under_rollout` flag is what
//! keeps the Dispatcher's own apply from fighting the Rollout Controller
//! over that object's replica count in the meantime.

use std::collections::BTreeSet;
use std::sync::Arc;

use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde_json::Value;

use crate::dispatch::ResourceKeeper;
use crate::error::{Error, Result};
use crate::health::evaluate_workload;
use crate::model::definition::DefinitionKind;
use crate::model::revision::ApplicationRevision;
use crate::model::rollout::{AppRollout, AppRolloutStatus, RolloutState};
use crate::model::tracker::ResourceTracker;
use crate::rollout::state_machine::{self, RolloutObservation};

const RESUME_ANNOTATION: &str = "core.oam.dev/resume-rollout";
/// Workload kinds that upgrade in place (same pod identity across
/// revisions); combined with a placement constraint, batch-based replica
/// migration can't be reasoned about safely, so it is rejected outright
/// (§4.7, §9: `RolloutUnsupported`).
const IN_PLACE_KINDS: &[&str] = &["StatefulSet"];

pub struct RolloutController {
    client: kube::Client,
    keeper: Arc<ResourceKeeper>,
}

impl RolloutController {
    pub fn new(client: kube::Client, keeper: Arc<ResourceKeeper>) -> Self {
        Self { client, keeper }
    }

    /// Run one reconcile tick and return the status to write back. Callers
    /// own retry-on-conflict for the status subresource write itself.
    pub async fn reconcile(&self, rollout: &AppRollout, namespace: &str) -> Result<AppRolloutStatus> {
        let mut status = rollout.status.clone().unwrap_or_default();
        let rollout_name = rollout.name_any();

        if status.state.is_terminal() {
            return Ok(status);
        }

        // §4.7: a spec change mid-batch doesn't preempt the in-flight batch;
        // it's recorded as `Abandoning` and only adopted once that batch
        // settles (RollingModified). `last_upgraded_target_app_revision`
        // being empty means this is the rollout's first reconcile, not a
        // change.
        let spec_changed = !status.last_upgraded_target_app_revision.is_empty()
            && (status.last_upgraded_target_app_revision != rollout.spec.target_revision
                || status.last_source_app_revision != rollout.spec.source_revision);
        if spec_changed {
            if let RolloutState::InBatches { batch_partition } = status.state {
                status.state = RolloutState::Abandoning {
                    batch_partition,
                    completing_target: status.last_upgraded_target_app_revision.clone(),
                    next_source: rollout.spec.source_revision.clone(),
                    next_target: rollout.spec.target_revision.clone(),
                };
            }
        }

        // While abandoning, keep driving the in-flight (old) target/source
        // pair until the batch settles; the new pair is only adopted once
        // `state_machine::step` returns to `LocatingTarget`.
        let (source_revision, target_revision) = match &status.state {
            RolloutState::Abandoning { completing_target, .. } => {
                (status.last_source_app_revision.clone(), completing_target.clone())
            }
            _ => (rollout.spec.source_revision.clone(), rollout.spec.target_revision.clone()),
        };

        let source_rev = self.get_revision(namespace, &source_revision).await?;
        let target_rev = self.get_revision(namespace, &target_revision).await?;

        let source_names: BTreeSet<String> = source_rev
            .spec
            .plan
            .components
            .iter()
            .map(|c| c.component_name.clone())
            .collect();
        let target_names: BTreeSet<String> = target_rev
            .spec
            .plan
            .components
            .iter()
            .map(|c| c.component_name.clone())
            .collect();
        let component_name = state_machine::locate_target_component(
            &rollout.spec.component_list,
            &source_names,
            &target_names,
            &rollout_name,
        )?;

        let target_component = target_rev
            .spec
            .plan
            .component(&component_name)
            .ok_or_else(|| Error::AmbiguousRolloutTarget {
                name: rollout_name.clone(),
                candidates: 0,
            })?;

        let resolved_component = target_rev
            .spec
            .resolved_definitions
            .iter()
            .find(|d| d.kind == DefinitionKind::Component && d.name == target_component.component_type);
        let placement = resolved_component.and_then(|d| d.metadata.placement.as_ref());
        if is_in_place_kind(workload_kind(&target_component.workload)) && placement.is_some() {
            return Err(Error::RolloutUnsupported { name: rollout_name });
        }

        let (api_version, kind) = workload_gvk(&target_component.workload);
        let live = self
            .keeper
            .read_workload(&api_version, &kind, namespace, &component_name)
            .await?;
        let target_replicas = replicas_of(live.as_ref());
        let health_policy = resolved_component.map(|d| d.metadata.health_policy.clone()).unwrap_or_default();
        let target_ready = evaluate_workload(&health_policy, live.as_ref()).healthy;
        let source_replicas = (rollout.spec.rollout_plan.target_size - target_replicas).max(0);

        let deleting = rollout.meta().deletion_timestamp.is_some();
        let resume_requested = rollout
            .annotations()
            .get(RESUME_ANNOTATION)
            .is_some_and(|v| v == "true");

        let observation = RolloutObservation {
            target_replicas,
            target_ready,
            source_replicas,
            deleting,
            resume_requested,
        };

        let sequence = status.events.len() as u64;
        let outcome = state_machine::step(&status.state, &rollout.spec.rollout_plan, &observation, sequence)?;

        // `desired_source_replicas` is purely informational here (there is
        // no second object to scale); only the target's own replica count
        // is ever applied.
        if let Some(replicas) = outcome.desired_target_replicas {
            self.keeper
                .scale(&api_version, &kind, namespace, &component_name, replicas)
                .await?;
        }

        if matches!(outcome.state, RolloutState::Finalizing) {
            self.restore_controller_ownership(namespace, &rollout.spec.target_revision, &kind, &api_version, &component_name)
                .await?;
        }

        status.state = outcome.state;
        status.observed_target_replicas = target_replicas;
        status.observed_source_replicas = source_replicas;
        status.last_upgraded_target_app_revision = rollout.spec.target_revision.clone();
        status.last_source_app_revision = rollout.spec.source_revision.clone();
        if let Some(event) = outcome.event {
            status.events.push(event);
        }

        Ok(status)
    }

    async fn get_revision(&self, namespace: &str, name: &str) -> Result<ApplicationRevision> {
        let api: Api<ApplicationRevision> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    /// Hand the rolled workload's controller ownership back to its
    /// `ResourceTracker` now that the rollout is done driving its replica
    /// count directly (§3: `controller: false` only for the duration of an
    /// active rollout).
    async fn restore_controller_ownership(
        &self,
        namespace: &str,
        revision: &str,
        kind: &str,
        api_version: &str,
        name: &str,
    ) -> Result<()> {
        let tracker_name = crate::model::tracker::ResourceTrackerSpec::name_for(revision, namespace);
        let api: Api<ResourceTracker> = Api::all(self.client.clone());
        let mut tracker = match api.get(&tracker_name).await {
            Ok(tracker) => tracker,
            Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in tracker.spec.resources.iter_mut() {
            if entry.kind == kind && entry.api_version == api_version && entry.name == name {
                entry.controller = true;
            }
        }
        let patch = serde_json::json!({"spec": {"resources": tracker.spec.resources}});
        api.patch(&tracker_name, &PatchParams::apply("vela-core"), &Patch::Merge(&patch))
            .await?;

        self.keeper
            .set_controller_owner(api_version, kind, namespace, name, &tracker, true)
            .await?;
        Ok(())
    }
}

fn workload_kind(workload: &Value) -> &str {
    workload.get("kind").and_then(Value::as_str).unwrap_or_default()
}

fn workload_gvk(workload: &Value) -> (String, String) {
    let api_version = workload.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let kind = workload_kind(workload);
    (api_version.to_string(), kind.to_string())
}

fn is_in_place_kind(kind: &str) -> bool {
    IN_PLACE_KINDS.contains(&kind)
}

fn replicas_of(live: Option<&Value>) -> i32 {
    live.and_then(|l| l.get("spec"))
        .and_then(|s| s.get("replicas"))
        .and_then(Value::as_i64)
        .unwrap_or(0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_place_kind_is_recognized() {
        assert!(is_in_place_kind("StatefulSet"));
        assert!(!is_in_place_kind("Deployment"));
    }

    #[test]
    fn replicas_of_defaults_to_zero_when_absent() {
        assert_eq!(replicas_of(None), 0);
        assert_eq!(replicas_of(Some(&serde_json::json!({"spec": {}}))), 0);
    }

    #[test]
    fn source_replicas_are_derived_from_target_size_and_never_negative() {
        let target_size = 4;
        assert_eq!((target_size - 0).max(0), 4);
        assert_eq!((target_size - 4).max(0), 0);
        assert_eq!((target_size - 6).max(0), 0);
    }
}
