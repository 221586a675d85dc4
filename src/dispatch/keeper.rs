//! The Resource Keeper / Dispatcher itself: two-stage apply over arbitrary
//! GVKs via discovery + `DynamicObject`, grounded on the same
//! discovery-driven generic-apply pattern used for Helm-style manifest
//! appliers elsewhere in the ecosystem (resolve GVK → `ApiResource` via
//! `kube::discovery::Discovery`, build a scoped `Api<DynamicObject>`, apply
//! with Server-Side Apply).

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Resource;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};

use crate::dispatch::cluster::{ClusterClientFactory, ClusterIdentityCache};
use crate::error::{Error, Result};
use crate::health::{ComponentDispatchRecord, DispatchOutcome, TraitDispatchRecord};
use crate::model::definition::{DefinitionKind, PatchStrategy, PlacementSpec};
use crate::model::revision::{ComponentManifest, ManifestPlan, ResolvedDefinition, TraitManifest};
use crate::model::tracker::{ResourceTracker, ResourceTrackerEntry, ResourceTrackerSpec};

const FIELD_MANAGER: &str = "vela-core";

pub struct DispatchPlanOutcome {
    pub tracker: ResourceTrackerSpec,
    pub health: DispatchOutcome,
}

/// Realizes one Application's Manifest Plan. Holds its own `Discovery`
/// snapshot (refreshed on demand, e.g. after a new CRD registers) and a
/// `MaxDispatchConcurrent` semaphore shared across every apply it issues.
pub struct ResourceKeeper {
    client: kube::Client,
    discovery: RwLock<Discovery>,
    cluster_identity: Arc<dyn ClusterIdentityCache>,
    #[allow(dead_code)] // multi-cluster fan-out is an external collaborator; kept for the seam
    cluster_clients: Arc<dyn ClusterClientFactory>,
    semaphore: Arc<Semaphore>,
}

impl ResourceKeeper {
    pub async fn new(
        client: kube::Client,
        cluster_identity: Arc<dyn ClusterIdentityCache>,
        cluster_clients: Arc<dyn ClusterClientFactory>,
        max_dispatch_concurrent: usize,
    ) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
            cluster_identity,
            cluster_clients,
            semaphore: Arc::new(Semaphore::new(max_dispatch_concurrent.max(1))),
        })
    }

    pub async fn refresh_discovery(&self) -> Result<()> {
        let refreshed = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().await = refreshed;
        Ok(())
    }

    /// §4.5 two-stage apply for every component in the plan.
    ///
    /// `rolling_component`, when set, names the one component under an
    /// active rollout: its replica field is preserved from the live object
    /// rather than overwritten, and its tracker entry is recorded
    /// non-controlling (the Rollout Controller owns it for the duration).
    pub async fn dispatch(
        &self,
        namespace: &str,
        revision_name: &str,
        plan: &ManifestPlan,
        resolved_definitions: &[ResolvedDefinition],
        prior_tracker: Option<&ResourceTrackerSpec>,
        rolling_component: Option<&str>,
        owner: &ResourceTracker,
    ) -> Result<DispatchPlanOutcome> {
        let component_defs: BTreeMap<&str, &ResolvedDefinition> = resolved_definitions
            .iter()
            .filter(|d| d.kind == DefinitionKind::Component)
            .map(|d| (d.name.as_str(), d))
            .collect();
        let trait_defs: BTreeMap<&str, &ResolvedDefinition> = resolved_definitions
            .iter()
            .filter(|d| d.kind == DefinitionKind::Trait)
            .map(|d| (d.name.as_str(), d))
            .collect();

        let mut tracker_entries = Vec::new();
        let mut health = DispatchOutcome::default();

        for component in &plan.components {
            let placement = component_defs
                .get(component.component_type.as_str())
                .and_then(|d| d.metadata.placement.as_ref());
            let eligible = self.is_eligible(placement).await?;

            if !eligible {
                tracing::warn!(component = %component.component_name, "no eligible cluster for placement");
                health.components.insert(
                    component.component_name.clone(),
                    ComponentDispatchRecord {
                        workload_applied: false,
                        workload_eligible: false,
                        trait_records: Vec::new(),
                    },
                );
                continue;
            }

            let under_rollout = rolling_component == Some(component.component_name.as_str());
            let mut record = ComponentDispatchRecord {
                workload_applied: false,
                workload_eligible: true,
                trait_records: Vec::new(),
            };

            let applied_workload = self
                .apply_component_workload(namespace, component, under_rollout, owner, &mut tracker_entries)
                .await;
            record.workload_applied = applied_workload.is_ok();
            if let Err(err) = &applied_workload {
                tracing::warn!(component = %component.component_name, error = %err, "workload apply failed");
            }

            for t in component.pre_dispatch_traits() {
                self.dispatch_trait(namespace, component, t, under_rollout, owner, &mut tracker_entries, &mut record)
                    .await;
            }

            let health_policy = component_defs
                .get(component.component_type.as_str())
                .map(|d| d.metadata.health_policy.clone())
                .unwrap_or_default();
            let live_workload = applied_workload.ok();
            let workload_healthy =
                crate::health::evaluate_workload(&health_policy, live_workload.as_ref()).healthy;

            for t in component.post_dispatch_traits() {
                if !workload_healthy {
                    record.trait_records.push(TraitDispatchRecord {
                        trait_type: t.trait_type.clone(),
                        index: t.index,
                        applied: false,
                        eligible: true,
                    });
                    continue;
                }
                self.dispatch_trait(namespace, component, t, under_rollout, owner, &mut tracker_entries, &mut record)
                    .await;
            }

            let _ = &trait_defs; // trait health policies are consulted by the Health Collector, not here
            health.components.insert(component.component_name.clone(), record);
        }

        if let Some(prior) = prior_tracker {
            self.delete_stale(prior, &tracker_entries).await?;
        }

        Ok(DispatchPlanOutcome {
            tracker: ResourceTrackerSpec {
                application_revision: revision_name.to_string(),
                namespace: namespace.to_string(),
                resources: tracker_entries,
            },
            health,
        })
    }

    async fn dispatch_trait(
        &self,
        namespace: &str,
        component: &ComponentManifest,
        t: &TraitManifest,
        under_rollout: bool,
        owner: &ResourceTracker,
        tracker_entries: &mut Vec<ResourceTrackerEntry>,
        record: &mut ComponentDispatchRecord,
    ) {
        let applied = self
            .apply_trait_patch(namespace, component, t, under_rollout, owner, tracker_entries)
            .await;
        if let Err(err) = &applied {
            tracing::warn!(
                component = %component.component_name,
                trait_type = %t.trait_type,
                error = %err,
                "trait patch apply failed"
            );
        }
        record.trait_records.push(TraitDispatchRecord {
            trait_type: t.trait_type.clone(),
            index: t.index,
            applied: applied.is_ok(),
            eligible: true,
        });
    }

    async fn is_eligible(&self, placement: Option<&PlacementSpec>) -> Result<bool> {
        let Some(placement) = placement else {
            return Ok(true);
        };
        for cluster in self.cluster_identity.known_clusters().await {
            let labels = self.cluster_identity.labels(&cluster).await?;
            let run_ok = placement.run_on.as_ref().is_none_or(|c| c.matches(&labels));
            let not_ok = placement
                .not_run_on
                .as_ref()
                .is_none_or(|c| !c.matches(&labels));
            if run_ok && not_ok {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn apply_component_workload(
        &self,
        namespace: &str,
        component: &ComponentManifest,
        under_rollout: bool,
        owner: &ResourceTracker,
        tracker_entries: &mut Vec<ResourceTrackerEntry>,
    ) -> Result<Value> {
        let mut manifest = component.workload.clone();
        stamp_namespace(&mut manifest, namespace);
        stamp_owner_reference(&mut manifest, &owner_reference(owner, !under_rollout)?);

        if under_rollout {
            if let Some(live) = self.get_object(&manifest).await? {
                if let Some(replicas) = live.get("spec").and_then(|s| s.get("replicas")).cloned() {
                    if let Some(obj) = manifest.as_object_mut() {
                        let spec = obj
                            .entry("spec")
                            .or_insert_with(|| Value::Object(Default::default()));
                        if let Some(spec) = spec.as_object_mut() {
                            spec.insert("replicas".to_string(), replicas);
                        }
                    }
                }
            }
        }

        let applied = self.apply_object(&manifest).await?;
        tracker_entries.push(tracker_entry_for(&applied, !under_rollout)?);
        Ok(serde_json::to_value(&applied)?)
    }

    async fn apply_trait_patch(
        &self,
        namespace: &str,
        component: &ComponentManifest,
        t: &TraitManifest,
        under_rollout: bool,
        owner: &ResourceTracker,
        tracker_entries: &mut Vec<ResourceTrackerEntry>,
    ) -> Result<()> {
        let has_own_identity = t.patch_strategy != PatchStrategy::JsonPatch
            && t.patch.get("apiVersion").and_then(Value::as_str).is_some()
            && t.patch.get("kind").and_then(Value::as_str).is_some();

        if has_own_identity {
            let mut manifest = t.patch.clone();
            stamp_namespace(&mut manifest, namespace);
            ensure_name(&mut manifest, &component.component_name);
            stamp_owner_reference(&mut manifest, &owner_reference(owner, true)?);
            let applied = self.apply_object(&manifest).await?;
            tracker_entries.push(tracker_entry_for(&applied, true)?);
            return Ok(());
        }

        // No embedded identity: the trait patches the component's own
        // workload in place (e.g. an `annotations` or `scaler` trait).
        let mut target = component.workload.clone();
        stamp_namespace(&mut target, namespace);
        let type_meta = workload_type_meta(&target)?;
        let name = workload_name(&target)?;
        let gvk = gvk_from_type_meta(&type_meta);

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");
        let (api_resource, capabilities) = self.resolve(&gvk, &type_meta, namespace, &name).await?;
        let api = self.api_for(&api_resource, &capabilities, target.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).or(Some(namespace)));

        match t.patch_strategy {
            PatchStrategy::JsonMerge => {
                api.patch(&name, &PatchParams::default(), &Patch::Merge(&t.patch))
                    .await
                    .map_err(|err| classify_kube_error(err, &type_meta, namespace, &name))?;
            }
            PatchStrategy::JsonPatch => {
                let ops: json_patch::Patch = serde_json::from_value(t.patch.clone())?;
                api.patch(&name, &PatchParams::default(), &Patch::Json(ops))
                    .await
                    .map_err(|err| classify_kube_error(err, &type_meta, namespace, &name))?;
            }
            PatchStrategy::StrategicMerge => {
                let mut merged = target.clone();
                merge_json(&mut merged, &t.patch);
                stamp_owner_reference(&mut merged, &owner_reference(owner, !under_rollout)?);
                drop(_permit);
                self.apply_object(&merged).await?;
                return Ok(());
            }
        }
        Ok(())
    }

    async fn get_object(&self, manifest: &Value) -> Result<Option<Value>> {
        let Ok(type_meta) = workload_type_meta(manifest) else {
            return Ok(None);
        };
        let Ok(name) = workload_name(manifest) else {
            return Ok(None);
        };
        let gvk = gvk_from_type_meta(&type_meta);
        let namespace = manifest
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .unwrap_or("default");

        let resolved = {
            let discovery = self.discovery.read().await;
            discovery.resolve_gvk(&gvk)
        };
        let Some((api_resource, capabilities)) = resolved else {
            return Ok(None);
        };
        let api = self.api_for(&api_resource, &capabilities, Some(namespace));
        match api.get(&name).await {
            Ok(live) => Ok(Some(serde_json::to_value(&live)?)),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_object(&self, manifest: &Value) -> Result<DynamicObject> {
        let obj: DynamicObject = serde_json::from_value(manifest.clone())?;
        let type_meta = workload_type_meta(manifest)?;
        let name = workload_name(manifest)?;
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();
        let gvk = gvk_from_type_meta(&type_meta);

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");
        let (api_resource, capabilities) = self.resolve(&gvk, &type_meta, &namespace, &name).await?;
        let api = self.api_for(&api_resource, &capabilities, obj.metadata.namespace.as_deref());

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&obj),
        )
        .await
        .map_err(|err| classify_kube_error(err, &type_meta, &namespace, &name))
    }

    async fn resolve(
        &self,
        gvk: &GroupVersionKind,
        type_meta: &TypeMeta,
        namespace: &str,
        name: &str,
    ) -> Result<(ApiResource, ApiCapabilities)> {
        let discovery = self.discovery.read().await;
        discovery.resolve_gvk(gvk).ok_or_else(|| Error::DispatchForbidden {
            gvk: format!("{}/{}", type_meta.api_version, type_meta.kind),
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: "GVK not registered in cluster discovery".to_string(),
        })
    }

    fn api_for(
        &self,
        api_resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match capabilities.scope {
            Scope::Namespaced => {
                let ns = namespace.unwrap_or("default");
                Api::namespaced_with(self.client.clone(), ns, api_resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), api_resource),
        }
    }

    /// Patch a workload's `spec.replicas`. Used by the Rollout Controller to
    /// drive the IncreaseFirst batch schedule without going through the
    /// two-stage dispatch path (§4.7 scales one workload at a time, outside
    /// any component's own apply cycle).
    pub async fn scale(&self, api_version: &str, kind: &str, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let type_meta = TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        };
        let gvk = gvk_from_type_meta(&type_meta);
        let (api_resource, capabilities) = self.resolve(&gvk, &type_meta, namespace, name).await?;
        let api = self.api_for(&api_resource, &capabilities, Some(namespace));
        let patch = serde_json::json!({"spec": {"replicas": replicas}});
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| classify_kube_error(err, &type_meta, namespace, name))?;
        Ok(())
    }

    /// Best-effort live read of an arbitrary workload by GVK + name, for
    /// callers (the Rollout Controller) that only need one object rather
    /// than a full component apply.
    pub async fn read_workload(&self, api_version: &str, kind: &str, namespace: &str, name: &str) -> Result<Option<Value>> {
        let manifest = serde_json::json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {"name": name, "namespace": namespace},
        });
        self.get_object(&manifest).await
    }

    /// Flip a live workload's real `ownerReferences` back to the
    /// `ResourceTracker`, mirroring the `controller: bool` bookkeeping the
    /// caller already applied to the tracker's own spec (§3, §4.7). Used by
    /// the Rollout Controller once a rollout hands a workload's controller
    /// ownership back after taking it over for batch scaling.
    pub async fn set_controller_owner(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
        owner: &ResourceTracker,
        controller: bool,
    ) -> Result<()> {
        let type_meta = TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        };
        let gvk = gvk_from_type_meta(&type_meta);
        let (api_resource, capabilities) = self.resolve(&gvk, &type_meta, namespace, name).await?;
        let api = self.api_for(&api_resource, &capabilities, Some(namespace));
        let owner_ref = owner_reference(owner, controller)?;
        let patch = serde_json::json!({"metadata": {"ownerReferences": [owner_ref]}});
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| classify_kube_error(err, &type_meta, namespace, name))?;
        Ok(())
    }

    async fn delete_stale(
        &self,
        prior: &ResourceTrackerSpec,
        new_entries: &[ResourceTrackerEntry],
    ) -> Result<()> {
        for old in &prior.resources {
            let still_present = new_entries.iter().any(|n| {
                n.api_version == old.api_version && n.kind == old.kind && n.namespace == old.namespace && n.name == old.name
            });
            if still_present {
                continue;
            }
            tracing::info!(namespace = %old.namespace, kind = %old.kind, name = %old.name, "deleting stale resource from prior revision");
            let gvk = gvk_from_api_version_kind(&old.api_version, &old.kind);
            let resolved = {
                let discovery = self.discovery.read().await;
                discovery.resolve_gvk(&gvk)
            };
            let Some((api_resource, capabilities)) = resolved else {
                tracing::warn!(kind = %old.kind, name = %old.name, "cannot delete stale resource: gvk no longer in discovery");
                continue;
            };
            let api = self.api_for(&api_resource, &capabilities, Some(old.namespace.as_str()));
            match api.delete(&old.name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(resp)) if resp.code == 404 => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn classify_kube_error(err: kube::Error, type_meta: &TypeMeta, namespace: &str, name: &str) -> Error {
    match &err {
        kube::Error::Api(resp) if resp.code == 409 => Error::DispatchConflict {
            gvk: format!("{}/{}", type_meta.api_version, type_meta.kind),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 403 => Error::DispatchForbidden {
            gvk: format!("{}/{}", type_meta.api_version, type_meta.kind),
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: resp.message.clone(),
        },
        _ => err.into(),
    }
}

fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };
    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

fn gvk_from_api_version_kind(api_version: &str, kind: &str) -> GroupVersionKind {
    gvk_from_type_meta(&TypeMeta {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
    })
}

fn workload_type_meta(manifest: &Value) -> Result<TypeMeta> {
    let api_version = manifest
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::DispatchForbidden {
            gvk: "unknown".to_string(),
            namespace: String::new(),
            name: String::new(),
            reason: "manifest is missing apiVersion".to_string(),
        })?;
    let kind = manifest
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::DispatchForbidden {
            gvk: "unknown".to_string(),
            namespace: String::new(),
            name: String::new(),
            reason: "manifest is missing kind".to_string(),
        })?;
    Ok(TypeMeta {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
    })
}

fn workload_name(manifest: &Value) -> Result<String> {
    manifest
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| Error::DispatchForbidden {
            gvk: "unknown".to_string(),
            namespace: String::new(),
            name: String::new(),
            reason: "manifest is missing metadata.name".to_string(),
        })
}

fn stamp_namespace(manifest: &mut Value, namespace: &str) {
    let Some(obj) = manifest.as_object_mut() else {
        return;
    };
    let metadata = obj
        .entry("metadata")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata
            .entry("namespace")
            .or_insert_with(|| Value::String(namespace.to_string()));
    }
}

/// Builds the owner reference every dispatched object carries back to its
/// `ResourceTracker` (§3, §4.5). `controller_owner_ref` always sets
/// `controller: Some(true)`; overridden here to `false` for the duration of
/// an active rollout, mirroring `ResourceTrackerEntry.controller`.
fn owner_reference(owner: &ResourceTracker, controller: bool) -> Result<OwnerReference> {
    let mut owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| Error::DispatchForbidden {
        gvk: "core.oam.dev/v1beta1/ResourceTracker".to_string(),
        namespace: owner.spec.namespace.clone(),
        name: owner.meta().name.clone().unwrap_or_default(),
        reason: "ResourceTracker is missing the metadata needed to build an owner reference".to_string(),
    })?;
    owner_ref.controller = Some(controller);
    Ok(owner_ref)
}

fn stamp_owner_reference(manifest: &mut Value, owner_ref: &OwnerReference) {
    let Some(obj) = manifest.as_object_mut() else {
        return;
    };
    let metadata = obj
        .entry("metadata")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(metadata) = metadata.as_object_mut() {
        if let Ok(owner_ref_value) = serde_json::to_value(owner_ref) {
            metadata.insert("ownerReferences".to_string(), Value::Array(vec![owner_ref_value]));
        }
    }
}

fn ensure_name(manifest: &mut Value, default_name: &str) {
    let Some(obj) = manifest.as_object_mut() else {
        return;
    };
    let metadata = obj
        .entry("metadata")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata
            .entry("name")
            .or_insert_with(|| Value::String(default_name.to_string()));
    }
}

fn tracker_entry_for(applied: &DynamicObject, controller: bool) -> Result<ResourceTrackerEntry> {
    let type_meta = applied.types.clone().ok_or_else(|| Error::DispatchForbidden {
        gvk: "unknown".to_string(),
        namespace: String::new(),
        name: String::new(),
        reason: "applied object carries no TypeMeta".to_string(),
    })?;
    Ok(ResourceTrackerEntry {
        api_version: type_meta.api_version,
        kind: type_meta.kind,
        namespace: applied.metadata.namespace.clone().unwrap_or_default(),
        name: applied.metadata.name.clone().unwrap_or_default(),
        controller,
    })
}

/// A structural approximation of strategic-merge: objects merge key-wise,
/// scalars and arrays are replaced wholesale. Used only to build the desired
/// document before a Server-Side Apply; the server remains the source of
/// truth for actual field ownership.
fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                merge_json(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (base, patch) => {
            *base = patch.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_json_merges_nested_objects_and_replaces_scalars() {
        let mut base = serde_json::json!({"spec": {"replicas": 1, "image": "nginx:1.24"}});
        let patch = serde_json::json!({"spec": {"image": "nginx:1.25"}});
        merge_json(&mut base, &patch);
        assert_eq!(base["spec"]["replicas"], 1);
        assert_eq!(base["spec"]["image"], "nginx:1.25");
    }

    #[test]
    fn gvk_from_type_meta_splits_group_and_version() {
        let tm = TypeMeta {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");
    }

    #[test]
    fn gvk_from_type_meta_handles_core_group() {
        let tm = TypeMeta {
            api_version: "v1".to_string(),
            kind: "Service".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
    }
}
