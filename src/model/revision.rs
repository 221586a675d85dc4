//! The rendered Manifest Plan and the `ApplicationRevision` CRD that pins
//! it, immutably, to a content hash (§3, §4.3, §4.4).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::application::ApplicationSpec;
use super::definition::DispatchStage;

/// A single rendered trait patch or outputs set, in plan order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TraitManifest {
    #[serde(rename = "type")]
    pub trait_type: String,
    /// Position among same-typed traits on this component (§9: dedup key).
    pub index: usize,
    pub stage: DispatchStage,
    pub patch_strategy: super::definition::PatchStrategy,
    /// The rendered patch document (strategic-merge / json-merge body, or
    /// a JSON Patch array, depending on `patch_strategy`).
    pub patch: serde_json::Value,
    #[serde(default)]
    pub outputs: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Labels stamped onto every manifest produced for a component (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestLabels {
    pub app_name: String,
    pub component_name: String,
    pub component_revision: String,
    pub app_revision: String,
    #[serde(default)]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentManifest {
    pub component_name: String,
    pub component_type: String,
    pub labels: ManifestLabels,
    /// The primary workload manifest, a full Kubernetes object document.
    pub workload: serde_json::Value,
    #[serde(default)]
    pub auxiliary: Vec<serde_json::Value>,
    /// Ordered trait patches/outputs; pre-dispatch traits precede
    /// post-dispatch ones in declaration order, but the two stages are
    /// scheduled separately (see `crate::dispatch`).
    #[serde(default)]
    pub traits: Vec<TraitManifest>,
}

impl ComponentManifest {
    pub fn pre_dispatch_traits(&self) -> impl Iterator<Item = &TraitManifest> {
        self.traits
            .iter()
            .filter(|t| t.stage == DispatchStage::PreDispatch)
    }

    pub fn post_dispatch_traits(&self) -> impl Iterator<Item = &TraitManifest> {
        self.traits
            .iter()
            .filter(|t| t.stage == DispatchStage::PostDispatch)
    }
}

/// A pinned snapshot of one definition's template and metadata, stored
/// inside the revision so it survives live registry changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedDefinition {
    pub kind: super::definition::DefinitionKind,
    pub name: String,
    pub template: String,
    pub metadata: super::definition::DefinitionMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ManifestPlan {
    pub components: Vec<ComponentManifest>,
}

impl ManifestPlan {
    pub fn component(&self, name: &str) -> Option<&ComponentManifest> {
        self.components.iter().find(|c| c.component_name == name)
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "ApplicationRevision",
    plural = "applicationrevisions",
    namespaced,
    shortname = "apprev"
)]
pub struct ApplicationRevisionSpec {
    pub application: ApplicationSpec,
    /// The definitions this revision resolves to, pinned at snapshot time.
    /// Live registry updates never retroactively mutate an existing
    /// revision (§4.1).
    #[serde(default)]
    pub resolved_definitions: Vec<ResolvedDefinition>,
    /// Content hash over the resolved (definition-pinned) plan; the unit
    /// of idempotent revision creation (§4.3, §4.4).
    pub hash: String,
    /// Monotonic per-Application sequence number (`<appName>-v<n>`).
    pub revision_number: u64,
    pub plan: ManifestPlan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_and_post_dispatch_traits_partition_cleanly() {
        let manifest = ComponentManifest {
            component_name: "c1".into(),
            component_type: "webservice".into(),
            labels: ManifestLabels {
                app_name: "app1".into(),
                component_name: "c1".into(),
                component_revision: "c1-v1".into(),
                app_revision: "app1-v1".into(),
                cluster: None,
            },
            workload: serde_json::json!({}),
            auxiliary: vec![],
            traits: vec![
                TraitManifest {
                    trait_type: "scaler".into(),
                    index: 0,
                    stage: DispatchStage::PreDispatch,
                    patch_strategy: super::super::definition::PatchStrategy::StrategicMerge,
                    patch: serde_json::json!({}),
                    outputs: Default::default(),
                },
                TraitManifest {
                    trait_type: "expose".into(),
                    index: 0,
                    stage: DispatchStage::PostDispatch,
                    patch_strategy: super::super::definition::PatchStrategy::JsonMerge,
                    patch: serde_json::json!({}),
                    outputs: Default::default(),
                },
            ],
        };
        assert_eq!(manifest.pre_dispatch_traits().count(), 1);
        assert_eq!(manifest.post_dispatch_traits().count(), 1);
    }
}
