//! Definition Registry (§4.1): resolves a definition name to its template
//! and metadata, with a per-reconcile lookup cache. Live updates to the
//! registry never retroactively mutate a revision already pinned — callers
//! snapshot what they looked up via `crate::model::revision::ResolvedDefinition`.

use std::collections::HashMap;
use std::sync::Arc;

use kube::api::{Api, ListParams};
use kube::Client;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::definition::{
    ComponentDefinition, DefinitionKind, DefinitionMetadata, PolicyDefinition, TraitDefinition,
    WorkflowStepDefinition,
};
use crate::model::revision::ResolvedDefinition;

#[derive(Clone)]
struct CachedDefinition {
    template: String,
    metadata: DefinitionMetadata,
}

/// Loaded once per reconcile and discarded; definitions are read through
/// the informer-backed `Api` the same way any other object is, so the
/// cache only protects against the common case of the same component and
/// its traits sharing several definitions.
pub struct DefinitionRegistry {
    client: Client,
    namespace: String,
    cache: RwLock<HashMap<(DefinitionKind, String), CachedDefinition>>,
}

impl DefinitionRegistry {
    pub fn new(client: Client, system_definition_namespace: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            client,
            namespace: system_definition_namespace.into(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub async fn lookup(&self, kind: DefinitionKind, name: &str) -> Result<ResolvedDefinition> {
        if let Some(hit) = self.cache.read().await.get(&(kind, name.to_string())) {
            return Ok(ResolvedDefinition {
                kind,
                name: name.to_string(),
                template: hit.template.clone(),
                metadata: hit.metadata.clone(),
            });
        }

        let (template, metadata) = match kind {
            DefinitionKind::Component => self.fetch::<ComponentDefinition>(name).await?,
            DefinitionKind::Trait => self.fetch::<TraitDefinition>(name).await?,
            DefinitionKind::Policy => self.fetch::<PolicyDefinition>(name).await?,
            DefinitionKind::WorkflowStep => self.fetch::<WorkflowStepDefinition>(name).await?,
        };

        if let Some(placement) = &metadata.placement {
            placement
                .validate()
                .map_err(|reason| Error::PlacementConflict {
                    definition: name.to_string(),
                    reason,
                })?;
        }

        self.cache.write().await.insert(
            (kind, name.to_string()),
            CachedDefinition {
                template: template.clone(),
                metadata: metadata.clone(),
            },
        );

        Ok(ResolvedDefinition {
            kind,
            name: name.to_string(),
            template,
            metadata,
        })
    }

    async fn fetch<K>(&self, name: &str) -> Result<(String, DefinitionMetadata)>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + std::fmt::Debug
            + serde::de::DeserializeOwned
            + DefinitionFields
            + 'static,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(name).await {
            Ok(def) => Ok((def.template_body().to_string(), def.definition_metadata().clone())),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Err(Error::DefinitionNotFound {
                kind: K::kind_marker(),
                name: name.to_string(),
            }),
            Err(err) => Err(Error::Kube(err)),
        }
    }

    /// Used by health checks / admission-style validation without touching
    /// the cache (e.g. listing every trait definition to detect stale
    /// registrations). Not on the render hot path.
    pub async fn list_names(&self, kind: DefinitionKind) -> Result<Vec<String>> {
        let lp = ListParams::default();
        let names = match kind {
            DefinitionKind::Component => {
                let api: Api<ComponentDefinition> = Api::namespaced(self.client.clone(), &self.namespace);
                api.list(&lp).await?.items.into_iter().filter_map(|d| d.metadata.name).collect()
            }
            DefinitionKind::Trait => {
                let api: Api<TraitDefinition> = Api::namespaced(self.client.clone(), &self.namespace);
                api.list(&lp).await?.items.into_iter().filter_map(|d| d.metadata.name).collect()
            }
            DefinitionKind::Policy => {
                let api: Api<PolicyDefinition> = Api::namespaced(self.client.clone(), &self.namespace);
                api.list(&lp).await?.items.into_iter().filter_map(|d| d.metadata.name).collect()
            }
            DefinitionKind::WorkflowStep => {
                let api: Api<WorkflowStepDefinition> = Api::namespaced(self.client.clone(), &self.namespace);
                api.list(&lp).await?.items.into_iter().filter_map(|d| d.metadata.name).collect()
            }
        };
        Ok(names)
    }
}

/// Shared field accessors so `fetch` can be generic over the four
/// Definition CRD kinds without repeating itself per kind.
trait DefinitionFields {
    fn template_body(&self) -> &str;
    fn definition_metadata(&self) -> &DefinitionMetadata;
    fn kind_marker() -> DefinitionKind;
}

macro_rules! impl_definition_fields {
    ($ty:ty, $kind:expr) => {
        impl DefinitionFields for $ty {
            fn template_body(&self) -> &str {
                &self.spec.template
            }
            fn definition_metadata(&self) -> &DefinitionMetadata {
                &self.spec.metadata_spec
            }
            fn kind_marker() -> DefinitionKind {
                $kind
            }
        }
    };
}

impl_definition_fields!(ComponentDefinition, DefinitionKind::Component);
impl_definition_fields!(TraitDefinition, DefinitionKind::Trait);
impl_definition_fields!(PolicyDefinition, DefinitionKind::Policy);
impl_definition_fields!(WorkflowStepDefinition, DefinitionKind::WorkflowStep);
