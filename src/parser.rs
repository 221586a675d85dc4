//! Application Parser (§4.3): walks an `Application`, binds each component
//! and trait to its definition, and renders the in-memory Manifest Plan.

use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::definition::DefinitionKind;
use crate::model::revision::{ComponentManifest, ManifestPlan, ResolvedDefinition};
use crate::model::{ApplicationSpec, Component};
use crate::registry::DefinitionRegistry;
use crate::render::{labels_for, RenderContext, TemplateRenderer};

pub struct ParseOutcome {
    pub plan: ManifestPlan,
    pub resolved_definitions: Vec<ResolvedDefinition>,
    pub hash: String,
}

pub struct ApplicationParser {
    registry: Arc<DefinitionRegistry>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl ApplicationParser {
    pub fn new(registry: Arc<DefinitionRegistry>, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { registry, renderer }
    }

    pub async fn parse(
        &self,
        app_name: &str,
        namespace: &str,
        spec: &ApplicationSpec,
        app_revision_name: &str,
    ) -> Result<ParseOutcome> {
        spec.validate_unique_component_names()
            .map_err(|reason| Error::ParseFailed {
                app: app_name.to_string(),
                reason,
            })?;

        let mut components = Vec::with_capacity(spec.components.len());
        let mut resolved = BTreeMap::new();

        for component in &spec.components {
            let manifest = self
                .parse_component(app_name, namespace, app_revision_name, component, &mut resolved)
                .await?;
            components.push(manifest);
        }

        let plan = ManifestPlan { components };
        let resolved_definitions: Vec<ResolvedDefinition> = resolved.into_values().collect();
        let hash = compute_hash(spec, &resolved_definitions, &plan);

        Ok(ParseOutcome {
            plan,
            resolved_definitions,
            hash,
        })
    }

    async fn parse_component(
        &self,
        app_name: &str,
        namespace: &str,
        app_revision_name: &str,
        component: &Component,
        resolved: &mut BTreeMap<(DefinitionKind, String), ResolvedDefinition>,
    ) -> Result<ComponentManifest> {
        let def = self
            .resolve(DefinitionKind::Component, &component.component_type, resolved)
            .await?;

        let component_revision = format!("{}-{}", component.name, app_revision_name);
        let mut ctx = RenderContext {
            app_name: app_name.to_string(),
            namespace: namespace.to_string(),
            component_name: component.name.clone(),
            app_revision: app_revision_name.to_string(),
            prior_outputs: BTreeMap::new(),
        };

        let rendered = self.renderer.render_component(
            &def.template,
            &def.metadata.required_parameters,
            &component.properties,
            &ctx,
        )?;

        if !def.metadata.applies_to_workloads.is_empty() {
            let gvk = workload_gvk(&rendered.manifest);
            if !def.metadata.applies_to_workloads.contains(&gvk) {
                return Err(Error::DefinitionMismatch {
                    component: component.name.clone(),
                    definition: component.component_type.clone(),
                    actual: gvk,
                });
            }
        }

        ctx.prior_outputs = rendered.outputs.clone();

        let labels = labels_for(&ctx, &component_revision, None);

        let mut traits = Vec::with_capacity(component.traits.len());
        // (type, index) is assigned by position among same-typed traits,
        // not raw declaration order (§9).
        let mut seen_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for trait_decl in &component.traits {
            let index = {
                let counter = seen_counts.entry(trait_decl.trait_type.as_str()).or_insert(0);
                let i = *counter;
                *counter += 1;
                i
            };

            let trait_def = self
                .resolve(DefinitionKind::Trait, &trait_decl.trait_type, resolved)
                .await?;

            let rendered_trait = self.renderer.render_trait(
                &trait_def.template,
                &trait_def.metadata.required_parameters,
                &trait_decl.properties,
                &ctx,
            )?;

            ctx.prior_outputs.extend(rendered_trait.outputs.clone());

            traits.push(rendered_trait.into_manifest(
                trait_decl.trait_type.clone(),
                index,
                trait_def.metadata.stage,
            ));
        }

        Ok(ComponentManifest {
            component_name: component.name.clone(),
            component_type: component.component_type.clone(),
            labels,
            workload: rendered.manifest,
            auxiliary: rendered.auxiliary,
            traits,
        })
    }

    async fn resolve(
        &self,
        kind: DefinitionKind,
        name: &str,
        resolved: &mut BTreeMap<(DefinitionKind, String), ResolvedDefinition>,
    ) -> Result<ResolvedDefinition> {
        let key = (kind, name.to_string());
        if let Some(existing) = resolved.get(&key) {
            return Ok(existing.clone());
        }
        let def = self.registry.lookup(kind, name).await?;
        resolved.insert(key, def.clone());
        Ok(def)
    }
}

fn workload_gvk(manifest: &serde_json::Value) -> String {
    let api_version = manifest
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let kind = manifest.get("kind").and_then(|v| v.as_str()).unwrap_or_default();
    format!("{api_version}/{kind}")
}

/// Stable hash over the resolved (definition-pinned) plan (§4.3). Hashing
/// the app spec alone would miss definition changes; hashing the plan
/// alone would miss unused-but-declared definitions, so both go in.
fn compute_hash(
    spec: &ApplicationSpec,
    resolved_definitions: &[ResolvedDefinition],
    plan: &ManifestPlan,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(spec).unwrap_or_default());
    hasher.update(serde_json::to_vec(resolved_definitions).unwrap_or_default());
    hasher.update(serde_json::to_vec(plan).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, ComponentTrait};

    fn component(name: &str, traits: Vec<ComponentTrait>) -> Component {
        Component {
            name: name.to_string(),
            component_type: "webservice".to_string(),
            properties: serde_json::json!({}),
            traits,
            scopes: vec![],
        }
    }

    #[test]
    fn same_plan_and_definitions_hash_identically() {
        let spec1 = ApplicationSpec {
            components: vec![component("c1", vec![])],
            policies: vec![],
            workflow: None,
        };
        let spec2 = spec1.clone();
        let plan = ManifestPlan::default();
        let hash1 = compute_hash(&spec1, &[], &plan);
        let hash2 = compute_hash(&spec2, &[], &plan);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn different_specs_hash_differently() {
        let spec1 = ApplicationSpec {
            components: vec![component("c1", vec![])],
            policies: vec![],
            workflow: None,
        };
        let spec2 = ApplicationSpec {
            components: vec![component("c2", vec![])],
            policies: vec![],
            workflow: None,
        };
        let plan = ManifestPlan::default();
        assert_ne!(
            compute_hash(&spec1, &[], &plan),
            compute_hash(&spec2, &[], &plan)
        );
    }

    #[test]
    fn trait_indices_are_assigned_per_type_not_declaration_order() {
        let traits = vec![
            ComponentTrait {
                trait_type: "annotations".into(),
                properties: serde_json::json!({"a": 1}),
            },
            ComponentTrait {
                trait_type: "scaler".into(),
                properties: serde_json::json!({}),
            },
            ComponentTrait {
                trait_type: "annotations".into(),
                properties: serde_json::json!({"a": 2}),
            },
        ];
        let mut seen_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let indices: Vec<usize> = traits
            .iter()
            .map(|t| {
                let counter = seen_counts.entry(t.trait_type.as_str()).or_insert(0);
                let i = *counter;
                *counter += 1;
                i
            })
            .collect();
        assert_eq!(indices, vec![0, 0, 1]);
    }
}
