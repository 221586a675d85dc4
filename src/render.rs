//! Template Renderer (§4.2). The template language itself — compiling a
//! definition's template body against user parameters — is an external
//! collaborator (§1, Non-goals): this module defines the *interface*
//! contract (`TemplateRenderer`) plus the one property the contract
//! insists on regardless of implementation — purity — and a deterministic
//! reference implementation used by the parser's own tests.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::definition::PatchStrategy;
use crate::model::revision::TraitManifest;
use crate::model::ManifestLabels;

/// Ambient context threaded into every render call: who is asking, and
/// what has already been produced by earlier steps in the same component.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub app_name: String,
    pub namespace: String,
    pub component_name: String,
    pub app_revision: String,
    /// Outputs produced by prior steps (e.g. the workload's own outputs,
    /// visible to traits rendered after it).
    pub prior_outputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RenderedWorkload {
    pub manifest: Value,
    pub auxiliary: Vec<Value>,
    pub outputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RenderedTraitPatch {
    pub patch: Value,
    pub patch_strategy: PatchStrategy,
    pub outputs: BTreeMap<String, Value>,
}

impl RenderedTraitPatch {
    pub fn into_manifest(self, trait_type: String, index: usize, stage: crate::model::definition::DispatchStage) -> TraitManifest {
        TraitManifest {
            trait_type,
            index,
            stage,
            patch_strategy: self.patch_strategy,
            patch: self.patch,
            outputs: self.outputs,
        }
    }
}

/// Rendering is pure: identical `(template, params, context)` yields
/// byte-identical output, and implementations must not read cluster state
/// (§4.2). This is an external collaborator in the full system; this
/// trait is the seam the Application Parser (§4.3) renders against.
pub trait TemplateRenderer: Send + Sync {
    fn render_component(
        &self,
        template: &str,
        required_parameters: &[String],
        params: &Value,
        ctx: &RenderContext,
    ) -> Result<RenderedWorkload>;

    fn render_trait(
        &self,
        template: &str,
        required_parameters: &[String],
        params: &Value,
        ctx: &RenderContext,
    ) -> Result<RenderedTraitPatch>;
}

pub fn validate_required_parameters(
    definition: &str,
    required: &[String],
    params: &Value,
) -> Result<()> {
    let obj = params.as_object();
    for field in required {
        let present = obj.is_some_and(|o| o.contains_key(field)) && !params[field].is_null();
        if !present {
            return Err(Error::TemplateParameterInvalid {
                definition: definition.to_string(),
                reason: format!("missing required parameter `{field}`"),
            });
        }
    }
    Ok(())
}

/// A structural reference renderer: it does not interpret CUE, it treats
/// `template` as a JSON object describing the manifest shape and splices
/// the parameter bag under `spec`, stamping identity from the context.
/// Good enough to drive the parser/dispatcher/health pipeline end to end
/// without a real template compiler attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralTemplateRenderer;

impl TemplateRenderer for StructuralTemplateRenderer {
    fn render_component(
        &self,
        template: &str,
        required_parameters: &[String],
        params: &Value,
        ctx: &RenderContext,
    ) -> Result<RenderedWorkload> {
        validate_required_parameters(&ctx.component_name, required_parameters, params)?;
        let mut manifest: Value = serde_json::from_str(template).map_err(|e| {
            Error::TemplateRenderFailed {
                definition: ctx.component_name.clone(),
                reason: format!("template is not valid JSON: {e}"),
            }
        })?;
        stamp_identity(&mut manifest, ctx);
        merge_params_into_spec(&mut manifest, params);
        Ok(RenderedWorkload {
            manifest,
            auxiliary: Vec::new(),
            outputs: BTreeMap::new(),
        })
    }

    fn render_trait(
        &self,
        template: &str,
        required_parameters: &[String],
        params: &Value,
        ctx: &RenderContext,
    ) -> Result<RenderedTraitPatch> {
        validate_required_parameters(&ctx.component_name, required_parameters, params)?;
        let mut patch: Value = serde_json::from_str(template).map_err(|e| {
            Error::TemplateRenderFailed {
                definition: ctx.component_name.clone(),
                reason: format!("template is not valid JSON: {e}"),
            }
        })?;
        merge_params_into_spec(&mut patch, params);
        Ok(RenderedTraitPatch {
            patch,
            patch_strategy: PatchStrategy::StrategicMerge,
            outputs: BTreeMap::new(),
        })
    }
}

fn stamp_identity(manifest: &mut Value, ctx: &RenderContext) {
    let Some(root) = manifest.as_object_mut() else {
        return;
    };
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.insert("name".to_string(), Value::String(ctx.component_name.clone()));
        metadata.insert("namespace".to_string(), Value::String(ctx.namespace.clone()));
    }
}

fn merge_params_into_spec(manifest: &mut Value, params: &Value) {
    if let Some(obj) = manifest.as_object_mut() {
        obj.insert("spec".to_string(), params.clone());
    }
}

pub fn labels_for(ctx: &RenderContext, component_revision: &str, cluster: Option<String>) -> ManifestLabels {
    ManifestLabels {
        app_name: ctx.app_name.clone(),
        component_name: ctx.component_name.clone(),
        component_revision: component_revision.to_string(),
        app_revision: ctx.app_revision.clone(),
        cluster,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        RenderContext {
            app_name: "app1".into(),
            namespace: "ns1".into(),
            component_name: "c1".into(),
            app_revision: "app1-v1".into(),
            prior_outputs: BTreeMap::new(),
        }
    }

    #[test]
    fn rendering_is_deterministic_given_identical_inputs() {
        let renderer = StructuralTemplateRenderer;
        let template = r#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{},"spec":{}}"#;
        let params = serde_json::json!({"image": "nginx:1.25", "port": 80});
        let a = renderer
            .render_component(template, &[], &params, &ctx())
            .unwrap();
        let b = renderer
            .render_component(template, &[], &params, &ctx())
            .unwrap();
        assert_eq!(a.manifest, b.manifest);
    }

    #[test]
    fn missing_required_parameter_fails() {
        let renderer = StructuralTemplateRenderer;
        let template = r#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{},"spec":{}}"#;
        let params = serde_json::json!({"image": "nginx:1.25"});
        let result = renderer.render_component(
            template,
            &["port".to_string()],
            &params,
            &ctx(),
        );
        assert!(matches!(
            result,
            Err(Error::TemplateParameterInvalid { .. })
        ));
    }

    #[test]
    fn renderer_stamps_identity_from_context_not_params() {
        let renderer = StructuralTemplateRenderer;
        let template = r#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{},"spec":{}}"#;
        let params = serde_json::json!({});
        let out = renderer.render_component(template, &[], &params, &ctx()).unwrap();
        assert_eq!(out.manifest["metadata"]["name"], "c1");
        assert_eq!(out.manifest["metadata"]["namespace"], "ns1");
    }
}
