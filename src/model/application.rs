//! The user-facing `Application` CRD: components, traits, policies, and an
//! opaque workflow (out of scope, carried verbatim).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::ApplicationStatus;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComponentTrait {
    #[serde(rename = "type")]
    pub trait_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Component {
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub traits: Vec<ComponentTrait>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "Application",
    plural = "applications",
    namespaced,
    status = "ApplicationStatus",
    shortname = "app"
)]
pub struct ApplicationSpec {
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// The workflow is out of scope for this engine; it is preserved
    /// untouched across parse/snapshot/render so it round-trips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<serde_json::Value>,
}

impl ApplicationSpec {
    /// Component names must be unique within an Application (invariant, §3).
    pub fn validate_unique_component_names(&self) -> Result<(), String> {
        let mut seen = std::collections::BTreeSet::new();
        for c in &self.components {
            if !seen.insert(c.name.as_str()) {
                return Err(format!("duplicate component name {}", c.name));
            }
        }
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(name: &str) -> Component {
        Component {
            name: name.to_string(),
            component_type: "webservice".to_string(),
            properties: serde_json::json!({}),
            traits: vec![],
            scopes: vec![],
        }
    }

    #[test]
    fn duplicate_component_names_are_rejected() {
        let spec = ApplicationSpec {
            components: vec![comp("c1"), comp("c1")],
            policies: vec![],
            workflow: None,
        };
        assert!(spec.validate_unique_component_names().is_err());
    }

    #[test]
    fn unique_component_names_are_accepted() {
        let spec = ApplicationSpec {
            components: vec![comp("c1"), comp("c2")],
            policies: vec![],
            workflow: None,
        };
        assert!(spec.validate_unique_component_names().is_ok());
    }
}
