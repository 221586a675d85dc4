//! Admission webhook surface (§6): validates that referenced definitions
//! exist and that templates reference only known GVKs. The webhook server
//! itself (TLS termination, cert rotation) is an external collaborator;
//! this crate only ships the validation logic it would call into, behind a
//! trait so the HTTP plumbing can be swapped or faked in tests.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::ApplicationSpec;
use crate::registry::DefinitionRegistry;

/// Validates an incoming `Application` before it is admitted (§6: "validates
/// that referenced definitions exist and that CUE templates reference only
/// known GVKs"). The CUE-template-GVK check itself depends on the template
/// runtime (out of scope, §1 Non-goals); this crate validates what it can
/// decide on its own: that every referenced definition is registered.
#[async_trait]
pub trait DefinitionValidator: Send + Sync {
    async fn validate(&self, spec: &ApplicationSpec) -> Result<()>;
}

/// Checks every component type and trait type referenced by an `Application`
/// against the live `DefinitionRegistry`, the same lookup the Parser (§4.3)
/// itself performs — reused here so admission-time and reconcile-time
/// resolution never disagree.
pub struct RegistryDefinitionValidator {
    registry: Arc<DefinitionRegistry>,
}

impl RegistryDefinitionValidator {
    pub fn new(registry: Arc<DefinitionRegistry>) -> Arc<Self> {
        Arc::new(Self { registry })
    }
}

#[async_trait]
impl DefinitionValidator for RegistryDefinitionValidator {
    async fn validate(&self, spec: &ApplicationSpec) -> Result<()> {
        for component in &spec.components {
            self.registry
                .lookup(crate::model::DefinitionKind::Component, &component.component_type)
                .await?;
            for t in &component.traits {
                self.registry
                    .lookup(crate::model::DefinitionKind::Trait, &t.trait_type)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValid;

    #[async_trait]
    impl DefinitionValidator for AlwaysValid {
        async fn validate(&self, _spec: &ApplicationSpec) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fake_validator_is_callable_through_the_trait_object() {
        let validator: Arc<dyn DefinitionValidator> = Arc::new(AlwaysValid);
        let spec = ApplicationSpec {
            components: vec![],
            policies: vec![],
            workflow: None,
        };
        assert!(validator.validate(&spec).await.is_ok());
    }
}
