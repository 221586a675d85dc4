//! The data model: CRD shapes pinned into revisions, plus the in-memory
//! plan and status types that sit between them.

pub mod application;
pub mod definition;
pub mod revision;
pub mod rollout;
pub mod status;
pub mod tracker;

pub use application::{Application, ApplicationSpec, Component, ComponentTrait, Policy};
pub use definition::{
    ComponentDefinition, DefinitionKind, DefinitionMetadata, DispatchStage, HealthPolicy,
    PatchStrategy, PolicyDefinition, TraitDefinition, WorkflowStepDefinition,
};
pub use revision::{
    ApplicationRevision, ApplicationRevisionSpec, ComponentManifest, ManifestLabels, ManifestPlan,
    ResolvedDefinition, TraitManifest,
};
pub use rollout::{AppRollout, AppRolloutSpec, AppRolloutStatus, RolloutPlan, RolloutState};
pub use status::{ApplicationStatus, ComponentStatus, Phase, TraitStatus, WorkloadStatus};
pub use tracker::{ResourceTracker, ResourceTrackerEntry, ResourceTrackerSpec};
