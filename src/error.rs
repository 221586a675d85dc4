//! Domain error taxonomy for the reconciliation and rollout engine.
//!
//! One variant per row of the error table: each carries the context a
//! caller needs to decide `disposition()` without re-deriving it from a
//! bare string.

use crate::model::definition::DefinitionKind;
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How the reconcile loop (or rollout controller) should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Surface on the relevant status and wait for a spec change; do not
    /// requeue aggressively.
    SurfaceAndWait,
    /// Surface on status and requeue with exponential backoff.
    SurfaceAndBackoff,
    /// Retry the specific operation against fresh cluster state.
    RetryFresh,
    /// Not an error at all — a health observation to be reported as-is.
    Informational,
    /// Reject outright (e.g. at definition/validation time); never retried.
    Reject,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("definition {kind:?}/{name} not found")]
    DefinitionNotFound { kind: DefinitionKind, name: String },

    #[error("definition {kind:?}/{name} is invalid: {reason}")]
    DefinitionInvalid {
        kind: DefinitionKind,
        name: String,
        reason: String,
    },

    #[error("template parameter invalid for {definition}: {reason}")]
    TemplateParameterInvalid { definition: String, reason: String },

    #[error("template render failed for {definition}: {reason}")]
    TemplateRenderFailed { definition: String, reason: String },

    #[error("parse failed for application {app}: {reason}")]
    ParseFailed { app: String, reason: String },

    #[error(
        "component {component} workload GVK {actual} is not in appliesToWorkloads of {definition}"
    )]
    DefinitionMismatch {
        component: String,
        definition: String,
        actual: String,
    },

    #[error("dispatch conflict on {gvk} {namespace}/{name}")]
    DispatchConflict {
        gvk: String,
        namespace: String,
        name: String,
    },

    #[error("dispatch forbidden on {gvk} {namespace}/{name}: {reason}")]
    DispatchForbidden {
        gvk: String,
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("placement runOn/notRunOn conflict in {definition}: {reason}")]
    PlacementConflict { definition: String, reason: String },

    #[error("no eligible cluster for {gvk} {namespace}/{name}")]
    NoEligibleCluster {
        gvk: String,
        namespace: String,
        name: String,
    },

    #[error("rollout {name} stalled in batch {batch}: {reason}")]
    RolloutStalled {
        name: String,
        batch: usize,
        reason: String,
    },

    #[error("ambiguous rollout target for {name}: {candidates} common components")]
    AmbiguousRolloutTarget { name: String, candidates: usize },

    #[error("rollout {name} does not support in-place upgrade with placement constraints")]
    RolloutUnsupported { name: String },

    #[error("status write for {object} refused after retry: {reason}")]
    StatusWriteConflict { object: String, reason: String },

    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::DefinitionNotFound { .. } => Disposition::SurfaceAndWait,
            Error::DefinitionInvalid { .. } => Disposition::SurfaceAndWait,
            Error::TemplateParameterInvalid { .. } => Disposition::SurfaceAndWait,
            Error::TemplateRenderFailed { .. } => Disposition::SurfaceAndBackoff,
            Error::ParseFailed { .. } => Disposition::SurfaceAndBackoff,
            Error::DefinitionMismatch { .. } => Disposition::Reject,
            Error::DispatchConflict { .. } => Disposition::RetryFresh,
            Error::DispatchForbidden { .. } => Disposition::SurfaceAndBackoff,
            Error::PlacementConflict { .. } => Disposition::Reject,
            Error::NoEligibleCluster { .. } => Disposition::SurfaceAndWait,
            Error::RolloutStalled { .. } => Disposition::SurfaceAndWait,
            Error::AmbiguousRolloutTarget { .. } => Disposition::Reject,
            Error::RolloutUnsupported { .. } => Disposition::Reject,
            Error::StatusWriteConflict { .. } => Disposition::RetryFresh,
            Error::Kube(inner) => kube_disposition(inner),
            Error::Serde(_) => Disposition::SurfaceAndWait,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.disposition(),
            Disposition::RetryFresh | Disposition::SurfaceAndBackoff
        )
    }
}

fn kube_disposition(err: &kube::Error) -> Disposition {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => Disposition::RetryFresh,
        kube::Error::Api(resp) if resp.code == 403 => Disposition::SurfaceAndBackoff,
        kube::Error::Api(resp) if resp.code == 404 => Disposition::RetryFresh,
        _ => Disposition::SurfaceAndBackoff,
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Disposition::SurfaceAndWait => "surface-and-wait",
            Disposition::SurfaceAndBackoff => "surface-and-backoff",
            Disposition::RetryFresh => "retry-fresh",
            Disposition::Informational => "informational",
            Disposition::Reject => "reject",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_conflict_retries_fresh() {
        let err = Error::DispatchConflict {
            gvk: "apps/v1/Deployment".into(),
            namespace: "ns1".into(),
            name: "c1".into(),
        };
        assert_eq!(err.disposition(), Disposition::RetryFresh);
        assert!(err.is_retryable());
    }

    #[test]
    fn placement_conflict_is_rejected_not_retried() {
        let err = Error::PlacementConflict {
            definition: "expose".into(),
            reason: "runOn equals notRunOn".into(),
        };
        assert_eq!(err.disposition(), Disposition::Reject);
        assert!(!err.is_retryable());
    }
}
