//! Application Reconcile Loop (§4.8): the top-level controller wiring
//! parse → revise → dispatch → collect, then either the steady-state status
//! write or a hand-off to the Rollout Controller. Grounded on the same
//! `kube::runtime::Controller` applier pattern as the modern operator in the
//! pack (`watcher::Config`-based, `shutdown_on_signal`, per-key
//! serialization relied upon rather than hand-rolled) rather than the
//! teacher's own list-based cron job, which this loop replaces (§5: "this is
//! relied upon rather than hand-rolled, the same way the teacher relies on
//! `kube::runtime` for its (simpler) list-based loop").

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ApplicationConfig, ControllerConfig, OamConfig};
use crate::dispatch::ResourceKeeper;
use crate::error::{Disposition, Error, Result};
use crate::health;
use crate::metrics::{MetricsSink, ReconcileOutcome};
use crate::model::rollout::{AppRollout, RolloutState};
use crate::model::status::Phase;
use crate::model::tracker::{ResourceTracker, ResourceTrackerEntry, ResourceTrackerSpec};
use crate::model::Application;
use crate::parser::ApplicationParser;
use crate::revision_store::RevisionStore;
use crate::rollout::RolloutController;

pub struct ReconcileContext {
    pub client: kube::Client,
    pub parser: ApplicationParser,
    pub revision_store: RevisionStore,
    pub keeper: Arc<ResourceKeeper>,
    pub rollout_controller: RolloutController,
    pub application_config: ApplicationConfig,
    pub oam_config: OamConfig,
    pub controller_config: ControllerConfig,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Per §4.8 step 5: an `AppRollout` referencing the current revision as its
/// target, not yet terminal, preempts steady-state status handling for the
/// one component it names.
async fn active_rollout_for(ctx: &ReconcileContext, namespace: &str, revision_name: &str) -> Result<Option<AppRollout>> {
    let api: Api<AppRollout> = Api::namespaced(ctx.client.clone(), namespace);
    let rollouts = api.list(&ListParams::default()).await?;
    Ok(rollouts
        .items
        .into_iter()
        .find(|r| r.spec.target_revision == revision_name && !r.status.as_ref().is_some_and(|s| s.state.is_terminal())))
}

pub async fn reconcile(app: Arc<Application>, ctx: Arc<ReconcileContext>) -> Result<Action> {
    let app_name = app.name_any();
    let namespace = app.namespace().unwrap_or_else(|| "default".to_string());

    // §9: labels are seeded from the Application's own stable name rather
    // than the numbered ApplicationRevision name, so the content hash
    // (which is computed over the rendered plan, labels included) stays
    // invariant under revision-sequence bookkeeping. The numbered name
    // (`<appName>-v<n>`) remains the ApplicationRevision object's own
    // immutable identity, assigned by the Revision Store.
    // Captured before `upsert` mints a new revision, so an upgrade's
    // ownership-transfer lookup (§4.5) targets the revision that actually
    // owns the live resources today, not the one this reconcile just
    // created.
    let prior_revision_name = app.status.as_ref().and_then(|s| s.current_revision.clone());

    let outcome = ctx.parser.parse(&app_name, &namespace, &app.spec, &app_name).await?;
    let revision = ctx.revision_store.upsert(&app, &outcome).await?;
    let revision_name = revision.name_any();

    let tracker_name = ResourceTrackerSpec::name_for(&revision_name, &namespace);
    let owner_tracker = ensure_tracker(&ctx, &tracker_name, &revision_name, &namespace).await?;

    let tracker_api: Api<ResourceTracker> = Api::all(ctx.client.clone());
    let prior_tracker_name = prior_revision_name
        .as_ref()
        .filter(|prior| prior.as_str() != revision_name.as_str())
        .map(|prior| ResourceTrackerSpec::name_for(prior, &namespace));
    let prior_tracker = match &prior_tracker_name {
        Some(name) => match tracker_api.get(name).await {
            Ok(tracker) => Some(tracker.spec),
            Err(kube::Error::Api(resp)) if resp.code == 404 => None,
            Err(err) => return Err(err.into()),
        },
        None => None,
    };

    let active_rollout = active_rollout_for(&ctx, &namespace, &revision_name).await?;
    let rolling_component = active_rollout.as_ref().and_then(|r| r.spec.component_list.first().map(String::as_str));

    let dispatch_outcome = ctx
        .keeper
        .dispatch(
            &namespace,
            &revision_name,
            &revision.spec.plan,
            &revision.spec.resolved_definitions,
            prior_tracker.as_ref(),
            rolling_component,
            &owner_tracker,
        )
        .await?;

    persist_tracker_resources(&ctx, &tracker_name, &dispatch_outcome.tracker.resources).await?;
    // §4.4 GC: the prior revision's tracker no longer owns anything once its
    // live resources have been transferred or deleted above; clear its own
    // resources list so `RevisionStore::gc`'s `tracker_is_empty` can reclaim
    // it once `AppRevisionLimit` is exceeded.
    if let Some(prior_name) = &prior_tracker_name {
        clear_tracker_resources(&ctx, prior_name).await?;
    }

    let mut live_workloads: BTreeMap<String, Value> = BTreeMap::new();
    for component in &revision.spec.plan.components {
        let (api_version, kind) = workload_gvk(&component.workload);
        if let Some(live) = ctx
            .keeper
            .read_workload(&api_version, &kind, &namespace, &component.component_name)
            .await?
        {
            live_workloads.insert(component.component_name.clone(), live);
        }
    }

    let mut status = health::collect(
        &revision.spec.plan,
        &revision.spec.resolved_definitions,
        &live_workloads,
        &dispatch_outcome.health,
        true,
    );
    status.current_revision = Some(revision_name.clone());

    if let Some(rollout) = &active_rollout {
        status.phase = Phase::RollingOut;
        let rollout_status = ctx.rollout_controller.reconcile(rollout, &namespace).await?;
        let rollout_api: Api<AppRollout> = Api::namespaced(ctx.client.clone(), &namespace);
        RevisionStore::patch_status(&rollout_api, &rollout.name_any(), serde_json::to_value(&rollout_status)?).await?;
        if matches!(rollout_status.state, RolloutState::InBatches { .. }) {
            ctx.metrics.rollout_batch_advanced(&rollout.name_any(), batch_partition(&rollout_status.state));
        }
    }

    let active_rollout_revisions: std::collections::BTreeSet<String> =
        active_rollout.iter().flat_map(|r| [r.spec.source_revision.clone(), r.spec.target_revision.clone()]).collect();
    ctx.revision_store.gc(&app, &revision_name, &active_rollout_revisions).await?;

    let app_api: Api<Application> = Api::namespaced(ctx.client.clone(), &namespace);
    RevisionStore::patch_status(&app_api, &app_name, serde_json::to_value(&status)?).await?;

    ctx.metrics.reconcile_finished("Application", &app_name, ReconcileOutcome::Succeeded);
    Ok(Action::requeue(Duration::from_secs(ctx.application_config.resync_secs)))
}

/// Get-or-create an empty-resources tracker shell before dispatch, so it
/// carries a UID usable for `controller_owner_ref` before any object is
/// applied (§4.5).
async fn ensure_tracker(ctx: &ReconcileContext, tracker_name: &str, revision_name: &str, namespace: &str) -> Result<ResourceTracker> {
    let api: Api<ResourceTracker> = Api::all(ctx.client.clone());
    match api.get(tracker_name).await {
        Ok(tracker) => Ok(tracker),
        Err(kube::Error::Api(resp)) if resp.code == 404 => {
            let tracker = ResourceTracker {
                metadata: kube::api::ObjectMeta {
                    name: Some(tracker_name.to_string()),
                    ..Default::default()
                },
                spec: ResourceTrackerSpec {
                    application_revision: revision_name.to_string(),
                    namespace: namespace.to_string(),
                    resources: Vec::new(),
                },
            };
            Ok(api.create(&kube::api::PostParams::default(), &tracker).await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Patch the tracker's `.spec.resources` once dispatch has computed the
/// final entry list for this revision.
async fn persist_tracker_resources(ctx: &ReconcileContext, tracker_name: &str, resources: &[ResourceTrackerEntry]) -> Result<()> {
    let api: Api<ResourceTracker> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({ "spec": { "resources": resources } });
    api.patch(tracker_name, &kube::api::PatchParams::apply("vela-core"), &kube::api::Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Empties a prior revision's tracker once its resources have all been
/// transferred to the current revision's tracker or deleted, so
/// `RevisionStore::gc`'s `tracker_is_empty` check can free it (§4.4).
async fn clear_tracker_resources(ctx: &ReconcileContext, tracker_name: &str) -> Result<()> {
    let api: Api<ResourceTracker> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({ "spec": { "resources": Vec::<ResourceTrackerEntry>::new() } });
    match api
        .patch(tracker_name, &kube::api::PatchParams::apply("vela-core"), &kube::api::Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn workload_gvk(workload: &Value) -> (String, String) {
    let api_version = workload.get("apiVersion").and_then(Value::as_str).unwrap_or_default().to_string();
    let kind = workload.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();
    (api_version, kind)
}

fn batch_partition(state: &RolloutState) -> usize {
    match state {
        RolloutState::InBatches { batch_partition } => *batch_partition,
        _ => 0,
    }
}

pub fn error_policy(app: Arc<Application>, err: &Error, ctx: Arc<ReconcileContext>) -> Action {
    let name = app.name_any();
    error!(app = %name, error = %err, disposition = %err.disposition(), "application reconcile failed");
    ctx.metrics.reconcile_finished("Application", &name, ReconcileOutcome::Failed);
    match err.disposition() {
        Disposition::RetryFresh => Action::requeue(Duration::from_secs(1)),
        Disposition::SurfaceAndBackoff => Action::requeue(Duration::from_secs(30)),
        Disposition::SurfaceAndWait => Action::requeue(Duration::from_secs(ctx.application_config.resync_secs)),
        Disposition::Informational => Action::requeue(Duration::from_secs(ctx.application_config.resync_secs)),
        Disposition::Reject => Action::await_change(),
    }
}

/// Runs the Application controller until `shutdown` is cancelled (process
/// shutdown or lease loss, §5). Per-key serialization across concurrent
/// reconciles is the applier's own guarantee, not hand-rolled here.
pub async fn run(ctx: Arc<ReconcileContext>, shutdown: CancellationToken) {
    let api: Api<Application> = Api::all(ctx.client.clone());
    if let Err(err) = api.list(&ListParams::default().limit(1)).await {
        error!(error = %err, "Application CRD is not queryable; is it installed?");
        return;
    }

    info!("starting application controller");
    // §5: N worker tasks (default ConcurrentReconciles = 4); the applier
    // still guarantees at-most-one in-flight reconcile per key.
    let concurrency = ctx.controller_config.concurrent_reconciles.clamp(1, u16::MAX as usize) as u16;
    let stream = Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .concurrency(concurrency)
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, _action)) => info!(name = %obj_ref.name, "application reconciled"),
                Err(err) => warn!(error = %err, "application reconcile error"),
            }
        });

    tokio::select! {
        _ = stream => {}
        _ = shutdown.cancelled() => info!("application controller stopping: leadership lost or shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_partition_reads_in_batches_state() {
        assert_eq!(batch_partition(&RolloutState::InBatches { batch_partition: 3 }), 3);
        assert_eq!(batch_partition(&RolloutState::Succeeded), 0);
    }
}
