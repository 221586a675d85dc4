//! Pure rollout state transitions (§4.7, §9): no cluster I/O, no clock —
//! every decision is a function of the current state plus one reconcile's
//! observations. `RolloutController` is the only caller; it owns the I/O.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::model::rollout::{RolloutEvent, RolloutPlan, RolloutState};

/// What the controller observed this reconcile about the target and source
/// workloads, plus any external signals (deletion, manual-gate resume).
#[derive(Debug, Clone, Default)]
pub struct RolloutObservation {
    pub target_replicas: i32,
    /// Health of the target workload at its *current* replica count, per the
    /// target component definition's health policy.
    pub target_ready: bool,
    pub source_replicas: i32,
    pub deleting: bool,
    /// Set when the `core.oam.dev/resume-rollout` annotation is present on
    /// the `AppRollout`; the only trigger a paused (`manualGating`) batch
    /// responds to. Not named in the distilled spec; read from the live
    /// object rather than hidden internal state, matching how imperative
    /// resume signals are normally surfaced in this kind of controller.
    pub resume_requested: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub state: RolloutState,
    pub desired_target_replicas: Option<i32>,
    pub desired_source_replicas: Option<i32>,
    pub event: Option<RolloutEvent>,
}

/// §3: the rolled component is either the sole entry of `componentList`, or
/// (when that list is empty) the unique component both revisions share.
/// More than one candidate in the second case is `AmbiguousRolloutTarget`.
pub fn locate_target_component(
    explicit: &[String],
    source_components: &BTreeSet<String>,
    target_components: &BTreeSet<String>,
    rollout_name: &str,
) -> Result<String> {
    if let Some(name) = explicit.first() {
        return Ok(name.clone());
    }
    let common: Vec<&String> = source_components.intersection(target_components).collect();
    match common.as_slice() {
        [only] => Ok((*only).clone()),
        other => Err(Error::AmbiguousRolloutTarget {
            name: rollout_name.to_string(),
            candidates: other.len(),
        }),
    }
}

/// One reconcile's worth of state-machine progress.
pub fn step(state: &RolloutState, plan: &RolloutPlan, obs: &RolloutObservation, sequence: u64) -> Result<StepOutcome> {
    if obs.deleting && !matches!(state, RolloutState::Deleting | RolloutState::Finalized) {
        return Ok(transition(
            state,
            RolloutState::Deleting,
            sequence,
            "AppRollout is being deleted".to_string(),
            None,
            None,
        ));
    }

    match state {
        RolloutState::LocatingTarget => Ok(transition(
            state,
            RolloutState::InBatches { batch_partition: 0 },
            sequence,
            "target revision located; entering batch 0".to_string(),
            plan.batches.first().map(|b| b.replicas),
            None,
        )),
        RolloutState::InBatches { batch_partition } => step_in_batches(*batch_partition, plan, obs, sequence, state),
        RolloutState::Finalizing => Ok(transition(
            state,
            RolloutState::Succeeded,
            sequence,
            "rollout finalized".to_string(),
            None,
            None,
        )),
        RolloutState::Abandoning {
            next_source,
            next_target,
            ..
        } => {
            if !obs.target_ready {
                return Ok(StepOutcome {
                    state: state.clone(),
                    ..Default::default()
                });
            }
            Ok(transition(
                state,
                RolloutState::LocatingTarget,
                sequence,
                format!("in-flight batch settled; adopting new source {next_source} / target {next_target}"),
                None,
                None,
            ))
        }
        terminal @ (RolloutState::Succeeded
        | RolloutState::Failed { .. }
        | RolloutState::Deleting
        | RolloutState::Finalized) => Ok(StepOutcome {
            state: terminal.clone(),
            ..Default::default()
        }),
    }
}

fn step_in_batches(
    batch_partition: usize,
    plan: &RolloutPlan,
    obs: &RolloutObservation,
    sequence: u64,
    state: &RolloutState,
) -> Result<StepOutcome> {
    let Some(batch) = plan.batches.get(batch_partition) else {
        return Ok(transition(
            state,
            RolloutState::Finalizing,
            sequence,
            "all batches complete".to_string(),
            None,
            None,
        ));
    };

    // Phase A: scale the target up to this batch's replica count.
    if obs.target_replicas < batch.replicas {
        return Ok(StepOutcome {
            state: state.clone(),
            desired_target_replicas: Some(batch.replicas),
            ..Default::default()
        });
    }

    // Phase A continued: wait for the target to report ready at that count
    // before touching the source (IncreaseFirst, §4.7).
    if !obs.target_ready {
        return Ok(StepOutcome {
            state: state.clone(),
            ..Default::default()
        });
    }

    // Phase B: drain the source by the same delta so the combined replica
    // count across both revisions stays pinned at targetSize.
    let desired_source = plan.target_size - batch.replicas;
    if obs.source_replicas > desired_source {
        return Ok(StepOutcome {
            state: state.clone(),
            desired_source_replicas: Some(desired_source),
            ..Default::default()
        });
    }

    if plan.manual_gating && !obs.resume_requested {
        return Ok(StepOutcome {
            state: state.clone(),
            ..Default::default()
        });
    }

    let next_partition = batch_partition + 1;
    if next_partition >= plan.batches.len() {
        Ok(transition(
            state,
            RolloutState::Finalizing,
            sequence,
            format!("batch {batch_partition} complete; all batches done"),
            None,
            None,
        ))
    } else {
        Ok(transition(
            state,
            RolloutState::InBatches {
                batch_partition: next_partition,
            },
            sequence,
            format!("batch {batch_partition} complete; advancing to batch {next_partition}"),
            plan.batches.get(next_partition).map(|b| b.replicas),
            None,
        ))
    }
}

fn transition(
    from: &RolloutState,
    to: RolloutState,
    sequence: u64,
    message: String,
    desired_target: Option<i32>,
    desired_source: Option<i32>,
) -> StepOutcome {
    let event = RolloutEvent {
        sequence,
        from: format!("{from:?}"),
        to: format!("{to:?}"),
        message,
    };
    StepOutcome {
        state: to,
        desired_target_replicas: desired_target,
        desired_source_replicas: desired_source,
        event: Some(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rollout::{RolloutBatch, RolloutStrategy};

    fn plan() -> RolloutPlan {
        RolloutPlan {
            strategy: RolloutStrategy::IncreaseFirst,
            batches: vec![RolloutBatch { replicas: 2 }, RolloutBatch { replicas: 4 }],
            target_size: 4,
            manual_gating: false,
        }
    }

    #[test]
    fn locating_target_enters_batch_zero() {
        let outcome = step(&RolloutState::LocatingTarget, &plan(), &RolloutObservation::default(), 0).unwrap();
        assert_eq!(outcome.state, RolloutState::InBatches { batch_partition: 0 });
        assert_eq!(outcome.desired_target_replicas, Some(2));
    }

    #[test]
    fn batch_scales_target_before_touching_source() {
        let state = RolloutState::InBatches { batch_partition: 0 };
        let obs = RolloutObservation {
            target_replicas: 0,
            target_ready: false,
            source_replicas: 4,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &obs, 1).unwrap();
        assert_eq!(outcome.desired_target_replicas, Some(2));
        assert_eq!(outcome.desired_source_replicas, None);
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn batch_waits_for_target_ready_before_draining_source() {
        let state = RolloutState::InBatches { batch_partition: 0 };
        let obs = RolloutObservation {
            target_replicas: 2,
            target_ready: false,
            source_replicas: 4,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &obs, 1).unwrap();
        assert_eq!(outcome.desired_target_replicas, None);
        assert_eq!(outcome.desired_source_replicas, None);
    }

    #[test]
    fn batch_drains_source_once_target_ready() {
        let state = RolloutState::InBatches { batch_partition: 0 };
        let obs = RolloutObservation {
            target_replicas: 2,
            target_ready: true,
            source_replicas: 4,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &obs, 1).unwrap();
        assert_eq!(outcome.desired_source_replicas, Some(2));
    }

    #[test]
    fn batch_advances_once_source_drained_to_target() {
        let state = RolloutState::InBatches { batch_partition: 0 };
        let obs = RolloutObservation {
            target_replicas: 2,
            target_ready: true,
            source_replicas: 2,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &obs, 1).unwrap();
        assert_eq!(outcome.state, RolloutState::InBatches { batch_partition: 1 });
        assert_eq!(outcome.desired_target_replicas, Some(4));
    }

    #[test]
    fn last_batch_complete_moves_to_finalizing_then_succeeded() {
        let state = RolloutState::InBatches { batch_partition: 1 };
        let obs = RolloutObservation {
            target_replicas: 4,
            target_ready: true,
            source_replicas: 0,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &obs, 2).unwrap();
        assert_eq!(outcome.state, RolloutState::Finalizing);

        let outcome = step(&outcome.state, &plan(), &RolloutObservation::default(), 3).unwrap();
        assert_eq!(outcome.state, RolloutState::Succeeded);
    }

    #[test]
    fn manual_gating_pauses_until_resume_requested() {
        let mut gated = plan();
        gated.manual_gating = true;
        let state = RolloutState::InBatches { batch_partition: 0 };
        let obs = RolloutObservation {
            target_replicas: 2,
            target_ready: true,
            source_replicas: 2,
            resume_requested: false,
            ..Default::default()
        };
        let outcome = step(&state, &gated, &obs, 1).unwrap();
        assert_eq!(outcome.state, state);

        let resumed = RolloutObservation {
            resume_requested: true,
            ..obs
        };
        let outcome = step(&state, &gated, &resumed, 1).unwrap();
        assert_eq!(outcome.state, RolloutState::InBatches { batch_partition: 1 });
    }

    #[test]
    fn deletion_preempts_any_in_flight_state() {
        let state = RolloutState::InBatches { batch_partition: 0 };
        let obs = RolloutObservation {
            deleting: true,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &obs, 5).unwrap();
        assert_eq!(outcome.state, RolloutState::Deleting);
    }

    #[test]
    fn abandoning_waits_for_in_flight_batch_then_adopts_new_target() {
        let state = RolloutState::Abandoning {
            batch_partition: 0,
            completing_target: "app-v1".into(),
            next_source: "app-v1".into(),
            next_target: "app-v2".into(),
        };
        let not_ready = RolloutObservation {
            target_ready: false,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &not_ready, 1).unwrap();
        assert_eq!(outcome.state, state);

        let ready = RolloutObservation {
            target_ready: true,
            ..Default::default()
        };
        let outcome = step(&state, &plan(), &ready, 1).unwrap();
        assert_eq!(outcome.state, RolloutState::LocatingTarget);
    }

    #[test]
    fn explicit_component_list_wins_over_intersection() {
        let source: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let target: BTreeSet<String> = ["b".to_string(), "c".to_string()].into_iter().collect();
        let name = locate_target_component(&["a".to_string()], &source, &target, "r1").unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn unique_common_component_is_located_without_explicit_list() {
        let source: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let target: BTreeSet<String> = ["b".to_string(), "c".to_string()].into_iter().collect();
        let name = locate_target_component(&[], &source, &target, "r1").unwrap();
        assert_eq!(name, "b");
    }

    #[test]
    fn multiple_common_components_is_ambiguous() {
        let source: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let target: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let err = locate_target_component(&[], &source, &target, "r1").unwrap_err();
        assert!(matches!(err, Error::AmbiguousRolloutTarget { candidates: 2, .. }));
    }
}
