//! Rollout Controller (§4.7): a per-`AppRollout` reconciler driving the
//! source→target batch migration state machine.

pub mod controller;
pub mod state_machine;

pub use controller::RolloutController;
pub use state_machine::{locate_target_component, step, RolloutObservation, StepOutcome};
