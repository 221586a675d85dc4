//! Metrics collector seam (§6): an external collaborator in the
//! distillation's framing, modeled as a trait with one concrete in-process
//! implementation that logs through `tracing` the same way the teacher's
//! `controller::run` reports progress — a real metrics backend (Prometheus
//! registry, push gateway) would implement the same trait without touching
//! reconcile.rs or rollout/controller.rs.

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Succeeded,
    Requeued,
    Failed,
}

pub trait MetricsSink: Send + Sync {
    fn reconcile_finished(&self, kind: &str, name: &str, outcome: ReconcileOutcome);
    fn rollout_batch_advanced(&self, rollout: &str, batch_partition: usize);
    fn leader_status_changed(&self, is_leader: bool);
}

/// Ships with the crate: every call becomes a structured log line. Standing
/// in for a Prometheus exporter until one is wired up at the binary level.
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn reconcile_finished(&self, kind: &str, name: &str, outcome: ReconcileOutcome) {
        info!(kind, name, ?outcome, "reconcile finished");
    }

    fn rollout_batch_advanced(&self, rollout: &str, batch_partition: usize) {
        info!(rollout, batch_partition, "rollout batch advanced");
    }

    fn leader_status_changed(&self, is_leader: bool) {
        info!(is_leader, "leader status changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    impl MetricsSink for CountingSink {
        fn reconcile_finished(&self, _kind: &str, _name: &str, _outcome: ReconcileOutcome) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn rollout_batch_advanced(&self, _rollout: &str, _batch_partition: usize) {}
        fn leader_status_changed(&self, _is_leader: bool) {}
    }

    #[test]
    fn fake_sink_is_callable_through_the_trait_object() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink: Box<dyn MetricsSink> = Box::new(CountingSink(count.clone()));
        sink.reconcile_finished("Application", "app1", ReconcileOutcome::Succeeded);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
