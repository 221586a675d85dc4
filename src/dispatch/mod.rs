//! Resource Keeper / Dispatcher (§4.5): realizes a Manifest Plan on the
//! cluster, maintaining the invariant that every dispatched resource is
//! owned by exactly one `ResourceTracker`.

pub mod cluster;
pub mod keeper;

pub use cluster::{ClusterClientFactory, ClusterIdentityCache, ConfigMapClusterIdentityCache, SingleClusterClientFactory};
pub use keeper::{DispatchPlanOutcome, ResourceKeeper};
