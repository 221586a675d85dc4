//! Leader election (§5): exactly one replica reconciles at a time, guarded
//! by a `coordination.k8s.io/v1::Lease`. Modeled on the teacher's sibling
//! operator configuration shape (lease/renew/retry durations as distinct
//! knobs) but the acquire/renew loop itself is new — the teacher's own
//! cron-based controller never needed one.

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::LeaderElectionConfig;

const FIELD_MANAGER: &str = "vela-core-leader-election";

/// Holds the lease for as long as this process can keep renewing it.
/// `token` is cancelled the moment a renew fails or is lost to another
/// holder, so callers can tie in-flight reconciles to it cooperatively
/// (§5: "On lease loss, all in-flight reconciles are cancelled").
pub struct LeaderElector {
    client: kube::Client,
    namespace: String,
    lease_name: String,
    identity: String,
    config: LeaderElectionConfig,
}

impl LeaderElector {
    pub fn new(client: kube::Client, lease_name: impl Into<String>, identity: impl Into<String>, config: LeaderElectionConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            lease_name: lease_name.into(),
            identity: identity.into(),
            config,
        }
    }

    /// Blocks until this process holds the lease, then spawns a renewal
    /// loop and returns a token that is cancelled on loss. Retries
    /// acquisition at `retry_period_secs` until successful or `token` is
    /// itself cancelled by the caller (process shutdown).
    pub async fn acquire(&self, shutdown: CancellationToken) -> CancellationToken {
        let lost = CancellationToken::new();
        loop {
            if shutdown.is_cancelled() {
                lost.cancel();
                return lost;
            }
            match self.try_acquire_or_renew().await {
                Ok(true) => break,
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_secs(self.config.retry_period_secs)) => {}
                        _ = shutdown.cancelled() => { lost.cancel(); return lost; }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "leader election acquire failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(self.config.retry_period_secs)).await;
                }
            }
        }

        info!(lease = %self.lease_name, identity = %self.identity, "acquired leadership");
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let lease_name = self.lease_name.clone();
        let identity = self.identity.clone();
        let renew_deadline = self.config.renew_deadline_secs;
        let lost_for_task = lost.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(renew_deadline)) => {}
                    _ = shutdown.cancelled() => { lost_for_task.cancel(); return; }
                }
                match renew(&api, &lease_name, &identity).await {
                    Ok(()) => {}
                    Err(err) => {
                        warn!(error = %err, "failed to renew leadership lease, surrendering");
                        lost_for_task.cancel();
                        return;
                    }
                }
            }
        });

        lost
    }

    async fn try_acquire_or_renew(&self) -> crate::error::Result<bool> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(&self.lease_name).await {
            Ok(existing) => {
                let holder = existing.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
                let expired = existing
                    .spec
                    .as_ref()
                    .and_then(|s| s.renew_time.as_ref())
                    .map(|t| Utc::now().signed_duration_since(t.0).num_seconds() > self.config.lease_duration_secs as i64)
                    .unwrap_or(true);
                if holder == Some(self.identity.as_str()) {
                    renew(&api, &self.lease_name, &self.identity).await?;
                    Ok(true)
                } else if expired {
                    claim(&api, &self.lease_name, &self.identity, self.config.lease_duration_secs).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                create(&api, &self.lease_name, &self.identity, self.config.lease_duration_secs).await?;
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn create(api: &Api<Lease>, name: &str, identity: &str, duration_secs: u64) -> crate::error::Result<()> {
    let lease = Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(identity.to_string()),
            lease_duration_seconds: Some(duration_secs as i32),
            renew_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(Utc::now())),
            acquire_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime(Utc::now())),
            ..Default::default()
        }),
    };
    api.create(&PostParams::default(), &lease).await?;
    Ok(())
}

async fn claim(api: &Api<Lease>, name: &str, identity: &str, duration_secs: u64) -> crate::error::Result<()> {
    let patch = serde_json::json!({
        "spec": {
            "holderIdentity": identity,
            "leaseDurationSeconds": duration_secs,
            "acquireTime": Utc::now().to_rfc3339(),
            "renewTime": Utc::now().to_rfc3339(),
        }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

async fn renew(api: &Api<Lease>, name: &str, identity: &str) -> crate::error::Result<()> {
    let patch = serde_json::json!({
        "spec": {
            "holderIdentity": identity,
            "renewTime": Utc::now().to_rfc3339(),
        }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_durations_match_configuration_defaults() {
        let config = LeaderElectionConfig::default();
        assert_eq!(config.lease_duration_secs, 15);
        assert_eq!(config.renew_deadline_secs, 10);
        assert_eq!(config.retry_period_secs, 2);
    }
}
