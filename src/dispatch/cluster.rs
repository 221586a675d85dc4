//! Cluster-identity cache and the multi-cluster client factory seam (§5, §6).
//! Gateway fan-out to remote physical clusters is an external collaborator
//! (multicluster Non-goal); these traits are the seam it would plug into.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use moka::future::Cache;

use crate::error::Result;
use crate::placement::LabelSet;

const CLUSTER_IDENTITY_CONFIGMAP: &str = "vela-cluster-identity";
pub const LOCAL_CLUSTER: &str = "local";

/// Read-through, TTL-cached view of each cluster's identity labels.
/// Absent ConfigMap ⇒ empty label set ⇒ unrestricted placement (§6).
#[async_trait]
pub trait ClusterIdentityCache: Send + Sync {
    async fn labels(&self, cluster: &str) -> Result<LabelSet>;
    async fn known_clusters(&self) -> Vec<String>;
}

pub struct ConfigMapClusterIdentityCache {
    client: kube::Client,
    system_namespace: String,
    cache: Cache<String, LabelSet>,
}

impl ConfigMapClusterIdentityCache {
    pub fn new(client: kube::Client, system_namespace: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            client,
            system_namespace: system_namespace.into(),
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(30))
                .build(),
        })
    }
}

#[async_trait]
impl ClusterIdentityCache for ConfigMapClusterIdentityCache {
    async fn labels(&self, cluster: &str) -> Result<LabelSet> {
        if let Some(hit) = self.cache.get(cluster).await {
            return Ok(hit);
        }
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.system_namespace);
        let labels: LabelSet = match api.get(CLUSTER_IDENTITY_CONFIGMAP).await {
            Ok(cm) => cm.data.unwrap_or_default().into_iter().collect(),
            Err(kube::Error::Api(resp)) if resp.code == 404 => LabelSet::new(),
            Err(err) => return Err(err.into()),
        };
        self.cache.insert(cluster.to_string(), labels.clone()).await;
        Ok(labels)
    }

    async fn known_clusters(&self) -> Vec<String> {
        vec![LOCAL_CLUSTER.to_string()]
    }
}

/// Resolves a named cluster to the `kube::Client` that talks to it.
#[async_trait]
pub trait ClusterClientFactory: Send + Sync {
    async fn client_for(&self, cluster: &str) -> Result<kube::Client>;
}

/// The only implementation this crate ships: every placement target is the
/// local cluster this process itself runs against.
pub struct SingleClusterClientFactory {
    client: kube::Client,
}

impl SingleClusterClientFactory {
    pub fn new(client: kube::Client) -> Arc<Self> {
        Arc::new(Self { client })
    }
}

#[async_trait]
impl ClusterClientFactory for SingleClusterClientFactory {
    async fn client_for(&self, _cluster: &str) -> Result<kube::Client> {
        Ok(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCache(LabelSet);

    #[async_trait]
    impl ClusterIdentityCache for FakeCache {
        async fn labels(&self, _cluster: &str) -> Result<LabelSet> {
            Ok(self.0.clone())
        }
        async fn known_clusters(&self) -> Vec<String> {
            vec![LOCAL_CLUSTER.to_string()]
        }
    }

    #[tokio::test]
    async fn fake_cache_returns_configured_labels() {
        let mut labels = LabelSet::new();
        labels.insert("provider".into(), "aws".into());
        let cache = FakeCache(labels.clone());
        assert_eq!(cache.labels("local").await.unwrap(), labels);
    }
}
