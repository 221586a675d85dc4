//! Process configuration (§6): one YAML document, `${VAR}`-expanded the
//! same way the teacher's loader expands registry credentials, grouped into
//! nested structs so each component is handed only the slice it needs.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderElectionConfig {
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,
    #[serde(default = "default_renew_deadline_secs")]
    pub renew_deadline_secs: u64,
    #[serde(default = "default_retry_period_secs")]
    pub retry_period_secs: u64,
    #[serde(default = "default_leader_namespace")]
    pub namespace: String,
}

fn default_lease_duration_secs() -> u64 {
    15
}
fn default_renew_deadline_secs() -> u64 {
    10
}
fn default_retry_period_secs() -> u64 {
    2
}
fn default_leader_namespace() -> String {
    "vela-system".to_string()
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: default_lease_duration_secs(),
            renew_deadline_secs: default_renew_deadline_secs(),
            retry_period_secs: default_retry_period_secs(),
            namespace: default_leader_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageDriver {
    Local,
}

impl Default for StorageDriver {
    fn default() -> Self {
        StorageDriver::Local
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_health_addr", rename = "healthAddr")]
    pub health_addr: String,
    #[serde(default, rename = "storageDriver")]
    pub storage_driver: StorageDriver,
    #[serde(default, rename = "leaderElection")]
    pub leader_election: LeaderElectionConfig,
}

fn default_health_addr() -> String {
    ":9440".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_addr: default_health_addr(),
            storage_driver: StorageDriver::default(),
            leader_election: LeaderElectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_cert_dir", rename = "certDir")]
    pub cert_dir: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

fn default_cert_dir() -> String {
    "/k8s-webhook-server/serving-certs".to_string()
}
fn default_webhook_port() -> u16 {
    9443
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enable: false,
            cert_dir: default_cert_dir(),
            port: default_webhook_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_metrics_addr", rename = "metricsAddr")]
    pub metrics_addr: String,
    #[serde(default, rename = "logFilePath")]
    pub log_file_path: Option<String>,
    #[serde(default = "default_log_file_max_size_mb", rename = "logFileMaxSizeMb")]
    pub log_file_max_size_mb: u64,
}

fn default_metrics_addr() -> String {
    ":8080".to_string()
}
fn default_log_file_max_size_mb() -> u64 {
    1024
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            log_file_path: None,
            log_file_max_size_mb: default_log_file_max_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeClientConfig {
    #[serde(default = "default_informer_resync_secs", rename = "informerResyncSecs")]
    pub informer_resync_secs: u64,
    #[serde(default = "default_qps")]
    pub qps: f32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_informer_resync_secs() -> u64 {
    10 * 3600
}
fn default_qps() -> f32 {
    50.0
}
fn default_burst() -> u32 {
    100
}

impl Default for KubeClientConfig {
    fn default() -> Self {
        Self {
            informer_resync_secs: default_informer_resync_secs(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticlusterConfig {
    #[serde(default, rename = "enableGateway")]
    pub enable_gateway: bool,
    #[serde(default, rename = "enableMetrics")]
    pub enable_metrics: bool,
    #[serde(default = "default_metrics_interval_secs", rename = "metricsIntervalSecs")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    15
}

impl Default for MulticlusterConfig {
    fn default() -> Self {
        Self {
            enable_gateway: false,
            enable_metrics: false,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxWorkflowConfig {
    #[serde(default = "default_wait_backoff_secs", rename = "waitBackoffSecs")]
    pub wait_backoff_secs: u64,
    #[serde(default = "default_failed_backoff_secs", rename = "failedBackoffSecs")]
    pub failed_backoff_secs: u64,
    #[serde(default = "default_step_retry", rename = "stepRetry")]
    pub step_retry: u32,
}

fn default_wait_backoff_secs() -> u64 {
    60
}
fn default_failed_backoff_secs() -> u64 {
    300
}
fn default_step_retry() -> u32 {
    10
}

impl Default for MaxWorkflowConfig {
    fn default() -> Self {
        Self {
            wait_backoff_secs: default_wait_backoff_secs(),
            failed_backoff_secs: default_failed_backoff_secs(),
            step_retry: default_step_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_resync_secs", rename = "resyncSecs")]
    pub resync_secs: u64,
    #[serde(default = "default_max_dispatch_concurrent", rename = "maxDispatchConcurrent")]
    pub max_dispatch_concurrent: usize,
    #[serde(default, rename = "maxWorkflow")]
    pub max_workflow: MaxWorkflowConfig,
}

fn default_resync_secs() -> u64 {
    5 * 60
}
fn default_max_dispatch_concurrent() -> usize {
    10
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            resync_secs: default_resync_secs(),
            max_dispatch_concurrent: default_max_dispatch_concurrent(),
            max_workflow: MaxWorkflowConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_revision_limit", rename = "revisionLimit")]
    pub revision_limit: usize,
    #[serde(default = "default_app_revision_limit", rename = "appRevisionLimit")]
    pub app_revision_limit: usize,
    #[serde(default = "default_def_revision_limit", rename = "defRevisionLimit")]
    pub def_revision_limit: usize,
    #[serde(default = "default_concurrent_reconciles", rename = "concurrentReconciles")]
    pub concurrent_reconciles: usize,
}

fn default_revision_limit() -> usize {
    50
}
fn default_app_revision_limit() -> usize {
    10
}
fn default_def_revision_limit() -> usize {
    20
}
fn default_concurrent_reconciles() -> usize {
    4
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            revision_limit: default_revision_limit(),
            app_revision_limit: default_app_revision_limit(),
            def_revision_limit: default_def_revision_limit(),
            concurrent_reconciles: default_concurrent_reconciles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OamConfig {
    #[serde(default = "default_system_definition_namespace", rename = "systemDefinitionNamespace")]
    pub system_definition_namespace: String,
}

fn default_system_definition_namespace() -> String {
    "vela-system".to_string()
}

impl Default for OamConfig {
    fn default() -> Self {
        Self {
            system_definition_namespace: default_system_definition_namespace(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default, rename = "kubeClient")]
    pub kube_client: KubeClientConfig,
    #[serde(default)]
    pub multicluster: MulticlusterConfig,
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub oam: OamConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let config: Config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;

    info!(
        "Parsed valid application config:\n{}",
        serde_yaml_ng::to_string(&config)?
    );

    Ok(config)
}

/// Replaces `${VAR}` placeholders with environment variable values.
fn expand_env_vars(input: &str) -> Result<String> {
    let regex =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    let mut missing = None;
    let result = regex.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| {
            missing = Some(var_name.to_string());
            String::new()
        })
    });
    if let Some(var_name) = missing {
        anyhow::bail!("Missing environment variable: {var_name}");
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn expand_env_vars_substitutes_present_vars() {
        unsafe {
            env::set_var("TEST_VAR", "value123");
        }
        let expanded = expand_env_vars("This is a test: ${TEST_VAR}").unwrap();
        assert_eq!(expanded, "This is a test: value123");
        unsafe {
            env::remove_var("TEST_VAR");
        }
    }

    #[test]
    fn expand_env_vars_rejects_missing_var() {
        let result = expand_env_vars("This will fail: ${DEFINITELY_MISSING_VAR}");
        assert!(result.is_err());
    }

    #[test]
    fn expand_env_vars_handles_multiple_vars() {
        unsafe {
            env::set_var("VAR1", "foo");
            env::set_var("VAR2", "bar");
        }
        let expanded = expand_env_vars("${VAR1} and ${VAR2}").unwrap();
        assert_eq!(expanded, "foo and bar");
        unsafe {
            env::remove_var("VAR1");
            env::remove_var("VAR2");
        }
    }

    #[test]
    fn defaults_match_spec_values() {
        let config = Config::default();
        assert_eq!(config.server.health_addr, ":9440");
        assert_eq!(config.webhook.port, 9443);
        assert_eq!(config.observability.metrics_addr, ":8080");
        assert_eq!(config.kube_client.informer_resync_secs, 36000);
        assert_eq!(config.application.max_dispatch_concurrent, 10);
        assert_eq!(config.controller.concurrent_reconciles, 4);
        assert_eq!(config.oam.system_definition_namespace, "vela-system");
    }

    #[test]
    fn load_config_parses_yaml_with_env_expansion() {
        unsafe {
            env::set_var("HEALTH_ADDR", ":9999");
        }
        let yaml = r#"
        server:
          healthAddr: "${HEALTH_ADDR}"
        "#;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(tmp.path(), yaml).unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.server.health_addr, ":9999");
        unsafe {
            env::remove_var("HEALTH_ADDR");
        }
    }
}
