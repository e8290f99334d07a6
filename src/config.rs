use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "NETMATRIX_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub clusters: Vec<ClusterConfig>,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub remap: RemapConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// One cluster taking part in the test
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub name: String,

    pub kubeconfig: PathBuf,

    pub namespaces: Vec<String>,

    /// Pods never used as probe sources
    #[serde(default)]
    pub excluded_sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bound passed to curl for the whole fetch
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra time granted to the exec session on top of the fetch bound
    #[serde(default = "default_exec_grace_secs")]
    pub exec_grace_secs: u64,

    /// Number of probes in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Require the response body to name the destination pod
    #[serde(default)]
    pub verify_identity: bool,
}

/// Where the remap prefix of a cluster pair lives
#[derive(Debug, Clone, Deserialize)]
pub struct RemapConfig {
    #[serde(default = "default_remap_group")]
    pub group: String,

    #[serde(default = "default_remap_version")]
    pub version: String,

    #[serde(default = "default_remap_kind")]
    pub kind: String,

    #[serde(default = "default_remap_plural")]
    pub plural: String,

    #[serde(default = "default_tenant_namespace_prefix")]
    pub tenant_namespace_prefix: String,

    #[serde(default = "default_resource_suffix")]
    pub resource_suffix: String,

    #[serde(default = "default_field_path")]
    pub field_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Write a JSON report of the matrix here when set
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    80
}

fn default_timeout_secs() -> u64 {
    1
}

fn default_exec_grace_secs() -> u64 {
    5
}

fn default_concurrency() -> usize {
    1
}

fn default_remap_group() -> String {
    "ipam.liqo.io".to_string()
}

fn default_remap_version() -> String {
    "v1alpha1".to_string()
}

fn default_remap_kind() -> String {
    "Network".to_string()
}

fn default_remap_plural() -> String {
    "networks".to_string()
}

fn default_tenant_namespace_prefix() -> String {
    "liqo-tenant-".to_string()
}

fn default_resource_suffix() -> String {
    "-pod".to_string()
}

fn default_field_path() -> String {
    "status.cidr".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            exec_grace_secs: default_exec_grace_secs(),
            concurrency: default_concurrency(),
            verify_identity: false,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound for a whole exec session
    pub fn session_timeout(&self) -> Duration {
        self.timeout()
            .saturating_add(Duration::from_secs(self.exec_grace_secs))
    }
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            group: default_remap_group(),
            version: default_remap_version(),
            kind: default_remap_kind(),
            plural: default_remap_plural(),
            tenant_namespace_prefix: default_tenant_namespace_prefix(),
            resource_suffix: default_resource_suffix(),
            field_path: default_field_path(),
        }
    }
}

impl RemapConfig {
    /// Namespace holding the peering resources for `peer` on the local cluster
    pub fn tenant_namespace(&self, peer: &str) -> String {
        format!("{}{}", self.tenant_namespace_prefix, peer)
    }

    /// Name of the network resource describing `peer`'s pod CIDR
    pub fn resource_name(&self, peer: &str) -> String {
        format!("{}{}", peer, self.resource_suffix)
    }
}

impl Config {
    /// Load the configuration file named by `NETMATRIX_CONFIG`
    /// (default `netmatrix.yaml`), overlaid with `NETMATRIX__*` variables.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "netmatrix.yaml".to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("NETMATRIX").separator("__"))
            .build()
            .map_err(|e| Error::config(format!("failed to read {}: {}", path, e)))?;

        let settings: Config = config
            .try_deserialize()
            .map_err(|e| Error::config(format!("invalid configuration in {}: {}", path, e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.clusters.is_empty() {
            return Err(Error::config("no clusters configured"));
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.trim().is_empty() {
                return Err(Error::config("cluster name must not be empty"));
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(Error::config(format!("duplicate cluster name '{}'", cluster.name)));
            }
            if !cluster.kubeconfig.exists() {
                return Err(Error::config(format!(
                    "kubeconfig file '{}' for cluster '{}' not found",
                    cluster.kubeconfig.display(),
                    cluster.name
                )));
            }
            if cluster.namespaces.is_empty() {
                return Err(Error::config(format!(
                    "cluster '{}' has no namespaces to scan",
                    cluster.name
                )));
            }
        }

        if self.probe.concurrency == 0 {
            return Err(Error::config("probe.concurrency must be at least 1"));
        }
        if self.probe.timeout_secs == 0 {
            return Err(Error::config("probe.timeout_secs must be at least 1"));
        }

        Ok(())
    }
}
