use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::config::ClusterConfig;

/// Static description of one cluster taking part in the test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    pub name: String,
    pub kubeconfig: PathBuf,
    pub namespaces: Vec<String>,
    /// Pods that must not be used as probe sources (e.g. offloaded to a peer)
    pub excluded_sources: BTreeSet<String>,
}

impl ClusterHandle {
    pub fn is_excluded_source(&self, pod: &str) -> bool {
        self.excluded_sources.contains(pod)
    }
}

impl From<&ClusterConfig> for ClusterHandle {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            name: config.name.clone(),
            kubeconfig: config.kubeconfig.clone(),
            namespaces: config.namespaces.clone(),
            excluded_sources: config.excluded_sources.iter().cloned().collect(),
        }
    }
}

/// Composite key of a namespace inside a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceKey {
    pub cluster: String,
    pub namespace: String,
}

impl NamespaceKey {
    pub fn new(cluster: &str, namespace: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.namespace)
    }
}

/// Ordered (consumer, provider) cluster pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterPair {
    /// Cluster the probe originates from
    pub consumer: String,
    /// Cluster owning the destination address
    pub provider: String,
}

impl ClusterPair {
    pub fn new(consumer: &str, provider: &str) -> Self {
        Self {
            consumer: consumer.to_string(),
            provider: provider.to_string(),
        }
    }
}

impl fmt::Display for ClusterPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.consumer, self.provider)
    }
}
