//! Kubernetes client wrapper for netmatrix

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{
    api::{Api, DynamicObject, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    discovery::ApiResource,
    Client, Config,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{ClusterDirectory, DirectoryEntry, ExecOutput, RemoteExec};
use crate::config::RemapConfig;
use crate::error::{Error, Result};
use crate::models::ClusterHandle;

/// One kube client per configured cluster, keyed by cluster name
#[derive(Clone)]
pub struct KubeClusters {
    clients: HashMap<String, Client>,
    network: ApiResource,
}

impl KubeClusters {
    /// Build a client for every cluster from its own kubeconfig file
    #[instrument(skip_all)]
    pub async fn connect(clusters: &[ClusterHandle], remap: &RemapConfig) -> Result<Self> {
        let mut clients = HashMap::new();

        for cluster in clusters {
            let kubeconfig = Kubeconfig::read_from(&cluster.kubeconfig).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig '{}' for cluster '{}': {}",
                    cluster.kubeconfig.display(),
                    cluster.name,
                    e
                ))
            })?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::config(format!(
                        "failed to load kubeconfig for cluster '{}': {}",
                        cluster.name, e
                    ))
                })?;
            let client = Client::try_from(config)?;

            info!(cluster = %cluster.name, "Created Kubernetes client");
            clients.insert(cluster.name.clone(), client);
        }

        Ok(Self {
            clients,
            network: network_resource(remap),
        })
    }

    fn client(&self, cluster: &str) -> Result<&Client> {
        self.clients
            .get(cluster)
            .ok_or_else(|| Error::config(format!("no client configured for cluster '{}'", cluster)))
    }

    /// Get a typed API for pods of a cluster namespace
    fn pods(&self, cluster: &str, namespace: &str) -> Result<Api<Pod>> {
        Ok(Api::namespaced(self.client(cluster)?.clone(), namespace))
    }

    fn services(&self, cluster: &str, namespace: &str) -> Result<Api<Service>> {
        Ok(Api::namespaced(self.client(cluster)?.clone(), namespace))
    }

    /// Check if a cluster is reachable
    pub async fn health_check(&self, cluster: &str) -> Result<()> {
        let version = self
            .client(cluster)?
            .apiserver_version()
            .await
            .map_err(|e| Error::directory(cluster, format!("API server unreachable: {}", e)))?;
        info!(cluster, version = %version.git_version, "Kubernetes cluster is healthy");
        Ok(())
    }
}

/// API resource of the Liqo network objects carrying remapped CIDRs
fn network_resource(remap: &RemapConfig) -> ApiResource {
    ApiResource {
        group: remap.group.clone(),
        version: remap.version.clone(),
        api_version: format!("{}/{}", remap.group, remap.version),
        kind: remap.kind.clone(),
        plural: remap.plural.clone(),
    }
}

/// Follow a dot-separated path through a JSON object down to a string leaf
fn lookup_field(value: &Value, field_path: &str) -> Option<String> {
    field_path
        .split('.')
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl ClusterDirectory for KubeClusters {
    #[instrument(skip(self))]
    async fn list_pods(&self, cluster: &str, namespace: &str) -> Result<Vec<DirectoryEntry>> {
        let list = self
            .pods(cluster, namespace)?
            .list(&ListParams::default())
            .await
            .map_err(|e| {
                Error::directory(cluster, format!("failed to list pods in {}: {}", namespace, e))
            })?;

        let entries: Vec<DirectoryEntry> = list
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                let address = pod.status.and_then(|s| s.pod_ip);
                Some(DirectoryEntry { name, address })
            })
            .collect();

        debug!(count = entries.len(), "Listed pods");
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn list_services(&self, cluster: &str, namespace: &str) -> Result<Vec<DirectoryEntry>> {
        let list = self
            .services(cluster, namespace)?
            .list(&ListParams::default())
            .await
            .map_err(|e| {
                Error::directory(
                    cluster,
                    format!("failed to list services in {}: {}", namespace, e),
                )
            })?;

        let entries: Vec<DirectoryEntry> = list
            .items
            .into_iter()
            .filter_map(|svc| {
                let name = svc.metadata.name?;
                let address = svc.spec.and_then(|s| s.cluster_ip);
                Some(DirectoryEntry { name, address })
            })
            .collect();

        debug!(count = entries.len(), "Listed services");
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn custom_resource_field(
        &self,
        cluster: &str,
        namespace: &str,
        resource_name: &str,
        field_path: &str,
    ) -> Result<String> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client(cluster)?.clone(), namespace, &self.network);

        let object = api.get(resource_name).await.map_err(|e| {
            Error::directory(
                cluster,
                format!(
                    "failed to get {} {}/{}: {}",
                    self.network.kind, namespace, resource_name, e
                ),
            )
        })?;

        lookup_field(&object.data, field_path).ok_or_else(|| {
            Error::directory(
                cluster,
                format!(
                    "{} {}/{} has no string field {}",
                    self.network.kind, namespace, resource_name, field_path
                ),
            )
        })
    }
}

#[async_trait]
impl RemoteExec for KubeClusters {
    async fn exec(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
        command: Vec<String>,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        let pods = self.pods(cluster, namespace)?;
        super::exec::run_command(&pods, namespace, pod, command, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_field() {
        let data = json!({
            "spec": {"cidr": "10.200.0.0/16"},
            "status": {"cidr": "10.71.0.0/16"}
        });
        assert_eq!(lookup_field(&data, "status.cidr").as_deref(), Some("10.71.0.0/16"));
        assert_eq!(lookup_field(&data, "status.missing"), None);
        assert_eq!(lookup_field(&data, "status"), None);
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_a_config_error() {
        let clusters = KubeClusters {
            clients: HashMap::new(),
            network: network_resource(&RemapConfig::default()),
        };
        let err = clusters.list_pods("paris", "default").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_network_resource() {
        let ar = network_resource(&RemapConfig::default());
        assert_eq!(ar.api_version, "ipam.liqo.io/v1alpha1");
        assert_eq!(ar.kind, "Network");
        assert_eq!(ar.plural, "networks");
    }
}
