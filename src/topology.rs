//! Per-cluster snapshot of the pods and services to test

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::k8s::ClusterDirectory;
use crate::models::{ClusterHandle, NamespaceKey, Workload, WorkloadAddress};

/// Pods and services of one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTopology {
    pub key: NamespaceKey,
    pub pods: Vec<Workload>,
    pub services: Vec<Workload>,
}

/// Workloads of one cluster, grouped by namespace in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    namespaces: Vec<NamespaceTopology>,
}

impl TopologySnapshot {
    pub fn new(namespaces: Vec<NamespaceTopology>) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &[NamespaceTopology] {
        &self.namespaces
    }

    pub fn pods(&self) -> impl Iterator<Item = &Workload> {
        self.namespaces.iter().flat_map(|ns| ns.pods.iter())
    }

    pub fn services(&self) -> impl Iterator<Item = &Workload> {
        self.namespaces.iter().flat_map(|ns| ns.services.iter())
    }

    /// Workloads whose address could not be used as a probe target
    pub fn unresolved(&self) -> impl Iterator<Item = &Workload> {
        self.pods()
            .chain(self.services())
            .filter(|w| w.address.ip().is_none())
    }
}

/// A cluster handle together with its topology snapshot
#[derive(Debug, Clone)]
pub struct Cluster {
    pub handle: ClusterHandle,
    pub snapshot: TopologySnapshot,
}

impl Cluster {
    pub fn new(handle: ClusterHandle, snapshot: TopologySnapshot) -> Self {
        Self { handle, snapshot }
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// Pods allowed to act as probe sources
    pub fn sources(&self) -> impl Iterator<Item = &Workload> {
        self.snapshot
            .pods()
            .filter(|pod| !self.handle.is_excluded_source(pod.name()))
    }

    /// Take the snapshot of `handle` and bundle both together
    pub async fn discover<D: ClusterDirectory + ?Sized>(
        handle: ClusterHandle,
        directory: &D,
    ) -> Result<Self> {
        let snapshot = snapshot(&handle, directory).await?;
        Ok(Self::new(handle, snapshot))
    }
}

/// List pods and services of every configured namespace of a cluster.
///
/// Missing or non-IPv4 addresses are kept as such on the workload; only a
/// failing directory call fails the snapshot.
#[instrument(skip_all, fields(cluster = %handle.name))]
pub async fn snapshot<D: ClusterDirectory + ?Sized>(
    handle: &ClusterHandle,
    directory: &D,
) -> Result<TopologySnapshot> {
    let mut namespaces = Vec::with_capacity(handle.namespaces.len());

    for namespace in &handle.namespaces {
        let pods: Vec<Workload> = directory
            .list_pods(&handle.name, namespace)
            .await?
            .into_iter()
            .map(|entry| {
                Workload::pod(
                    &handle.name,
                    namespace,
                    &entry.name,
                    WorkloadAddress::parse(entry.address.as_deref()),
                )
            })
            .collect();

        let services: Vec<Workload> = directory
            .list_services(&handle.name, namespace)
            .await?
            .into_iter()
            .map(|entry| {
                Workload::service(
                    &handle.name,
                    namespace,
                    &entry.name,
                    WorkloadAddress::parse(entry.address.as_deref()),
                )
            })
            .collect();

        info!(
            namespace = %namespace,
            pods = pods.len(),
            services = services.len(),
            "Scanned namespace"
        );

        namespaces.push(NamespaceTopology {
            key: NamespaceKey::new(&handle.name, namespace),
            pods,
            services,
        });
    }

    let snapshot = TopologySnapshot::new(namespaces);
    for workload in snapshot.unresolved() {
        warn!(
            workload = %workload.id,
            kind = %workload.kind,
            address = %workload.address,
            "Workload has no usable address"
        );
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::k8s::{DirectoryEntry, MockClusterDirectory};
    use mockall::predicate::eq;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    fn handle(excluded: &[&str]) -> ClusterHandle {
        ClusterHandle {
            name: "rome".to_string(),
            kubeconfig: PathBuf::from("rome.kubeconfig"),
            namespaces: vec!["consumer-local".to_string(), "offloaded".to_string()],
            excluded_sources: excluded.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn directory() -> MockClusterDirectory {
        let mut directory = MockClusterDirectory::new();
        directory
            .expect_list_pods()
            .with(eq("rome"), eq("consumer-local"))
            .returning(|_, _| {
                Ok(vec![
                    DirectoryEntry::new("po1", Some("10.1.2.3")),
                    DirectoryEntry::new("po2", None),
                ])
            });
        directory
            .expect_list_pods()
            .with(eq("rome"), eq("offloaded"))
            .returning(|_, _| Ok(vec![DirectoryEntry::new("po3", Some("10.1.7.7"))]));
        directory
            .expect_list_services()
            .with(eq("rome"), eq("consumer-local"))
            .returning(|_, _| Ok(vec![DirectoryEntry::new("svc1", Some("10.96.0.10"))]));
        directory
            .expect_list_services()
            .with(eq("rome"), eq("offloaded"))
            .returning(|_, _| Ok(vec![DirectoryEntry::new("svc3", Some("None"))]));
        directory
    }

    #[tokio::test]
    async fn test_snapshot_groups_by_namespace() {
        let snapshot = snapshot(&handle(&[]), &directory()).await.unwrap();

        assert_eq!(snapshot.namespaces().len(), 2);
        let local = &snapshot.namespaces()[0];
        assert_eq!(local.key, NamespaceKey::new("rome", "consumer-local"));
        assert_eq!(local.pods.len(), 2);
        assert_eq!(local.services.len(), 1);
        assert_eq!(
            local.pods[0].address,
            WorkloadAddress::Resolved(Ipv4Addr::new(10, 1, 2, 3))
        );
        assert_eq!(
            snapshot.namespaces()[1].key,
            NamespaceKey::new("rome", "offloaded")
        );
    }

    #[tokio::test]
    async fn test_unresolved_addresses_do_not_fail_snapshot() {
        let snapshot = snapshot(&handle(&[]), &directory()).await.unwrap();
        let unresolved: Vec<&str> = snapshot.unresolved().map(|w| w.name()).collect();
        assert_eq!(unresolved, vec!["po2", "svc3"]);
    }

    #[tokio::test]
    async fn test_excluded_pods_are_not_sources() {
        let cluster = Cluster::discover(handle(&["po3"]), &directory()).await.unwrap();
        let sources: Vec<&str> = cluster.sources().map(|w| w.name()).collect();
        assert_eq!(sources, vec!["po1", "po2"]);
        // still part of the snapshot, hence still a destination
        assert_eq!(cluster.snapshot.pods().count(), 3);
    }

    #[tokio::test]
    async fn test_directory_failure_fails_snapshot() {
        let mut directory = MockClusterDirectory::new();
        directory
            .expect_list_pods()
            .returning(|cluster, _| Err(Error::directory(cluster, "connection refused")));

        let err = snapshot(&handle(&[]), &directory).await.unwrap_err();
        assert!(matches!(err, Error::Directory { .. }));
    }
}
