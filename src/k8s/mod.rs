//! Kubernetes integration module for netmatrix
//!
//! The matrix only talks to the clusters through two capabilities:
//! - [`ClusterDirectory`]: listing pods/services and reading custom resource fields
//! - [`RemoteExec`]: running a one-shot command inside a pod
//!
//! [`KubeClusters`] implements both on top of `kube`, one client per cluster.

mod client;
mod exec;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use client::KubeClusters;

/// A named object and its address as reported by the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub address: Option<String>,
}

impl DirectoryEntry {
    pub fn new(name: &str, address: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            address: address.map(str::to_string),
        }
    }
}

/// Output of a remote command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub stdout: String,
    /// The command exited with status 0
    pub success: bool,
    /// Exit code reported by the exec status channel, when it carried one
    pub exit_code: Option<i32>,
}

/// Read-only view of the workloads and resources of each cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    /// Pods in `namespace` with their pod IP, if assigned
    async fn list_pods(&self, cluster: &str, namespace: &str) -> Result<Vec<DirectoryEntry>>;

    /// Services in `namespace` with their ClusterIP
    async fn list_services(&self, cluster: &str, namespace: &str) -> Result<Vec<DirectoryEntry>>;

    /// String value at the dot-separated `field_path` of a namespaced custom resource
    async fn custom_resource_field(
        &self,
        cluster: &str,
        namespace: &str,
        resource_name: &str,
        field_path: &str,
    ) -> Result<String>;
}

/// One-shot command execution inside a pod
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` in the first container of `pod`.
    ///
    /// An `Err` means the session could not be established or did not finish
    /// within `timeout`; a command that ran and failed is `Ok` with
    /// `success == false`.
    async fn exec(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
        command: Vec<String>,
        timeout: Duration,
    ) -> Result<ExecOutput>;
}
