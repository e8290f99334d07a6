use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Identity of a workload: the cluster it lives in, its namespace and its name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
}

impl WorkloadId {
    pub fn new(cluster: &str, namespace: &str, name: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.namespace, self.name)
    }
}

/// Kind of workload
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkloadKind {
    Pod,
    Service,
}

/// Address of a workload as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "value")]
pub enum WorkloadAddress {
    /// IPv4 address assigned by the cluster
    Resolved(Ipv4Addr),
    /// No address assigned yet (pending pod, headless service)
    Unresolved,
    /// Address assigned but not an IPv4 dotted quad
    Invalid(String),
}

impl WorkloadAddress {
    /// Classify a raw address as reported by the API server.
    ///
    /// `None`, the empty string and the headless-service marker `None` are
    /// all treated as unresolved.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("None") => WorkloadAddress::Unresolved,
            Some(value) => match value.parse::<Ipv4Addr>() {
                Ok(ip) => WorkloadAddress::Resolved(ip),
                Err(_) => WorkloadAddress::Invalid(value.to_string()),
            },
        }
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        match self {
            WorkloadAddress::Resolved(ip) => Some(*ip),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadAddress::Resolved(ip) => write!(f, "{}", ip),
            WorkloadAddress::Unresolved => write!(f, "<unresolved>"),
            WorkloadAddress::Invalid(raw) => write!(f, "<invalid {}>", raw),
        }
    }
}

/// A pod or service discovered in one of the clusters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub kind: WorkloadKind,
    pub address: WorkloadAddress,
}

impl Workload {
    pub fn pod(cluster: &str, namespace: &str, name: &str, address: WorkloadAddress) -> Self {
        Self {
            id: WorkloadId::new(cluster, namespace, name),
            kind: WorkloadKind::Pod,
            address,
        }
    }

    pub fn service(cluster: &str, namespace: &str, name: &str, address: WorkloadAddress) -> Self {
        Self {
            id: WorkloadId::new(cluster, namespace, name),
            kind: WorkloadKind::Service,
            address,
        }
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn namespace(&self) -> &str {
        &self.id.namespace
    }

    pub fn cluster(&self) -> &str {
        &self.id.cluster
    }

    pub fn is_pod(&self) -> bool {
        self.kind == WorkloadKind::Pod
    }

    /// Two workloads are the same when cluster, namespace and name all match
    pub fn same_as(&self, other: &Workload) -> bool {
        self.id == other.id
    }
}
