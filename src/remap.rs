//! Cross-cluster address remapping
//!
//! Liqo gives every peered cluster a remapped view of its peer's pod CIDR.
//! A prober in the consumer cluster reaches a provider workload by keeping
//! the host part of the provider address and swapping the first two octets
//! for those of the remapped block. Only /16 remapping is supported.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RemapConfig;
use crate::k8s::ClusterDirectory;
use crate::models::{ClusterHandle, ClusterPair};

/// Prefix length of the only supported remap granularity
pub const REMAP_PREFIX_LEN: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemapError {
    #[error("address '{0}' is not an IPv4 dotted quad")]
    NotIpv4(String),

    #[error("remap prefix '{0}' is not an IPv4 block")]
    InvalidPrefix(String),

    #[error("remap granularity /{0} is not supported, only /16")]
    UnsupportedGranularity(u8),

    #[error("no remap prefix for {pair}: {reason}")]
    PrefixUnavailable { pair: ClusterPair, reason: String },
}

/// First two octets of a remapped /16 block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RemapPrefix([u8; 2]);

impl RemapPrefix {
    pub fn new(first: u8, second: u8) -> Self {
        Self([first, second])
    }

    pub fn octets(&self) -> [u8; 2] {
        self.0
    }

    /// Parse a CIDR such as `10.71.0.0/16`. A bare dotted quad is read as a /16.
    pub fn parse(raw: &str) -> Result<Self, RemapError> {
        let raw = raw.trim();
        let (addr, len) = match raw.split_once('/') {
            Some((addr, len)) => {
                let len: u8 = len
                    .parse()
                    .map_err(|_| RemapError::InvalidPrefix(raw.to_string()))?;
                (addr, len)
            }
            None => (raw, REMAP_PREFIX_LEN),
        };

        if len != REMAP_PREFIX_LEN {
            return Err(RemapError::UnsupportedGranularity(len));
        }

        let ip: Ipv4Addr = addr
            .parse()
            .map_err(|_| RemapError::InvalidPrefix(raw.to_string()))?;
        let [a, b, _, _] = ip.octets();
        Ok(Self([a, b]))
    }

    /// Replace the first two octets of `address`, keeping the host part
    pub fn apply(&self, address: Ipv4Addr) -> Ipv4Addr {
        let [_, _, c, d] = address.octets();
        Ipv4Addr::new(self.0[0], self.0[1], c, d)
    }
}

impl fmt::Display for RemapPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.0.0/{}", self.0[0], self.0[1], REMAP_PREFIX_LEN)
    }
}

/// Remap prefixes for every ordered pair of distinct clusters.
///
/// Lookups that failed are kept so that only the cells depending on them are
/// affected.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    entries: BTreeMap<ClusterPair, Result<RemapPrefix, String>>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: ClusterPair, prefix: RemapPrefix) {
        self.entries.insert(pair, Ok(prefix));
    }

    pub fn insert_failure(&mut self, pair: ClusterPair, reason: impl Into<String>) {
        self.entries.insert(pair, Err(reason.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prefix to use when `consumer` probes an address owned by `provider`
    pub fn prefix(&self, consumer: &str, provider: &str) -> Result<RemapPrefix, RemapError> {
        let pair = ClusterPair::new(consumer, provider);
        match self.entries.get(&pair) {
            Some(Ok(prefix)) => Ok(*prefix),
            Some(Err(reason)) => Err(RemapError::PrefixUnavailable {
                pair,
                reason: reason.clone(),
            }),
            None => Err(RemapError::PrefixUnavailable {
                pair,
                reason: "pair was never discovered".to_string(),
            }),
        }
    }

    /// Address a prober in `source_cluster` must target to reach `destination`
    /// owned by `destination_cluster`.
    pub fn remap(
        &self,
        destination: Ipv4Addr,
        source_cluster: &str,
        destination_cluster: &str,
    ) -> Result<Ipv4Addr, RemapError> {
        if source_cluster == destination_cluster {
            return Ok(destination);
        }
        let prefix = self.prefix(source_cluster, destination_cluster)?;
        Ok(prefix.apply(destination))
    }

    /// Look up the prefix of every ordered pair of distinct clusters.
    ///
    /// The prefix for (consumer, provider) is read on the consumer cluster
    /// from the network resource describing the provider.
    pub async fn discover<D: ClusterDirectory + ?Sized>(
        clusters: &[ClusterHandle],
        directory: &D,
        conventions: &RemapConfig,
    ) -> Self {
        let mut table = Self::new();

        for consumer in clusters {
            for provider in clusters {
                if consumer.name == provider.name {
                    continue;
                }
                let pair = ClusterPair::new(&consumer.name, &provider.name);
                let namespace = conventions.tenant_namespace(&provider.name);
                let resource = conventions.resource_name(&provider.name);

                let lookup = directory
                    .custom_resource_field(
                        &consumer.name,
                        &namespace,
                        &resource,
                        &conventions.field_path,
                    )
                    .await;

                match lookup.map_err(|e| e.to_string()).and_then(|raw| {
                    RemapPrefix::parse(&raw).map_err(|e| e.to_string())
                }) {
                    Ok(prefix) => {
                        info!(pair = %pair, prefix = %prefix, "Discovered remap prefix");
                        table.insert(pair, prefix);
                    }
                    Err(reason) => {
                        warn!(
                            pair = %pair,
                            namespace = %namespace,
                            resource = %resource,
                            error = %reason,
                            "Remap prefix unavailable, probes across this pair will fail"
                        );
                        table.insert_failure(pair, reason);
                    }
                }
            }
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RemapTable {
        let mut table = RemapTable::new();
        table.insert(ClusterPair::new("rome", "milan"), RemapPrefix::new(10, 5));
        table
    }

    #[test]
    fn test_parse_cidr() {
        assert_eq!(RemapPrefix::parse("10.71.0.0/16").unwrap(), RemapPrefix::new(10, 71));
        assert_eq!(RemapPrefix::parse("10.5.0.0").unwrap(), RemapPrefix::new(10, 5));
        assert_eq!(RemapPrefix::new(10, 71).to_string(), "10.71.0.0/16");
    }

    #[test]
    fn test_other_granularity_is_rejected() {
        assert_eq!(
            RemapPrefix::parse("10.71.4.0/24"),
            Err(RemapError::UnsupportedGranularity(24))
        );
        assert_eq!(
            RemapPrefix::parse("10.0.0.0/8"),
            Err(RemapError::UnsupportedGranularity(8))
        );
    }

    #[test]
    fn test_garbage_prefix_is_rejected() {
        assert!(matches!(
            RemapPrefix::parse("fd00::/16"),
            Err(RemapError::InvalidPrefix(_))
        ));
        assert!(matches!(
            RemapPrefix::parse("10.71.0.0/abc"),
            Err(RemapError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_same_cluster_is_identity() {
        let ip = Ipv4Addr::new(10, 1, 2, 3);
        assert_eq!(table().remap(ip, "rome", "rome").unwrap(), ip);
        // identity does not even need a table entry
        assert_eq!(RemapTable::new().remap(ip, "milan", "milan").unwrap(), ip);
    }

    #[test]
    fn test_cross_cluster_replaces_first_two_octets() {
        let remapped = table()
            .remap(Ipv4Addr::new(10, 9, 9, 9), "rome", "milan")
            .unwrap();
        assert_eq!(remapped, Ipv4Addr::new(10, 5, 9, 9));
    }

    #[test]
    fn test_component_preservation() {
        let prefix = RemapPrefix::new(172, 31);
        for (c, d) in [(0u8, 0u8), (1, 254), (255, 255), (42, 7)] {
            let out = prefix.apply(Ipv4Addr::new(10, 244, c, d)).octets();
            assert_eq!(&out[..2], &[172, 31]);
            assert_eq!(&out[2..], &[c, d]);
        }
    }

    #[test]
    fn test_pairs_are_directed() {
        let err = table()
            .remap(Ipv4Addr::new(10, 1, 2, 3), "milan", "rome")
            .unwrap_err();
        assert!(matches!(err, RemapError::PrefixUnavailable { .. }));
    }

    #[test]
    fn test_failed_lookup_is_reported() {
        let mut table = RemapTable::new();
        table.insert_failure(ClusterPair::new("rome", "milan"), "custom resource not found");
        let err = table
            .remap(Ipv4Addr::new(10, 1, 2, 3), "rome", "milan")
            .unwrap_err();
        assert!(err.to_string().contains("custom resource not found"));
    }

    #[test]
    fn test_discover_reads_every_ordered_pair() {
        use crate::k8s::MockClusterDirectory;
        use std::path::PathBuf;

        let handle = |name: &str| ClusterHandle {
            name: name.to_string(),
            kubeconfig: PathBuf::from("kubeconfig"),
            namespaces: vec!["default".to_string()],
            excluded_sources: Default::default(),
        };

        let mut directory = MockClusterDirectory::new();
        directory
            .expect_custom_resource_field()
            .times(2)
            .returning(|cluster, namespace, resource, _| match (cluster, namespace, resource) {
                ("rome", "liqo-tenant-milan", "milan-pod") => Ok("10.5.0.0/16".to_string()),
                _ => Err(crate::Error::directory(cluster, "not found")),
            });

        let table = tokio_test::block_on(RemapTable::discover(
            &[handle("rome"), handle("milan")],
            &directory,
            &RemapConfig::default(),
        ));

        assert_eq!(table.len(), 2);
        assert_eq!(table.prefix("rome", "milan").unwrap(), RemapPrefix::new(10, 5));
        assert!(table.prefix("milan", "rome").is_err());
    }
}
