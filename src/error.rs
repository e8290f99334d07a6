//! Error types for netmatrix

use thiserror::Error;

/// Convenience alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for netmatrix operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing static configuration; fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A cluster directory lookup failed (listing, custom resource, missing field)
    #[error("directory lookup failed on cluster {cluster}: {message}")]
    Directory { cluster: String, message: String },

    /// A remote command could not be run inside a pod
    #[error("remote exec in {namespace}/{pod} failed: {message}")]
    Exec {
        namespace: String,
        pod: String,
        message: String,
    },

    /// I/O error while writing output
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a directory error for the given cluster
    pub fn directory(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Directory {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an exec error for the given pod
    pub fn exec(namespace: impl Into<String>, pod: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Exec {
            namespace: namespace.into(),
            pod: pod.into(),
            message: msg.into(),
        }
    }

    /// True for failures that abort the whole run rather than one cluster or probe
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
