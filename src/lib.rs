//! netmatrix library
//!
//! Connectivity-matrix tester for Kubernetes clusters peered through Liqo:
//! snapshot the workloads of every cluster, remap destination addresses that
//! cross a cluster boundary, probe every source/destination pair from inside
//! the source pod and render the results.

pub mod config;
pub mod error;
pub mod k8s;
pub mod matrix;
pub mod models;
pub mod probe;
pub mod remap;
pub mod render;
pub mod report;
pub mod topology;

pub use error::{Error, Result};
pub use matrix::{run, ProbeMatrix};
pub use probe::ProbeResult;
