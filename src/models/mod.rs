pub mod cluster;
pub mod workload;

pub use cluster::*;
pub use workload::*;
