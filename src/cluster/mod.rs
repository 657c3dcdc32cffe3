//! Wiring shards, router and store into a running tier.
//!
//! - [`master`]: builds the shards and the router, routes client fetches
//! - [`workload`]: deterministic client access patterns for simulation runs

pub mod master;
pub mod workload;

pub use master::{CacheCluster, ClusterError, ClusterParams, ClusterReport};
