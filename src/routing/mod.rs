//! File -> shard routing.
//!
//! - [`router`]: replica groups and per-client replica orderings

pub mod router;

pub use router::{RoutingError, ShardRouter};

/// Index of a cache shard within the cluster.
pub type ShardId = usize;

/// Identifier of a logical client issuing fetches.
pub type ClientId = u64;

/// Index of a replica group.
pub type GroupId = usize;
