//! shard-cache-sim: a sharded caching tier in front of a slow backing store.
//!
//! Files are routed to replica groups of cache shards; each shard evicts by
//! recency and, under the Markov policy, prefetches the files its transition
//! graph predicts will be requested next. Running the same workload under
//! both policies compares plain LRU against predictive prefetch.

pub mod cache;
pub mod cluster;
pub mod config;
pub mod metrics;
pub mod routing;
pub mod store;
