//! Per-shard cache machinery.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`evictor`]: EvictionIndex, the addressable min-heap behind LRU eviction
//! - [`prefetcher`]: PredictiveGraph, Markov transitions and batch prediction
//! - [`shard`]: CacheShard, the bounded cache that ties both together

pub mod evictor;
pub mod prefetcher;
pub mod shard;

pub use evictor::EvictionIndex;
pub use prefetcher::{PredictError, PredictiveGraph};
pub use shard::{CacheShard, ShardError, ShardReport, ShardSettings};
