//! Prometheus counters for the cache tier, labelled by policy and shard.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::config::CachePolicy;
use crate::routing::ShardId;

/// Counter handles shared by every shard, across runs.
///
/// Cloning is cheap; clones feed the same registry.
#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,
    hits: IntCounterVec,
    misses: IntCounterVec,
    evictions: IntCounterVec,
    prefetched: IntCounterVec,
}

impl CacheMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let hits = counter(&registry, "cache_hits_total", "Fetches served from the shard")?;
        let misses = counter(&registry, "cache_misses_total", "Fetches loaded from the backing store")?;
        let evictions = counter(&registry, "cache_evictions_total", "Files evicted to respect capacity")?;
        let prefetched = counter(&registry, "cache_prefetched_total", "Files loaded by prefetch bursts")?;
        Ok(Self {
            registry,
            hits,
            misses,
            evictions,
            prefetched,
        })
    }

    pub fn record_hit(&self, policy: CachePolicy, shard: ShardId) {
        self.hits.with_label_values(&labels(policy, shard)).inc();
    }

    pub fn record_miss(&self, policy: CachePolicy, shard: ShardId) {
        self.misses.with_label_values(&labels(policy, shard)).inc();
    }

    pub fn record_eviction(&self, policy: CachePolicy, shard: ShardId) {
        self.evictions.with_label_values(&labels(policy, shard)).inc();
    }

    pub fn record_prefetched(&self, policy: CachePolicy, shard: ShardId, files: usize) {
        self.prefetched
            .with_label_values(&labels(policy, shard))
            .inc_by(files as u64);
    }

    pub fn hits(&self, policy: CachePolicy, shard: ShardId) -> u64 {
        self.hits.with_label_values(&labels(policy, shard)).get()
    }

    pub fn misses(&self, policy: CachePolicy, shard: ShardId) -> u64 {
        self.misses.with_label_values(&labels(policy, shard)).get()
    }

    /// Text exposition format of every registered counter.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help), &["policy", "shard"])?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn labels(policy: CachePolicy, shard: ShardId) -> [String; 2] {
    [policy.to_string(), shard.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_per_shard() {
        let metrics = CacheMetrics::new().unwrap();
        metrics.record_hit(CachePolicy::Lru, 0);
        metrics.record_hit(CachePolicy::Lru, 0);
        metrics.record_miss(CachePolicy::Lru, 1);

        assert_eq!(metrics.hits(CachePolicy::Lru, 0), 2);
        assert_eq!(metrics.hits(CachePolicy::Lru, 1), 0);
        assert_eq!(metrics.hits(CachePolicy::MarkovPrefetch, 0), 0);
        assert_eq!(metrics.misses(CachePolicy::Lru, 1), 1);
    }

    #[test]
    fn test_render_contains_counters() {
        let metrics = CacheMetrics::new().unwrap();
        metrics.record_prefetched(CachePolicy::MarkovPrefetch, 3, 5);
        let text = metrics.render().unwrap();
        assert!(text.contains("cache_prefetched_total{policy=\"markov-prefetch\",shard=\"3\"} 5"));
    }
}
