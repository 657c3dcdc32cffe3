//! Cache shard: one bounded cache instance in front of the backing store.
//!
//! A shard:
//! - Serves fetches from its resident set, falling through to the store on a miss
//! - Evicts the least recently used file whenever capacity is exceeded
//! - Feeds every fetch into its transition graph
//! - Periodically launches a background prefetch burst (Markov policy only)
//!
//! Entry set, recency index, counters, clock and store handle sit behind one
//! async mutex, so fetches on a shard never interleave. The graph has its own
//! lock and may be queried by a prefetch task while fetches continue.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::cache::evictor::EvictionIndex;
use crate::cache::prefetcher::{PredictError, PredictiveGraph};
use crate::config::{CacheConfig, CachePolicy};
use crate::metrics::CacheMetrics;
use crate::routing::{ClientId, ShardId};
use crate::store::BackingStore;

/// Invariant violations surfaced by a shard. None of these are ordinary
/// misses; each means the shard, the store or the router disagree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("shard {shard}: backing store has no file {key:?}")]
    MissingFromStore { shard: ShardId, key: String },

    #[error("shard {shard}: backing store could not serve batch {keys:?}")]
    MissingBatchFromStore { shard: ShardId, keys: Vec<String> },

    #[error("shard {shard}: {size} entries still exceed capacity {capacity} after eviction")]
    CapacityExceeded {
        shard: ShardId,
        size: usize,
        capacity: usize,
    },

    #[error("shard {shard}: {source}")]
    Prediction {
        shard: ShardId,
        #[source]
        source: PredictError,
    },
}

/// Sizing and prefetch knobs of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSettings {
    pub capacity: usize,
    pub prefetch_interval: u64,
    pub prefetch_batch_size: usize,
}

impl From<&CacheConfig> for ShardSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            capacity: config.capacity,
            prefetch_interval: config.prefetch_interval,
            prefetch_batch_size: config.prefetch_batch_size,
        }
    }
}

/// Counters returned by [`CacheShard::report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardReport {
    pub hits: u64,
    pub misses: u64,
    pub store_calls: u64,
}

impl ShardReport {
    /// Hits as a fraction of all fetches (0.0 when idle).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct ShardState {
    entries: HashMap<String, Bytes>,
    recency: EvictionIndex<String, u64>,
    /// Logical clock, advanced once per fetch.
    timestamp: u64,
    hits: u64,
    misses: u64,
    store: Box<dyn BackingStore>,
}

impl ShardState {
    /// Insert a file stamped with the current clock, evicting the least
    /// recently used file if the shard overflows.
    ///
    /// Returns the evicted key, if any.
    fn add_file(
        &mut self,
        shard: ShardId,
        capacity: usize,
        key: String,
        value: Bytes,
    ) -> Result<Option<String>, ShardError> {
        self.recency.insert(key.clone(), self.timestamp);
        self.entries.insert(key, value);

        if self.entries.len() <= capacity {
            return Ok(None);
        }

        let evicted = self.recency.extract_min();
        if let Some(victim) = &evicted {
            self.entries.remove(victim);
        }
        if self.entries.len() > capacity || self.recency.len() > capacity {
            return Err(ShardError::CapacityExceeded {
                shard,
                size: self.entries.len(),
                capacity,
            });
        }
        Ok(evicted)
    }
}

struct ShardInner {
    id: ShardId,
    policy: CachePolicy,
    settings: ShardSettings,
    state: Mutex<ShardState>,
    graph: PredictiveGraph,
    metrics: Option<CacheMetrics>,
}

/// Handle to a cache shard. Clones share the same shard.
#[derive(Clone)]
pub struct CacheShard {
    inner: Arc<ShardInner>,
}

impl CacheShard {
    /// Create a shard with its own duplicate of `store`.
    pub fn new(
        id: ShardId,
        settings: ShardSettings,
        policy: CachePolicy,
        store: &dyn BackingStore,
    ) -> Self {
        Self::with_metrics(id, settings, policy, store, None)
    }

    pub fn with_metrics(
        id: ShardId,
        settings: ShardSettings,
        policy: CachePolicy,
        store: &dyn BackingStore,
        metrics: Option<CacheMetrics>,
    ) -> Self {
        let settings = ShardSettings {
            prefetch_interval: settings.prefetch_interval.max(1),
            ..settings
        };
        let state = ShardState {
            entries: HashMap::with_capacity(settings.capacity + 1),
            recency: EvictionIndex::with_capacity(settings.capacity + 1),
            timestamp: 0,
            hits: 0,
            misses: 0,
            store: store.duplicate(),
        };
        Self {
            inner: Arc::new(ShardInner {
                id,
                policy,
                settings,
                state: Mutex::new(state),
                graph: PredictiveGraph::new(),
                metrics,
            }),
        }
    }

    pub fn id(&self) -> ShardId {
        self.inner.id
    }

    pub fn policy(&self) -> CachePolicy {
        self.inner.policy
    }

    pub fn settings(&self) -> ShardSettings {
        self.inner.settings
    }

    /// The shard's transition graph.
    pub fn graph(&self) -> &PredictiveGraph {
        &self.inner.graph
    }

    /// Fetch a file, serving it from the shard when resident.
    ///
    /// Every `prefetch_interval`-th fetch also launches a prefetch burst in
    /// the background; this call does not wait for it.
    pub async fn fetch(&self, key: &str) -> Result<Bytes, ShardError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        // A file the store cannot serve must not reach the clock or the graph.
        let cached = state.entries.get(key).cloned();
        let hit = cached.is_some();
        let value = match cached {
            Some(value) => value,
            None => state.store.get(key).await.ok_or_else(|| ShardError::MissingFromStore {
                shard: inner.id,
                key: key.to_string(),
            })?,
        };

        state.timestamp += 1;
        let now = state.timestamp;

        // The shard is the graph's only recorder, so it records under its own id.
        inner.graph.record_transition(key, inner.id as ClientId);
        state.recency.touch(&key.to_string(), now);

        if hit {
            state.hits += 1;
            if let Some(metrics) = &inner.metrics {
                metrics.record_hit(inner.policy, inner.id);
            }
        } else {
            let evicted = state.add_file(
                inner.id,
                inner.settings.capacity,
                key.to_string(),
                value.clone(),
            )?;
            self.note_eviction(evicted);
            state.misses += 1;
            if let Some(metrics) = &inner.metrics {
                metrics.record_miss(inner.policy, inner.id);
            }
        }

        if inner.policy.prefetches() && now % inner.settings.prefetch_interval == 0 {
            self.spawn_prefetch(key.to_string());
        }

        Ok(value)
    }

    /// Load the files predicted to follow `key` into the shard.
    ///
    /// Returns how many files were loaded. Always 0 under the LRU policy.
    pub async fn batch_prefetch(&self, key: &str) -> Result<usize, ShardError> {
        let inner = &self.inner;
        if !inner.policy.prefetches() {
            return Ok(0);
        }

        let predicted = inner
            .graph
            .batch_predict(key, inner.settings.prefetch_batch_size)
            .map_err(|source| ShardError::Prediction {
                shard: inner.id,
                source,
            })?;
        if predicted.is_empty() {
            return Ok(0);
        }

        let mut state = inner.state.lock().await;
        let values = state.store.get_batch(&predicted).await.ok_or_else(|| {
            ShardError::MissingBatchFromStore {
                shard: inner.id,
                keys: predicted.clone(),
            }
        })?;

        let loaded = predicted.len();
        for (file, value) in predicted.into_iter().zip(values) {
            let evicted = state.add_file(inner.id, inner.settings.capacity, file, value)?;
            self.note_eviction(evicted);
        }

        if let Some(metrics) = &inner.metrics {
            metrics.record_prefetched(inner.policy, inner.id, loaded);
        }
        debug!(shard = inner.id, trigger = key, loaded, "Prefetch burst complete");
        Ok(loaded)
    }

    /// Hit/miss counters and store calls, read under the shard lock.
    pub async fn report(&self) -> ShardReport {
        let state = self.inner.state.lock().await;
        ShardReport {
            hits: state.hits,
            misses: state.misses,
            store_calls: state.store.call_count(),
        }
    }

    /// Number of resident files.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().await.entries.contains_key(key)
    }

    /// Resident file keys, sorted.
    pub async fn resident_keys(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut keys: Vec<String> = state.entries.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    fn spawn_prefetch(&self, key: String) {
        let shard = self.clone();
        tokio::spawn(async move {
            if let Err(e) = shard.batch_prefetch(&key).await {
                error!(shard = shard.id(), trigger = %key, error = %e, "Prefetch burst failed");
            }
        });
    }

    fn note_eviction(&self, evicted: Option<String>) {
        if let Some(victim) = evicted {
            debug!(shard = self.inner.id, victim = %victim, "Evicted file");
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_eviction(self.inner.policy, self.inner.id);
            }
        }
    }
}
