//! In-memory backing store.
//!
//! File contents live in an immutable table shared by every handle; only the
//! call counter is per handle. Each call sleeps for a configurable latency to
//! stand in for a slow disk or remote service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StoreConfig;
use crate::store::BackingStore;

/// Simulated cost of talking to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreLatency {
    /// Charged once per call.
    pub fetch: Duration,
    /// Charged per key on batch calls.
    pub per_item: Duration,
}

impl StoreLatency {
    pub fn none() -> Self {
        Self::default()
    }

    fn for_batch(&self, items: usize) -> Duration {
        self.fetch
            .saturating_add(self.per_item.saturating_mul(u32::try_from(items).unwrap_or(u32::MAX)))
    }
}

impl From<&StoreConfig> for StoreLatency {
    fn from(config: &StoreConfig) -> Self {
        Self {
            fetch: Duration::from_millis(config.fetch_latency_ms),
            per_item: Duration::from_millis(config.per_item_latency_ms),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryStore {
    files: Arc<HashMap<String, Bytes>>,
    calls: AtomicU64,
    latency: StoreLatency,
}

impl InMemoryStore {
    pub fn new(latency: StoreLatency) -> Self {
        Self {
            files: Arc::new(HashMap::new()),
            calls: AtomicU64::new(0),
            latency,
        }
    }

    /// Build a store from `(key, value)` pairs.
    pub fn from_files<I, K, V>(files: I, latency: StoreLatency) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let files = files
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            files: Arc::new(files),
            calls: AtomicU64::new(0),
            latency,
        }
    }

    /// Add or replace a file. Handles already duplicated keep the old table.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        Arc::make_mut(&mut self.files).insert(key.into(), value.into());
    }

    pub fn latency(&self) -> StoreLatency {
        self.latency
    }

    async fn charge(&self, delay: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn get(&self, key: &str) -> Option<Bytes> {
        self.charge(self.latency.fetch).await;
        self.files.get(key).cloned()
    }

    async fn get_batch(&self, keys: &[String]) -> Option<Vec<Bytes>> {
        self.charge(self.latency.for_batch(keys.len())).await;
        keys.iter().map(|key| self.files.get(key).cloned()).collect()
    }

    fn size(&self) -> usize {
        self.files.len()
    }

    fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn duplicate(&self) -> Box<dyn BackingStore> {
        Box::new(Self {
            files: Arc::clone(&self.files),
            calls: AtomicU64::new(0),
            latency: self.latency,
        })
    }
}
