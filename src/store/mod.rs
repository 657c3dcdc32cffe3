//! The slow backing store that cache misses fall through to.
//!
//! - [`memory`]: in-process store with simulated latency and call counting

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use memory::{InMemoryStore, StoreLatency};

/// Key -> value lookup behind the cache tier.
///
/// Each shard holds its own handle obtained through [`duplicate`], so call
/// counters are never shared between shards.
///
/// [`duplicate`]: BackingStore::duplicate
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Look up one file.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Look up several files in one call. `None` if any key is missing.
    async fn get_batch(&self, keys: &[String]) -> Option<Vec<Bytes>>;

    /// Number of files held.
    fn size(&self) -> usize;

    /// Every file key, sorted.
    fn file_names(&self) -> Vec<String>;

    /// Calls served through this handle.
    fn call_count(&self) -> u64;

    /// An independent handle over the same data with its own counters.
    fn duplicate(&self) -> Box<dyn BackingStore>;
}
