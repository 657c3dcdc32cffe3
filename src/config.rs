//! Runtime configuration for shard-cache-sim.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every knob of the simulated tier (shard layout, cache policy, store
//! latency, workload shape) lives here.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "shard-cache-sim", about = "Sharded cache tier simulator (LRU vs Markov prefetch)")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Run a single policy instead of comparing both.
    #[arg(short, long, value_enum)]
    pub policy: Option<CachePolicy>,

    /// Dump Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Eviction/prefetch policy of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Pure least-recently-used eviction, no prefetch.
    Lru,
    /// LRU eviction plus periodic Markov-chain prefetch bursts.
    MarkovPrefetch,
}

impl CachePolicy {
    pub fn prefetches(&self) -> bool {
        matches!(self, CachePolicy::MarkovPrefetch)
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePolicy::Lru => write!(f, "lru"),
            CachePolicy::MarkovPrefetch => write!(f, "markov-prefetch"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-shard cache settings.
    pub cache: CacheConfig,

    /// Shard layout.
    pub cluster: ClusterConfig,

    /// Backing store simulation.
    pub store: StoreConfig,

    /// Client workload.
    pub workload: WorkloadConfig,
}

/// Per-shard cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resident files per shard.
    pub capacity: usize,

    /// A prefetch burst is scheduled every this many fetches.
    pub prefetch_interval: u64,

    /// Files requested from the predictor per burst.
    pub prefetch_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            prefetch_interval: 10,
            prefetch_batch_size: 10,
        }
    }
}

/// Shard layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of cache shards.
    pub shard_count: usize,

    /// Replicas per file.
    pub replication_factor: usize,

    /// Seed for the file -> group shuffle.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            shard_count: 4,
            replication_factor: 2,
            seed: 1,
        }
    }
}

/// Backing store latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Latency charged on every store call.
    pub fetch_latency_ms: u64,

    /// Extra latency per key on batch calls.
    pub per_item_latency_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fetch_latency_ms: 10,
            per_item_latency_ms: 1,
        }
    }
}

/// Order in which a client walks the file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPattern {
    /// Scan files in order, starting at a client-specific offset.
    Sequential,
    /// Walk files with a client-specific stride.
    Strided,
}

/// Simulated client workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of files in the backing store.
    pub num_files: usize,

    /// Number of concurrent clients.
    pub num_clients: usize,

    /// Passes each client makes over its access sequence.
    pub rounds: usize,

    pub pattern: AccessPattern,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            num_files: 100,
            num_clients: 4,
            rounds: 5,
            pattern: AccessPattern::Sequential,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject layouts the router or shards cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster.shard_count == 0 {
            anyhow::bail!("cluster.shard_count must be at least 1");
        }
        if self.cluster.replication_factor == 0 {
            anyhow::bail!("cluster.replication_factor must be at least 1");
        }
        if self.cluster.replication_factor > self.cluster.shard_count {
            anyhow::bail!(
                "cluster.replication_factor ({}) exceeds cluster.shard_count ({})",
                self.cluster.replication_factor,
                self.cluster.shard_count
            );
        }
        if self.cache.prefetch_interval == 0 {
            anyhow::bail!("cache.prefetch_interval must be at least 1");
        }
        Ok(())
    }

    /// Files each shard's group must hold to keep every file resident.
    pub fn files_per_group(&self) -> usize {
        let groups = self.cluster.shard_count / self.cluster.replication_factor.max(1);
        if groups == 0 {
            return 0;
        }
        self.workload.num_files.div_ceil(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.capacity, 20);
        assert_eq!(cfg.cache.prefetch_interval, 10);
        assert_eq!(cfg.cache.prefetch_batch_size, 10);
        assert_eq!(cfg.cluster.seed, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_files_per_group() {
        let cfg = Config::default();
        // 100 files over 4 / 2 = 2 groups
        assert_eq!(cfg.files_per_group(), 50);
    }

    #[test]
    fn test_validate_rejects_bad_layout() {
        let mut cfg = Config::default();
        cfg.cluster.replication_factor = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.cache.prefetch_interval = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache": {{"capacity": 7}}, "workload": {{"pattern": "strided"}}}}"#).unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.cache.capacity, 7);
        assert_eq!(cfg.workload.pattern, AccessPattern::Strided);
        assert_eq!(cfg.cache.prefetch_interval, 10);
        assert_eq!(cfg.cluster.shard_count, 4);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.workload.num_files, 100);
    }
}
