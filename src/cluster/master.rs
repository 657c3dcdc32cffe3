//! Cluster master: owns every shard and the shared router.
//!
//! Each shard gets its own duplicate of the backing store. Clients never
//! talk to shards directly; [`CacheCluster::fetch`] asks the router for the
//! client's replica order and sends the fetch to the first shard in it.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::shard::{CacheShard, ShardError, ShardReport, ShardSettings};
use crate::config::{CachePolicy, Config};
use crate::metrics::CacheMetrics;
use crate::routing::{ClientId, RoutingError, ShardId, ShardRouter};
use crate::store::BackingStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error("no route for file {file:?} and client {client}")]
    NoRoute { file: String, client: ClientId },
}

/// Layout and policy of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterParams {
    pub shard_count: usize,
    pub replication_factor: usize,
    pub policy: CachePolicy,
    pub shard: ShardSettings,
    pub seed: u64,
}

impl ClusterParams {
    /// Params from a config, with the policy chosen by the caller.
    pub fn from_config(config: &Config, policy: CachePolicy) -> Self {
        Self {
            shard_count: config.cluster.shard_count,
            replication_factor: config.cluster.replication_factor,
            policy,
            shard: ShardSettings::from(&config.cache),
            seed: config.cluster.seed,
        }
    }
}

/// Aggregated counters across shards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterReport {
    pub shards: Vec<(ShardId, ShardReport)>,
    pub hits: u64,
    pub misses: u64,
    pub store_calls: u64,
}

impl ClusterReport {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

pub struct CacheCluster {
    shards: Vec<CacheShard>,
    router: Arc<ShardRouter>,
    params: ClusterParams,
}

impl CacheCluster {
    /// Build `shard_count` shards over `store` and a router over its files.
    pub fn new(
        client_ids: &[ClientId],
        params: ClusterParams,
        store: &dyn BackingStore,
        metrics: Option<CacheMetrics>,
    ) -> Result<Self, ClusterError> {
        let router = ShardRouter::new(
            params.shard_count,
            &store.file_names(),
            params.replication_factor,
            client_ids,
            params.seed,
        )?;

        let shards = (0..params.shard_count)
            .map(|id| {
                CacheShard::with_metrics(id, params.shard, params.policy, store, metrics.clone())
            })
            .collect();

        info!(
            shards = params.shard_count,
            replication = params.replication_factor,
            groups = router.num_groups(),
            policy = %params.policy,
            capacity = params.shard.capacity,
            files = store.size(),
            "Cluster started"
        );

        Ok(Self {
            shards,
            router: Arc::new(router),
            params,
        })
    }

    pub fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }

    pub fn shard(&self, id: ShardId) -> Option<&CacheShard> {
        self.shards.get(id)
    }

    pub fn shards(&self) -> &[CacheShard] {
        &self.shards
    }

    pub fn params(&self) -> ClusterParams {
        self.params
    }

    /// Fetch `file` for `client` from the first shard in the client's
    /// replica order.
    ///
    /// A shard error means the store and the router disagree about which
    /// files exist. It is returned as is; other replicas are not tried.
    pub async fn fetch(&self, client: ClientId, file: &str) -> Result<Bytes, ClusterError> {
        let no_route = || ClusterError::NoRoute {
            file: file.to_string(),
            client,
        };
        let shard = self
            .router
            .get_caches(file, client)
            .and_then(|order| order.first())
            .and_then(|&id| self.shards.get(id))
            .ok_or_else(no_route)?;

        shard.fetch(file).await.map_err(|e| {
            warn!(shard = shard.id(), client, file, error = %e, "Shard fetch failed");
            ClusterError::from(e)
        })
    }

    /// Per-shard counters plus totals.
    pub async fn report(&self) -> ClusterReport {
        let mut report = ClusterReport::default();
        for shard in &self.shards {
            let shard_report = shard.report().await;
            report.hits += shard_report.hits;
            report.misses += shard_report.misses;
            report.store_calls += shard_report.store_calls;
            report.shards.push((shard.id(), shard_report));
        }
        debug!(
            hits = report.hits,
            misses = report.misses,
            store_calls = report.store_calls,
            "Cluster report"
        );
        report
    }
}
