//! shard-cache-sim: runs a client workload against a sharded cache tier.
//!
//! By default the same workload is replayed under both cache policies
//! (plain LRU and Markov prefetch) and the hit ratios are compared.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use shard_cache_sim::cluster::workload::{build_store, client_ids, run_workload};
use shard_cache_sim::cluster::{CacheCluster, ClusterParams, ClusterReport};
use shard_cache_sim::config::{CachePolicy, Cli, Config};
use shard_cache_sim::metrics::CacheMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "shard_cache_sim=debug"
    } else {
        "shard_cache_sim=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("shard-cache-sim v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;

    info!(
        shards = config.cluster.shard_count,
        replication = config.cluster.replication_factor,
        capacity = config.cache.capacity,
        files = config.workload.num_files,
        files_per_group = config.files_per_group(),
        clients = config.workload.num_clients,
        rounds = config.workload.rounds,
        "Configuration loaded"
    );

    let policies = match cli.policy {
        Some(policy) => vec![policy],
        None => vec![CachePolicy::Lru, CachePolicy::MarkovPrefetch],
    };

    let metrics = CacheMetrics::new()?;
    let mut results = Vec::with_capacity(policies.len());
    for policy in policies {
        let report = simulate(&config, policy, metrics.clone()).await?;
        results.push((policy, report));
    }

    for (policy, report) in &results {
        info!(
            policy = %policy,
            hits = report.hits,
            misses = report.misses,
            store_calls = report.store_calls,
            hit_ratio = report.hit_ratio(),
            "Policy result"
        );
    }

    if let [(_, lru), (_, markov)] = results.as_slice() {
        info!(
            lru_hit_ratio = lru.hit_ratio(),
            markov_hit_ratio = markov.hit_ratio(),
            store_calls_saved = lru.store_calls as i64 - markov.store_calls as i64,
            "Policy comparison"
        );
    }

    if cli.metrics {
        println!("{}", metrics.render()?);
    }

    Ok(())
}

async fn simulate(
    config: &Config,
    policy: CachePolicy,
    metrics: CacheMetrics,
) -> anyhow::Result<ClusterReport> {
    let store = build_store(config);
    let clients = client_ids(&config.workload);
    let cluster = CacheCluster::new(
        &clients,
        ClusterParams::from_config(config, policy),
        &store,
        Some(metrics),
    )?;
    run_workload(Arc::new(cluster), &config.workload).await
}
