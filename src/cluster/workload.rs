//! Simulated clients.
//!
//! Access sequences are deterministic so that LRU and Markov runs over the
//! same config see identical traffic.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, info};

use crate::cluster::master::{CacheCluster, ClusterError, ClusterReport};
use crate::config::{AccessPattern, Config, WorkloadConfig};
use crate::routing::ClientId;
use crate::store::{InMemoryStore, StoreLatency};

/// Key of the `i`-th generated file.
pub fn file_name(i: usize) -> String {
    format!("file_{i:05}.dat")
}

/// Backing store holding `workload.num_files` generated files.
pub fn build_store(config: &Config) -> InMemoryStore {
    InMemoryStore::from_files(
        (0..config.workload.num_files).map(|i| {
            let name = file_name(i);
            let contents = Bytes::from(format!("contents of {name}"));
            (name, contents)
        }),
        StoreLatency::from(&config.store),
    )
}

/// Client ids `1..=num_clients`.
pub fn client_ids(workload: &WorkloadConfig) -> Vec<ClientId> {
    (1..=workload.num_clients as ClientId).collect()
}

/// One pass of `client`'s access sequence, as indices into the file list.
pub fn access_sequence(workload: &WorkloadConfig, client: ClientId) -> Vec<usize> {
    let n = workload.num_files;
    if n == 0 {
        return Vec::new();
    }
    let client = client as usize;
    match workload.pattern {
        AccessPattern::Sequential => {
            let offset = (client * n / workload.num_clients.max(1)) % n;
            (0..n).map(|i| (offset + i) % n).collect()
        }
        AccessPattern::Strided => {
            // A stride coprime with n visits every file exactly once.
            let mut stride = client % n + 1;
            while gcd(stride, n) != 1 {
                stride += 1;
            }
            (0..n).map(|i| (i * stride) % n).collect()
        }
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Run every client concurrently for `workload.rounds` passes and return
/// the cluster's counters.
pub async fn run_workload(
    cluster: Arc<CacheCluster>,
    workload: &WorkloadConfig,
) -> anyhow::Result<ClusterReport> {
    let started = Instant::now();
    let files: Arc<Vec<String>> = Arc::new((0..workload.num_files).map(file_name).collect());

    let tasks = client_ids(workload).into_iter().map(|client| {
        let cluster = cluster.clone();
        let files = files.clone();
        let sequence = access_sequence(workload, client);
        let rounds = workload.rounds;
        tokio::spawn(async move {
            for _ in 0..rounds {
                for &i in &sequence {
                    cluster.fetch(client, &files[i]).await?;
                }
            }
            debug!(client, fetches = rounds * sequence.len(), "Client finished");
            Ok::<(), ClusterError>(())
        })
    });

    for result in join_all(tasks).await {
        result??;
    }

    let report = cluster.report().await;
    info!(
        policy = %cluster.params().policy,
        hits = report.hits,
        misses = report.misses,
        store_calls = report.store_calls,
        hit_ratio = report.hit_ratio(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Workload complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(pattern: AccessPattern) -> WorkloadConfig {
        WorkloadConfig {
            num_files: 12,
            num_clients: 3,
            rounds: 1,
            pattern,
        }
    }

    #[test]
    fn test_sequences_visit_every_file_once() {
        for pattern in [AccessPattern::Sequential, AccessPattern::Strided] {
            let w = workload(pattern);
            for client in client_ids(&w) {
                let mut seq = access_sequence(&w, client);
                seq.sort_unstable();
                assert_eq!(seq, (0..12).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_sequential_offsets_differ() {
        let w = workload(AccessPattern::Sequential);
        assert_eq!(access_sequence(&w, 1)[0], 4);
        assert_eq!(access_sequence(&w, 2)[0], 8);
        assert_eq!(access_sequence(&w, 3)[0], 0);
    }

    #[test]
    fn test_empty_workload() {
        let w = WorkloadConfig {
            num_files: 0,
            ..workload(AccessPattern::Strided)
        };
        assert!(access_sequence(&w, 1).is_empty());
    }

    #[test]
    fn test_build_store_names() {
        let mut config = Config::default();
        config.workload.num_files = 3;
        let store = build_store(&config);
        use crate::store::BackingStore;
        assert_eq!(
            store.file_names(),
            vec!["file_00000.dat", "file_00001.dat", "file_00002.dat"]
        );
    }
}
