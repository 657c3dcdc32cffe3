//! Integration tests for replica routing.

use std::collections::HashSet;

use proptest::prelude::*;

use shard_cache_sim::routing::ShardRouter;

fn files(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("file_{i}")).collect()
}

#[test]
fn test_get_caches_is_stable() {
    let router = ShardRouter::new(6, &files(30), 3, &[10, 20, 30], 1).unwrap();
    for file in files(30) {
        for client in [10, 20, 30] {
            let first = router.get_caches(&file, client).unwrap().to_vec();
            let second = router.get_caches(&file, client).unwrap().to_vec();
            assert_eq!(first, second);
        }
    }
}

#[test]
fn test_get_caches_is_permutation_of_group() {
    let router = ShardRouter::new(6, &files(30), 3, &[10, 20, 30], 1).unwrap();
    for file in files(30) {
        let group = router.group_of(&file).unwrap();
        let mut group_shards = router.get_caches_in_group(group).unwrap().to_vec();
        group_shards.sort_unstable();
        for client in [10, 20, 30] {
            let mut order = router.get_caches(&file, client).unwrap().to_vec();
            assert_eq!(order.len(), 3);
            order.sort_unstable();
            assert_eq!(order, group_shards);
        }
    }
}

#[test]
fn test_identical_inputs_build_identical_routers() {
    let a = ShardRouter::new(8, &files(50), 2, &[1, 2, 3, 4], 1).unwrap();
    let b = ShardRouter::new(8, &files(50), 2, &[1, 2, 3, 4], 1).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_seed_changes_file_placement() {
    let a = ShardRouter::new(8, &files(200), 2, &[1], 1).unwrap();
    let b = ShardRouter::new(8, &files(200), 2, &[1], 2).unwrap();
    assert_ne!(a.file_groups(), b.file_groups());
}

#[test]
fn test_clients_spread_first_choice() {
    // With 4 replicas, 16 clients should not all agree on one first choice.
    let clients: Vec<u64> = (0..16).collect();
    let router = ShardRouter::new(4, &files(4), 4, &clients, 1).unwrap();
    let first_choices: HashSet<usize> = clients
        .iter()
        .map(|&c| router.get_caches("file_0", c).unwrap()[0])
        .collect();
    assert!(first_choices.len() > 1);
}

#[test]
fn test_same_client_same_order_within_group() {
    let router = ShardRouter::new(4, &files(20), 2, &[5, 6], 1).unwrap();
    let in_group_0: Vec<String> = files(20)
        .into_iter()
        .filter(|f| router.group_of(f) == Some(0))
        .collect();
    let reference = router.get_caches(&in_group_0[0], 5).unwrap();
    for file in &in_group_0 {
        assert_eq!(router.get_caches(file, 5).unwrap(), reference);
    }
}

proptest! {
    #[test]
    fn prop_every_shard_in_exactly_one_group(
        shard_count in 1usize..24,
        replication in 1usize..6,
        num_files in 0usize..60,
    ) {
        prop_assume!(replication <= shard_count);
        let router = ShardRouter::new(shard_count, &files(num_files), replication, &[1, 2], 7).unwrap();

        let mut seen = Vec::new();
        for group in 0..router.num_groups() {
            let shards = router.get_caches_in_group(group).unwrap();
            prop_assert!(shards.len() >= replication);
            seen.extend_from_slice(shards);
        }
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..shard_count).collect::<Vec<_>>());
        prop_assert_eq!(router.file_groups().len(), num_files);
    }
}
