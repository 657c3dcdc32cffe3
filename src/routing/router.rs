//! Replica routing: which shards hold a file, and in which order a given
//! client should try them.
//!
//! Construction splits the cluster into `shard_count / replication_factor`
//! replica groups. Files are spread evenly over the groups (then shuffled
//! with a fixed seed so file order does not leak into placement), shard ids
//! are split over the same groups in id order, and every client gets its
//! own fixed permutation of its file's group. Different clients therefore
//! prefer different replicas of the same file without any coordination.
//!
//! All tables are built once; the router is read-only afterwards and can be
//! shared behind an `Arc` without locking.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::routing::{ClientId, GroupId, ShardId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("replication factor must be at least 1")]
    ZeroReplication,

    #[error("{shard_count} shards cannot hold {replication_factor} replicas of each file")]
    TooFewShards {
        shard_count: usize,
        replication_factor: usize,
    },

    #[error("file {0:?} appears more than once in the file list")]
    DuplicateFile(String),
}

/// Precomputed routing tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRouter {
    num_groups: usize,
    clients: Vec<ClientId>,

    /// File -> replica group.
    file_groups: HashMap<String, GroupId>,

    /// Group -> shard ids, in ascending id order.
    group_shards: Vec<Vec<ShardId>>,

    /// File -> client -> order in which to try the group's shards.
    replica_order: HashMap<String, HashMap<ClientId, Vec<ShardId>>>,
}

impl ShardRouter {
    /// Build the routing tables.
    ///
    /// `seed` drives the file -> group shuffle; client orderings are seeded
    /// by each client's position in `clients`.
    ///
    /// When `shard_count` is not a multiple of `replication_factor`, the
    /// leftover shards join the first groups one each, so replica counts per
    /// group can then differ by one.
    pub fn new(
        shard_count: usize,
        files: &[String],
        replication_factor: usize,
        clients: &[ClientId],
        seed: u64,
    ) -> Result<Self, RoutingError> {
        if replication_factor == 0 {
            return Err(RoutingError::ZeroReplication);
        }
        let num_groups = shard_count / replication_factor;
        if num_groups == 0 {
            return Err(RoutingError::TooFewShards {
                shard_count,
                replication_factor,
            });
        }
        if shard_count % replication_factor != 0 {
            warn!(
                shard_count,
                replication_factor,
                num_groups,
                "Shard count not divisible by replication factor; leftover shards join the first groups"
            );
        }

        let file_groups = assign_file_groups(files, num_groups, seed)?;

        let mut group_shards = vec![Vec::new(); num_groups];
        for (shard, group) in split_among_groups(shard_count, num_groups)
            .into_iter()
            .enumerate()
        {
            group_shards[group].push(shard);
        }

        // A client's ordering depends only on its group and its seed, so it is
        // computed once per (group, client) and copied into every file.
        let orderings: Vec<HashMap<ClientId, Vec<ShardId>>> = group_shards
            .iter()
            .map(|shards| {
                clients
                    .iter()
                    .enumerate()
                    .map(|(i, &client)| (client, seeded_shuffle(shards, i as u64)))
                    .collect()
            })
            .collect();

        let replica_order = file_groups
            .iter()
            .map(|(file, &group)| (file.clone(), orderings[group].clone()))
            .collect();

        debug!(
            shard_count,
            replication_factor,
            num_groups,
            files = files.len(),
            clients = clients.len(),
            "Built shard router"
        );

        Ok(Self {
            num_groups,
            clients: clients.to_vec(),
            file_groups,
            group_shards,
            replica_order,
        })
    }

    /// Shards to contact for `file`, in `client`'s preference order.
    ///
    /// `None` if either the file or the client is unknown.
    pub fn get_caches(&self, file: &str, client: ClientId) -> Option<&[ShardId]> {
        self.replica_order
            .get(file)?
            .get(&client)
            .map(Vec::as_slice)
    }

    /// Shards assigned to a replica group.
    pub fn get_caches_in_group(&self, group: GroupId) -> Option<&[ShardId]> {
        self.group_shards.get(group).map(Vec::as_slice)
    }

    pub fn group_of(&self, file: &str) -> Option<GroupId> {
        self.file_groups.get(file).copied()
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn clients(&self) -> &[ClientId] {
        &self.clients
    }

    pub fn file_groups(&self) -> &HashMap<String, GroupId> {
        &self.file_groups
    }
}

/// Assign `n` items to `num_groups` groups as evenly as possible: item `k`
/// goes to group `k / (n / num_groups)`, and the `n % num_groups` leftovers
/// go one each to groups `0, 1, ...`.
fn split_among_groups(n: usize, num_groups: usize) -> Vec<GroupId> {
    let per_group = n / num_groups;
    let mut mapping = vec![0; n];
    for group in 0..num_groups {
        for j in 0..per_group {
            mapping[per_group * group + j] = group;
        }
    }
    for i in 0..(n - per_group * num_groups) {
        mapping[per_group * num_groups + i] = i;
    }
    mapping
}

fn assign_file_groups(
    files: &[String],
    num_groups: usize,
    seed: u64,
) -> Result<HashMap<String, GroupId>, RoutingError> {
    let mapping = seeded_shuffle(&split_among_groups(files.len(), num_groups), seed);
    let mut file_groups = HashMap::with_capacity(files.len());
    for (file, group) in files.iter().zip(mapping) {
        if file_groups.insert(file.clone(), group).is_some() {
            return Err(RoutingError::DuplicateFile(file.clone()));
        }
    }
    Ok(file_groups)
}

/// Shuffle a copy of `items` with a generator owned by this call alone.
fn seeded_shuffle<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    let mut out = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    out.shuffle(&mut rng);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("file_{i}.dat")).collect()
    }

    #[test]
    fn test_split_even() {
        assert_eq!(split_among_groups(6, 3), vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_split_remainder_goes_to_first_groups() {
        assert_eq!(split_among_groups(8, 3), vec![0, 0, 1, 1, 2, 2, 0, 1]);
    }

    #[test]
    fn test_split_fewer_items_than_groups() {
        assert_eq!(split_among_groups(2, 4), vec![0, 1]);
    }

    #[test]
    fn test_seeded_shuffle_is_a_permutation() {
        let items: Vec<usize> = (0..20).collect();
        let mut shuffled = seeded_shuffle(&items, 7);
        assert_eq!(shuffled, seeded_shuffle(&items, 7));
        shuffled.sort_unstable();
        assert_eq!(shuffled, items);
    }

    #[test]
    fn test_group_shards_partition_all_ids() {
        let router = ShardRouter::new(6, &files(10), 2, &[1, 2], 1).unwrap();
        assert_eq!(router.num_groups(), 3);
        assert_eq!(router.get_caches_in_group(0), Some(&[0, 1][..]));
        assert_eq!(router.get_caches_in_group(1), Some(&[2, 3][..]));
        assert_eq!(router.get_caches_in_group(2), Some(&[4, 5][..]));
        assert_eq!(router.get_caches_in_group(3), None);
    }

    #[test]
    fn test_leftover_shards_join_first_groups() {
        let router = ShardRouter::new(5, &files(4), 2, &[1], 1).unwrap();
        assert_eq!(router.num_groups(), 2);
        assert_eq!(router.get_caches_in_group(0), Some(&[0, 1, 4][..]));
        assert_eq!(router.get_caches_in_group(1), Some(&[2, 3][..]));
    }

    #[test]
    fn test_group_sizes_balanced() {
        let router = ShardRouter::new(4, &files(11), 2, &[1], 1).unwrap();
        let mut sizes = [0usize; 2];
        for group in router.file_groups().values() {
            sizes[*group] += 1;
        }
        assert_eq!(sizes, [6, 5]);
    }

    #[test]
    fn test_zero_replication_rejected() {
        assert_eq!(
            ShardRouter::new(4, &files(4), 0, &[1], 1),
            Err(RoutingError::ZeroReplication)
        );
    }

    #[test]
    fn test_replication_above_shard_count_rejected() {
        assert!(matches!(
            ShardRouter::new(2, &files(4), 3, &[1], 1),
            Err(RoutingError::TooFewShards { .. })
        ));
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let list = vec!["a".to_string(), "a".to_string()];
        assert_eq!(
            ShardRouter::new(2, &list, 1, &[1], 1),
            Err(RoutingError::DuplicateFile("a".to_string()))
        );
    }

    #[test]
    fn test_unknown_file_or_client() {
        let router = ShardRouter::new(4, &files(4), 2, &[1, 2], 1).unwrap();
        assert!(router.get_caches("missing", 1).is_none());
        assert!(router.get_caches("file_0.dat", 99).is_none());
    }
}
