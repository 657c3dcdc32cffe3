//! Eviction index: an addressable min-heap keyed by an ordering value.
//!
//! Shards key it by recency timestamp (the minimum is the least recently
//! used file); the transition graph reuses it with `f64` path weights as the
//! Dijkstra frontier.
//!
//! A side table maps every key to its slot in the heap so that an existing
//! key's value can be changed in O(log n) and looked up in O(1).

use std::collections::HashMap;
use std::hash::Hash;

/// Min-priority index over `(key, value)` pairs.
#[derive(Debug, Clone)]
pub struct EvictionIndex<K, V> {
    /// Binary heap storage, smallest value at index 0.
    items: Vec<(K, V)>,

    /// Key -> slot in `items`. Always mirrors `items` exactly.
    positions: HashMap<K, usize>,
}

impl<K, V> Default for EvictionIndex<K, V> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K, V> EvictionIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: PartialOrd + Copy + Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a key, or change its value if it is already indexed.
    pub fn insert(&mut self, key: K, value: V) {
        if self.positions.contains_key(&key) {
            self.change_key(key, value);
            return;
        }

        let slot = self.items.len();
        self.positions.insert(key.clone(), slot);
        self.items.push((key, value));
        self.sift_up(slot);
    }

    /// Update the value of a key, restoring heap order in whichever
    /// direction the value moved. An absent key is inserted fresh.
    pub fn change_key(&mut self, key: K, value: V) {
        let Some(&slot) = self.positions.get(&key) else {
            self.insert(key, value);
            return;
        };

        let decreased = value < self.items[slot].1;
        self.items[slot].1 = value;
        if decreased {
            self.sift_up(slot);
        } else {
            self.sift_down(slot);
        }
    }

    /// Update the value of a key only if it is present.
    ///
    /// Returns whether the key was found.
    pub fn touch(&mut self, key: &K, value: V) -> bool {
        if !self.positions.contains_key(key) {
            return false;
        }
        self.change_key(key.clone(), value);
        true
    }

    /// Remove and return the key with the smallest value.
    pub fn extract_min(&mut self) -> Option<K> {
        self.pop_min().map(|(key, _)| key)
    }

    /// Remove and return the smallest `(key, value)` pair.
    pub fn pop_min(&mut self) -> Option<(K, V)> {
        if self.items.is_empty() {
            return None;
        }

        let last = self.items.len() - 1;
        self.swap(0, last);
        let (key, value) = self.items.pop()?;
        self.positions.remove(&key);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some((key, value))
    }

    /// The smallest pair without removing it.
    pub fn peek_min(&self) -> Option<(&K, V)> {
        self.items.first().map(|(key, value)| (key, *value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    /// Value recorded for `key`, or `V::default()` if it is not indexed.
    pub fn get_value(&self, key: &K) -> V {
        self.positions
            .get(key)
            .map(|&slot| self.items[slot].1)
            .unwrap_or_default()
    }

    /// Indexed keys in heap order (not sorted).
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.items.iter().map(|(key, _)| key)
    }

    fn sift_up(&mut self, mut child: usize) {
        while child > 0 {
            let parent = (child - 1) / 2;
            if self.items[parent].1 > self.items[child].1 {
                self.swap(parent, child);
                child = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut parent: usize) {
        let size = self.items.len();
        while parent < size {
            // Out-of-range children point back at the parent so the compare
            // below never indexes past the end.
            let mut left = 2 * parent + 1;
            let mut right = 2 * parent + 2;
            if left >= size {
                left = parent;
            }
            if right >= size {
                right = parent;
            }

            let child = if self.items[right].1 > self.items[left].1 {
                left
            } else {
                right
            };

            if self.items[parent].1 > self.items[child].1 {
                self.swap(parent, child);
                parent = child;
            } else {
                break;
            }
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        if let Some(slot) = self.positions.get_mut(&self.items[a].0) {
            *slot = a;
        }
        if let Some(slot) = self.positions.get_mut(&self.items[b].0) {
            *slot = b;
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        if self.items.len() != self.positions.len() {
            return false;
        }
        let positions_ok = self
            .items
            .iter()
            .enumerate()
            .all(|(slot, (key, _))| self.positions.get(key) == Some(&slot));
        let heap_ok = (1..self.items.len()).all(|i| self.items[(i - 1) / 2].1 <= self.items[i].1);
        positions_ok && heap_ok
    }
}
