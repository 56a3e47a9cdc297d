//! Ordered non-unique containers.
//!
//! The standard library covers the unique ordered set and map
//! (`BTreeSet`, `BTreeMap`), the sequence (`Vec`), the string and the deque
//! (`VecDeque`). These two fill the non-unique gap with the same ordering
//! and equality semantics as their unique counterparts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered set that keeps duplicates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Ord + Deserialize<'de>"
))]
pub struct MultiSet<T> {
    counts: BTreeMap<T, usize>,
    len: usize,
}

impl<T: Ord> MultiSet<T> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
            len: 0,
        }
    }

    /// Total number of elements, duplicates included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) {
        *self.counts.entry(value).or_insert(0) += 1;
        self.len += 1;
    }

    /// Remove one occurrence. Returns `false` if `value` was absent.
    pub fn remove_one(&mut self, value: &T) -> bool {
        let Some(count) = self.counts.get_mut(value) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(value);
        }
        self.len -= 1;
        true
    }

    /// Number of occurrences of `value`.
    pub fn count(&self, value: &T) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.counts.contains_key(value)
    }

    /// Iterate in order, yielding each duplicate separately.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.counts
            .iter()
            .flat_map(|(value, &count)| std::iter::repeat(value).take(count))
    }

    /// Iterate distinct values with their counts.
    pub fn distinct(&self) -> impl Iterator<Item = (&T, usize)> + '_ {
        self.counts.iter().map(|(value, &count)| (value, count))
    }
}

impl<T: Ord> Default for MultiSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> FromIterator<T> for MultiSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

/// Ordered map that keeps several values per key, in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: Ord + Deserialize<'de>, V: Deserialize<'de>"
))]
pub struct MultiMap<K, V> {
    entries: BTreeMap<K, Vec<V>>,
    len: usize,
}

impl<K: Ord, V> MultiMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    /// Total number of values across all keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.entry(key).or_default().push(value);
        self.len += 1;
    }

    /// All values stored under `key`.
    pub fn get(&self, key: &K) -> &[V] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove and return every value stored under `key`.
    pub fn remove(&mut self, key: &K) -> Vec<V> {
        let removed = self.entries.remove(key).unwrap_or_default();
        self.len -= removed.len();
        removed
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }
}

impl<K: Ord, V> Default for MultiMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for MultiMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiset_keeps_duplicates_in_order() {
        let set: MultiSet<u32> = [3, 1, 3, 2, 1, 3].into_iter().collect();
        assert_eq!(set.len(), 6);
        assert_eq!(set.count(&3), 3);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![1, 1, 2, 3, 3, 3]);
    }

    #[test]
    fn multiset_remove_one() {
        let mut set: MultiSet<&str> = ["a", "a", "b"].into_iter().collect();
        assert!(set.remove_one(&"a"));
        assert_eq!(set.count(&"a"), 1);
        assert!(set.remove_one(&"a"));
        assert!(!set.contains(&"a"));
        assert!(!set.remove_one(&"a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn multiset_equality_ignores_insertion_order() {
        let a: MultiSet<u8> = [1, 2, 2].into_iter().collect();
        let b: MultiSet<u8> = [2, 1, 2].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn multimap_groups_by_key() {
        let mut map = MultiMap::new();
        map.insert("bob", 2);
        map.insert("alice", 1);
        map.insert("bob", 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&"bob"), &[2, 3]);
        assert_eq!(map.get(&"carol"), &[] as &[i32]);

        let pairs: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs, vec![("alice", 1), ("bob", 2), ("bob", 3)]);

        assert_eq!(map.remove(&"bob"), vec![2, 3]);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn containers_survive_bincode() {
        let set: MultiSet<String> = ["x".to_string(), "x".to_string()].into_iter().collect();
        let bytes = bincode::serialize(&set).unwrap();
        let back: MultiSet<String> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, set);

        let map: MultiMap<u64, String> = [(1, "a".to_string()), (1, "b".to_string())]
            .into_iter()
            .collect();
        let bytes = bincode::serialize(&map).unwrap();
        let back: MultiMap<u64, String> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, map);
    }
}
