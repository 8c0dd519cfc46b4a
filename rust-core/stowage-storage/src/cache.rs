// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Indexed cache for Stowage.
//
// The local mirror every store keeps of its backend. Values, raw keys and
// original keys live in three parallel vectors so that iteration is a plain
// slice walk; a raw-key -> position map gives O(1) lookup. Removal swaps the
// last entry into the hole, so insertion order is not preserved.
//
// Invariants:
// - the three vectors always have the same length;
// - `positions[raw_keys[i]] == i` for every i;
// - no raw key appears twice.

use std::cmp::Ordering;
use std::collections::HashMap;

/// An array-backed key-value mirror with O(1) insert, lookup and removal.
///
/// `K` is the caller's original key type and `V` the value type. Entries are
/// addressed by their raw key, the backend-facing string form of `K`.
///
/// # Example
///
/// ```rust
/// use stowage_storage::cache::IndexedCache;
///
/// let mut cache: IndexedCache<u32, &str> = IndexedCache::new();
/// cache.put("1", "one", 1);
/// cache.put("2", "two", 2);
/// cache.put("3", "three", 3);
///
/// cache.remove("1");
/// assert_eq!(cache.values(), &["three", "two"]);
/// assert_eq!(cache.index_of("3"), Some(0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedCache<K, V> {
    values: Vec<V>,
    raw_keys: Vec<String>,
    keys: Vec<K>,
    positions: HashMap<String, usize>,
}

impl<K, V> Default for IndexedCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> IndexedCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            raw_keys: Vec::new(),
            keys: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.values.clear();
        self.raw_keys.clear();
        self.keys.clear();
        self.positions.clear();
    }

    /// Insert or overwrite the entry for `raw_key`.
    ///
    /// An existing entry keeps its position and its original key; only the
    /// value is replaced. Returns the previous value, if any.
    pub fn put(&mut self, raw_key: impl Into<String>, value: V, key: K) -> Option<V> {
        let raw_key = raw_key.into();
        if let Some(&index) = self.positions.get(&raw_key) {
            return Some(std::mem::replace(&mut self.values[index], value));
        }

        self.positions.insert(raw_key.clone(), self.values.len());
        self.values.push(value);
        self.raw_keys.push(raw_key);
        self.keys.push(key);
        None
    }

    /// The value stored under `raw_key`.
    pub fn get(&self, raw_key: &str) -> Option<&V> {
        self.positions.get(raw_key).map(|&index| &self.values[index])
    }

    /// The original key stored under `raw_key`.
    pub fn key(&self, raw_key: &str) -> Option<&K> {
        self.positions.get(raw_key).map(|&index| &self.keys[index])
    }

    /// Whether an entry exists for `raw_key`.
    pub fn has(&self, raw_key: &str) -> bool {
        self.positions.contains_key(raw_key)
    }

    /// Current position of `raw_key` in the parallel vectors.
    pub fn index_of(&self, raw_key: &str) -> Option<usize> {
        self.positions.get(raw_key).copied()
    }

    /// Remove the entry for `raw_key`, returning its value and original key.
    pub fn remove(&mut self, raw_key: &str) -> Option<(V, K)> {
        let index = self.index_of(raw_key)?;
        self.remove_at(index).map(|(_, value, key)| (value, key))
    }

    /// Remove the entry at `index`, moving the last entry into its place.
    ///
    /// Returns the removed raw key, value and original key.
    pub fn remove_at(&mut self, index: usize) -> Option<(String, V, K)> {
        if index >= self.values.len() {
            return None;
        }

        let value = self.values.swap_remove(index);
        let raw_key = self.raw_keys.swap_remove(index);
        let key = self.keys.swap_remove(index);

        if let Some(moved) = self.raw_keys.get(index) {
            self.positions.insert(moved.clone(), index);
        }
        self.positions.remove(&raw_key);

        Some((raw_key, value, key))
    }

    /// Replace every entry with the contents of `other` and rebuild the
    /// position map.
    pub fn overwrite(&mut self, other: IndexedCache<K, V>) {
        self.values = other.values;
        self.raw_keys = other.raw_keys;
        self.keys = other.keys;
        self.rebuild_index();
    }

    /// Whether any raw key of this cache is also present in `other`.
    pub fn has_overlap<K2, V2>(&self, other: &IndexedCache<K2, V2>) -> bool {
        self.raw_keys.iter().any(|raw_key| other.has(raw_key))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in current order.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Raw keys in current order.
    pub fn raw_keys(&self) -> &[String] {
        &self.raw_keys
    }

    /// Original keys in current order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Iterate `(original key, value)` pairs in current order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Reverse the order of all entries.
    pub fn reverse(&mut self) {
        self.values.reverse();
        self.raw_keys.reverse();
        self.keys.reverse();
        self.rebuild_index();
    }

    /// Sort entries by value with a partition-exchange sort, moving the
    /// three vectors in lock-step. Not stable.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        if self.values.len() > 1 {
            let right = self.values.len() - 1;
            self.quicksort(0, right, &mut compare);
            self.rebuild_index();
        }
    }

    fn quicksort<F>(&mut self, left: usize, right: usize, compare: &mut F)
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        // Clamped so an inconsistent comparator cannot stall the recursion.
        let index = self.partition(left, right, compare).clamp(left + 1, right);

        if left + 1 < index {
            self.quicksort(left, index - 1, compare);
        }
        if index < right {
            self.quicksort(index, right, compare);
        }
    }

    fn partition<F>(&mut self, left: usize, right: usize, compare: &mut F) -> usize
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        let (low, high) = (left as isize, right as isize);
        let mut pivot = left + (right - left) / 2;
        let mut i = low;
        let mut j = high;

        while i <= j {
            while i <= high && compare(&self.values[i as usize], &self.values[pivot]) == Ordering::Less {
                i += 1;
            }
            while j >= low && compare(&self.values[j as usize], &self.values[pivot]) == Ordering::Greater {
                j -= 1;
            }
            if i <= j {
                let (a, b) = (i as usize, j as usize);
                self.swap(a, b);
                if pivot == a {
                    pivot = b;
                } else if pivot == b {
                    pivot = a;
                }
                i += 1;
                j -= 1;
            }
        }

        i.max(0) as usize
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.values.swap(a, b);
        self.raw_keys.swap(a, b);
        self.keys.swap(a, b);
    }

    fn rebuild_index(&mut self) {
        self.positions = self
            .raw_keys
            .iter()
            .enumerate()
            .map(|(index, raw_key)| (raw_key.clone(), index))
            .collect();
    }
}
