//! The in-memory write buffer.
//!
//! The buffer is the write tier above level 0: an ordered map from key to the
//! most recent value written for that key, including tombstones. It holds at
//! most `capacity` distinct keys; overwriting an existing key never counts
//! against capacity, so updates succeed even when the buffer is full.
//!
//! A crossbeam skip list keeps entries sorted by key, which gives the flush
//! path its ascending iteration and range queries their bounded scans without
//! a sort step. Writers are serialized by the tree, so the entry count can be
//! tracked with a plain atomic.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

use crate::entry::{Entry, Key, Value};

pub struct Buffer {
    data: SkipMap<Key, Value>,
    len: AtomicUsize,
    capacity: usize,
}

impl Buffer {
    /// Creates an empty buffer holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: SkipMap::new(),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Inserts or overwrites a key. Returns false iff the buffer is at
    /// capacity and the key is not already present; the caller must then
    /// flush and retry.
    pub fn put(&self, key: Key, value: Value) -> bool {
        if self.data.contains_key(&key) {
            self.data.insert(key, value);
            return true;
        }
        if self.len.load(Ordering::Relaxed) >= self.capacity {
            return false;
        }
        self.data.insert(key, value);
        self.len.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Returns the stored value for a key, which may be a tombstone.
    pub fn get(&self, key: Key) -> Option<Value> {
        self.data.get(&key).map(|entry| *entry.value())
    }

    /// Returns all entries with `lo <= key <= hi` in ascending key order,
    /// tombstones included.
    pub fn range(&self, lo: Key, hi: Key) -> Vec<Entry> {
        self.data
            .range(lo..=hi)
            .map(|entry| Entry::new(*entry.key(), *entry.value()))
            .collect()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        while self.data.pop_front().is_some() {}
        self.len.store(0, Ordering::Relaxed);
    }

    /// Iterates over all entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.data
            .iter()
            .map(|entry| Entry::new(*entry.key(), *entry.value()))
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
