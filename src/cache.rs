//! Small in-memory write-through caches, one per key family.
//!
//! Populated on write, consulted on read, falling through to the store on
//! a miss. Correctness requires every batch that modifies the store to
//! update these caches in lockstep, before the batch commits. A
//! [`CacheUpdate`] staged alongside the write batch is applied only after
//! the store write succeeds, so a failed commit never leaves the cache
//! ahead of the store.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 1024;

/// One bounded LRU map per persistent key family.
pub struct WriteCache {
    header: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    body: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    td: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    number_to_hash: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    hash_to_number: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
}

/// Identifies which per-family cache a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// `header(number, hash)` keys.
    Header,
    /// `body(number, hash)` keys.
    Body,
    /// `td(number, hash)` keys.
    Td,
    /// `numberToHash(number)` keys.
    NumberToHash,
    /// `hashToNumber(hash)` keys.
    HashToNumber,
}

/// A batch of cache mutations staged alongside a [`crate::kv::WriteBatch`],
/// applied only once the underlying store write has committed.
#[derive(Debug, Default)]
pub struct CacheUpdate {
    ops: Vec<(Family, CacheOp)>,
}

#[derive(Debug)]
enum CacheOp {
    Put(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

impl CacheUpdate {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put into `family`'s cache.
    pub fn put(&mut self, family: Family, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push((family, CacheOp::Put(key, value)));
    }

    /// Stages a removal from `family`'s cache.
    pub fn remove(&mut self, family: Family, key: Vec<u8>) {
        self.ops.push((family, CacheOp::Remove(key)));
    }
}

impl Default for WriteCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl WriteCache {
    /// Builds a cache whose per-family capacity is `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            header: Mutex::new(LruCache::new(cap)),
            body: Mutex::new(LruCache::new(cap)),
            td: Mutex::new(LruCache::new(cap)),
            number_to_hash: Mutex::new(LruCache::new(cap)),
            hash_to_number: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self, family: Family) -> &Mutex<LruCache<Vec<u8>, Vec<u8>>> {
        match family {
            Family::Header => &self.header,
            Family::Body => &self.body,
            Family::Td => &self.td,
            Family::NumberToHash => &self.number_to_hash,
            Family::HashToNumber => &self.hash_to_number,
        }
    }

    /// Consults `family`'s cache for `key`, cloning the value on a hit.
    pub fn get(&self, family: Family, key: &[u8]) -> Option<Vec<u8>> {
        self.lock(family).lock().get(key).cloned()
    }

    /// Applies a previously staged [`CacheUpdate`]. Called only after the
    /// corresponding store write has committed successfully.
    pub fn apply(&self, update: CacheUpdate) {
        for (family, op) in update.ops {
            let mut guard = self.lock(family).lock();
            match op {
                CacheOp::Put(k, v) => {
                    guard.put(k, v);
                }
                CacheOp::Remove(k) => {
                    guard.pop(&k);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_after_apply() {
        let cache = WriteCache::with_capacity(4);
        assert_eq!(cache.get(Family::Header, b"k"), None);

        let mut update = CacheUpdate::new();
        update.put(Family::Header, b"k".to_vec(), b"v".to_vec());
        cache.apply(update);

        assert_eq!(cache.get(Family::Header, b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn families_are_isolated() {
        let cache = WriteCache::with_capacity(4);
        let mut update = CacheUpdate::new();
        update.put(Family::Header, b"k".to_vec(), b"v".to_vec());
        cache.apply(update);

        assert_eq!(cache.get(Family::Body, b"k"), None);
    }

    #[test]
    fn remove_evicts_entry() {
        let cache = WriteCache::with_capacity(4);
        let mut put = CacheUpdate::new();
        put.put(Family::Td, b"k".to_vec(), b"v".to_vec());
        cache.apply(put);

        let mut rm = CacheUpdate::new();
        rm.remove(Family::Td, b"k".to_vec());
        cache.apply(rm);

        assert_eq!(cache.get(Family::Td, b"k"), None);
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let cache = WriteCache::with_capacity(1);
        let mut update = CacheUpdate::new();
        update.put(Family::NumberToHash, b"a".to_vec(), b"1".to_vec());
        update.put(Family::NumberToHash, b"b".to_vec(), b"2".to_vec());
        cache.apply(update);

        assert_eq!(cache.get(Family::NumberToHash, b"a"), None);
        assert_eq!(cache.get(Family::NumberToHash, b"b"), Some(b"2".to_vec()));
    }
}
