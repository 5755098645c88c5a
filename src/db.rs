//! Typed access over the key-value store: encoded reads for
//! headers/bodies/TD/lookups, and atomic batch writes. Wraps
//! [`crate::keys`] and [`crate::cache::WriteCache`].
//!
//! Header and body RLP encode/decode is an external collaborator per the
//! crate's scope: what this module persists at a `header`/`body` key is
//! not the RLP itself but a small self-describing envelope around the
//! caller-supplied `raw` bytes plus the handful of fields the algorithm
//! needs, so that a later read can reconstruct a [`Header`]/[`Body`]
//! without re-parsing `raw`.

use crate::cache::{CacheUpdate, Family, WriteCache};
use crate::error::ChainStoreError;
use crate::keys;
use crate::kv::{KvStore, WriteBatch};
use crate::types::{BlockNumber, Body, Header, TotalDifficulty};
use alloy_primitives::{Bytes, B256, U256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Typed operations consumed by [`crate::chain::ChainCore`].
pub struct DbManager {
    store: Arc<dyn KvStore>,
    cache: WriteCache,
}

impl DbManager {
    /// Wraps `store` with a fresh [`WriteCache`] of `cache_capacity` entries
    /// per family.
    pub fn new(store: Arc<dyn KvStore>, cache_capacity: usize) -> Self {
        Self { store, cache: WriteCache::with_capacity(cache_capacity) }
    }

    fn get_cached(&self, family: Family, key: &[u8]) -> Result<Option<Vec<u8>>, ChainStoreError> {
        if let Some(v) = self.cache.get(family, key) {
            return Ok(Some(v));
        }
        Ok(self.store.get(key)?)
    }

    /// Reads the header at `(number, hash)`.
    pub fn get_header(&self, number: BlockNumber, hash: B256) -> Result<Option<Header>, ChainStoreError> {
        let key = keys::header_key(number, hash);
        match self.get_cached(Family::Header, &key)? {
            Some(bytes) => Ok(Some(decode_header(hash, number, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads the body at `(number, hash)`.
    pub fn get_body(&self, number: BlockNumber, hash: B256) -> Result<Option<Body>, ChainStoreError> {
        let key = keys::body_key(number, hash);
        match self.get_cached(Family::Body, &key)? {
            Some(bytes) => Ok(Some(Body { raw: Bytes::from(bytes) })),
            None => Ok(None),
        }
    }

    /// Reads the total difficulty at `(number, hash)`.
    pub fn get_td(&self, number: BlockNumber, hash: B256) -> Result<Option<TotalDifficulty>, ChainStoreError> {
        let key = keys::td_key(number, hash);
        match self.get_cached(Family::Td, &key)? {
            Some(bytes) => Ok(Some(U256::from_be_slice(&bytes))),
            None => Ok(None),
        }
    }

    /// Resolves `hash` to its block number, if known.
    pub fn hash_to_number(&self, hash: B256) -> Result<Option<BlockNumber>, ChainStoreError> {
        let key = keys::hash_to_number_key(hash);
        match self.get_cached(Family::HashToNumber, &key)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(Some(u64::from_be_bytes(buf)))
            }
            Some(_) | None => Ok(None),
        }
    }

    /// Resolves `number` to the canonical hash at that number, if any.
    pub fn number_to_hash(&self, number: BlockNumber) -> Result<Option<B256>, ChainStoreError> {
        let key = keys::number_to_hash_key(number);
        match self.get_cached(Family::NumberToHash, &key)? {
            Some(bytes) if bytes.len() == 32 => Ok(Some(B256::from_slice(&bytes))),
            Some(_) | None => Ok(None),
        }
    }

    /// The named iterator heads, empty if the `heads` key is absent.
    pub fn get_heads(&self) -> Result<BTreeMap<String, B256>, ChainStoreError> {
        match self.store.get(keys::heads_key())? {
            Some(bytes) => {
                let raw: BTreeMap<String, String> = serde_json::from_slice(&bytes)
                    .map_err(|e| ChainStoreError::InvalidConfig(format!("corrupt heads map: {e}")))?;
                let mut out = BTreeMap::new();
                for (name, hex) in raw {
                    let hash = hex
                        .parse::<B256>()
                        .map_err(|e| ChainStoreError::InvalidConfig(format!("corrupt head hash: {e}")))?;
                    out.insert(name, hash);
                }
                Ok(out)
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// The current `headHeader` hash.
    pub fn get_head_header(&self) -> Result<Option<B256>, ChainStoreError> {
        Ok(self.store.get(keys::head_header_key())?.map(|b| B256::from_slice(&b)))
    }

    /// The current `headBlock` hash.
    pub fn get_head_block(&self) -> Result<Option<B256>, ChainStoreError> {
        Ok(self.store.get(keys::head_block_key())?.map(|b| B256::from_slice(&b)))
    }

    /// Atomically applies `batch` to the store, then applies `cache_update`
    /// only once the store write has committed.
    pub fn commit(&self, batch: WriteBatch, cache_update: CacheUpdate) -> Result<(), ChainStoreError> {
        self.store.write(batch)?;
        self.cache.apply(cache_update);
        Ok(())
    }
}

/// Serializes a [`Header`] into the bytes persisted at a `header` key:
/// `be8(parent_hash_len=32) parent_hash difficulty(32 BE) chain_id(8 BE) raw`.
pub(crate) fn encode_header(header: &Header) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 32 + 8 + header.raw.len());
    out.extend_from_slice(header.parent_hash.as_slice());
    out.extend_from_slice(&header.difficulty.to_be_bytes::<32>());
    out.extend_from_slice(&header.chain_id.to_be_bytes());
    out.extend_from_slice(&header.raw);
    out
}

fn decode_header(hash: B256, number: BlockNumber, bytes: &[u8]) -> Result<Header, ChainStoreError> {
    if bytes.len() < 32 + 32 + 8 {
        return Err(ChainStoreError::InvalidConfig("corrupt header envelope".into()));
    }
    let parent_hash = B256::from_slice(&bytes[0..32]);
    let difficulty = U256::from_be_slice(&bytes[32..64]);
    let mut chain_id_buf = [0u8; 8];
    chain_id_buf.copy_from_slice(&bytes[64..72]);
    let chain_id = u64::from_be_bytes(chain_id_buf);
    let raw = Bytes::copy_from_slice(&bytes[72..]);
    Ok(Header { hash, parent_hash, number, difficulty, chain_id, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemStore;
    use crate::types::Body;

    fn sample_header(number: u64, hash: B256, parent: B256) -> Header {
        Header {
            hash,
            parent_hash: parent,
            number,
            difficulty: U256::from(100u64),
            chain_id: 1,
            raw: Bytes::from_static(b"raw-header-bytes"),
        }
    }

    #[test]
    fn header_round_trips_through_store() {
        let db = DbManager::new(MemStore::shared(), 16);
        let hash = B256::repeat_byte(1);
        let parent = B256::repeat_byte(0);
        let header = sample_header(1, hash, parent);

        let mut batch = WriteBatch::new();
        batch.put(keys::header_key(1, hash), encode_header(&header));
        let mut cache_update = CacheUpdate::new();
        cache_update.put(Family::Header, keys::header_key(1, hash), encode_header(&header));
        db.commit(batch, cache_update).unwrap();

        let got = db.get_header(1, hash).unwrap().unwrap();
        assert_eq!(got, header);
    }

    #[test]
    fn missing_header_is_none() {
        let db = DbManager::new(MemStore::shared(), 16);
        assert!(db.get_header(1, B256::repeat_byte(9)).unwrap().is_none());
    }

    #[test]
    fn body_empty_detection_round_trips() {
        let db = DbManager::new(MemStore::shared(), 16);
        let hash = B256::repeat_byte(2);
        let body = Body::empty();

        let mut batch = WriteBatch::new();
        batch.put(keys::body_key(1, hash), body.raw.to_vec());
        db.commit(batch, CacheUpdate::new()).unwrap();

        let got = db.get_body(1, hash).unwrap().unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn heads_map_round_trips_as_json() {
        let db = DbManager::new(MemStore::shared(), 16);
        let mut map = BTreeMap::new();
        map.insert("vm".to_string(), B256::repeat_byte(3));
        let as_hex: BTreeMap<String, String> =
            map.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
        let bytes = serde_json::to_vec(&as_hex).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(keys::heads_key().to_vec(), bytes);
        db.commit(batch, CacheUpdate::new()).unwrap();

        assert_eq!(db.get_heads().unwrap(), map);
    }
}
