//! The ordered key-value store boundary.
//!
//! The underlying store engine is an external collaborator referenced
//! only by interface. [`KvStore`] is that interface; [`MemStore`] is the
//! default in-process implementation used by tests and by callers who
//! don't need durability, and [`SledStore`] (behind the `sled-backend`
//! feature) is an optional persistent backend.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single write operation within a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum KvOp {
    /// Insert or overwrite `key` with `value`.
    Put {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove `key`, if present.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
}

/// An ordered sequence of [`KvOp`]s applied atomically by a [`KvStore`]
/// implementation: all operations land or none do.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<KvOp>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put operation.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(KvOp::Put { key, value });
    }

    /// Appends a delete operation.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(KvOp::Delete { key });
    }

    /// True if no operations have been staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The staged operations, in the order they were appended.
    pub fn ops(&self) -> &[KvOp] {
        &self.ops
    }
}

/// The ordered key-value store engine boundary.
///
/// Implementations are responsible for atomicity of [`KvStore::write`]:
/// either every operation in the batch is applied, or none are. The rest
/// of the crate's concurrency model relies on that guarantee.
pub trait KvStore: Send + Sync + fmt::Debug {
    /// Looks up `key`, returning `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Applies `batch` atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Default in-memory [`KvStore`], backed by an ordered map behind a lock.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: parking_lot::RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh store in an `Arc`, the form [`crate::store::ChainStore`]
    /// expects.
    pub fn shared() -> Arc<dyn KvStore> {
        Arc::new(Self::new())
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        for op in batch.ops {
            match op {
                KvOp::Put { key, value } => {
                    guard.insert(key, value);
                }
                KvOp::Delete { key } => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Optional `sled`-backed [`KvStore`], grounded on `alpenlabs-alpen`'s
/// `strata-db-store-sled` crate, which backs a typed store trait the same
/// way: a single `sled::Db` handle, with an explicit flush after every
/// batch so atomicity is visible at the call site rather than hidden in a
/// background thread.
#[cfg(feature = "sled-backend")]
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
}

#[cfg(feature = "sled-backend")]
impl SledStore {
    /// Opens (or creates) a sled database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled-backend")]
impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut sled_batch = sled::Batch::default();
        for op in batch.ops {
            match op {
                KvOp::Put { key, value } => sled_batch.insert(key, value),
                KvOp::Delete { key } => sled_batch.remove(key),
            }
        }
        self.db
            .apply_batch(sled_batch)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.db.flush().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
