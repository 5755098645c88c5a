//! The public surface: construction, configuration, and the operations
//! `putBlock`, `putHeader`, `putBlocks`, `putHeaders`, `getBlock`,
//! `getBlocks`, `getHead`, `getLatestHeader`, `getLatestBlock`, `delBlock`,
//! `iterator`, and `selectNeededHashes`.
//!
//! Construction is a builder over a chain identifier or chain-parameter
//! object, an optional hardfork tag, an optional KV store handle, and a
//! validation flag.

use crate::chain::ChainCore;
use crate::collab::{AcceptAllPow, BlockValidator, ChainSpec, PermissiveValidator, PowVerifier};
use crate::db::DbManager;
use crate::error::ChainStoreError;
use crate::kv::{KvStore, MemStore, WriteBatch};
use crate::metrics::Metrics;
use crate::sync::{InitGate, WriteSerializer};
use crate::types::{Block, BlockId, ChainItem, Header};
use alloy_primitives::B256;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Builds a [`ChainStore`] from a chain identifier or chain-parameter
/// object (mutually exclusive), an optional hardfork identifier, an
/// optional KV store handle, and a validation flag.
pub struct ChainStoreBuilder {
    chain_id: Option<u64>,
    chain_spec: Option<Arc<dyn ChainSpec>>,
    hardfork: Option<String>,
    kv_store: Option<Arc<dyn KvStore>>,
    validate: bool,
    pow_verifier: Arc<dyn PowVerifier>,
    block_validator: Arc<dyn BlockValidator>,
    metrics_enabled: bool,
    cache_capacity: usize,
}

impl Default for ChainStoreBuilder {
    fn default() -> Self {
        Self {
            chain_id: None,
            chain_spec: None,
            hardfork: None,
            kv_store: None,
            validate: true,
            pow_verifier: Arc::new(AcceptAllPow),
            block_validator: Arc::new(PermissiveValidator),
            metrics_enabled: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ChainStoreBuilder {
    /// Starts a builder with every option at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store with a bare chain id. A trivial [`ChainSpec`]
    /// is synthesized whose genesis is the zero header at difficulty 1;
    /// callers that need a real genesis should use
    /// [`ChainStoreBuilder::chain_spec`] instead.
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Configures the store with a full chain-parameter object, whose
    /// genesis block seeds an empty store. Mutually exclusive with
    /// [`ChainStoreBuilder::chain_id`].
    pub fn chain_spec(mut self, spec: Arc<dyn ChainSpec>) -> Self {
        self.chain_spec = Some(spec);
        self
    }

    /// An opaque hardfork identifier, threaded through to the chain spec
    /// if present. This crate does not interpret it: hardfork rule lookup
    /// is out of scope.
    pub fn hardfork(mut self, hardfork: impl Into<String>) -> Self {
        self.hardfork = Some(hardfork.into());
        self
    }

    /// Overrides the default in-memory [`KvStore`].
    pub fn kv_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.kv_store = Some(store);
        self
    }

    /// Enables or disables structural and proof-of-work validation on put.
    /// Default `true`.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Overrides the default permissive proof-of-work verifier.
    pub fn pow_verifier(mut self, verifier: Arc<dyn PowVerifier>) -> Self {
        self.pow_verifier = verifier;
        self
    }

    /// Overrides the default permissive block validator.
    pub fn block_validator(mut self, validator: Arc<dyn BlockValidator>) -> Self {
        self.block_validator = validator;
        self
    }

    /// Enables metrics instrumentation. Default `false`.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Overrides the per-family [`crate::cache::WriteCache`] capacity.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builds the store and runs initialisation to completion.
    pub async fn build(self) -> Result<ChainStore, ChainStoreError> {
        let chain_spec: Arc<dyn ChainSpec> = match (self.chain_id, self.chain_spec) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(ChainStoreError::InvalidConfig(
                    "exactly one of chain_id or chain_spec must be set".into(),
                ))
            }
            (Some(id), None) => Arc::new(DefaultChainSpec { chain_id: id }),
            (None, Some(spec)) => spec,
        };
        let _ = self.hardfork;

        let kv = self.kv_store.unwrap_or_else(MemStore::shared);
        let db = Arc::new(DbManager::new(kv, self.cache_capacity));
        let chain = Arc::new(ChainCore::new(
            db.clone(),
            chain_spec.chain_id(),
            self.validate,
            self.pow_verifier,
            self.block_validator,
        ));

        if self.metrics_enabled {
            Metrics::init(chain_spec.chain_id());
        }

        let init = InitGate::new();
        init.ready(|| async {
            tracing::debug!(target: "chainstore::init", "running chain store initialisation");
            initialise(&db, &chain, chain_spec.as_ref())
        })
        .await?;

        Ok(ChainStore {
            db,
            chain,
            chain_id: chain_spec.chain_id(),
            init,
            serializer: WriteSerializer::new(),
            metrics_enabled: self.metrics_enabled,
        })
    }
}

fn initialise(
    db: &Arc<DbManager>,
    chain: &Arc<ChainCore>,
    chain_spec: &dyn ChainSpec,
) -> Result<(), ChainStoreError> {
    match db.number_to_hash(0)? {
        Some(genesis_hash) => {
            let mut batch = WriteBatch::new();
            if db.get_head_header()?.is_none() {
                batch.put(crate::keys::head_header_key().to_vec(), genesis_hash.as_slice().to_vec());
            }
            if db.get_head_block()?.is_none() {
                batch.put(crate::keys::head_block_key().to_vec(), genesis_hash.as_slice().to_vec());
            }
            if !batch.is_empty() {
                db.commit(batch, crate::cache::CacheUpdate::new())?;
            }
            Ok(())
        }
        None => {
            tracing::debug!(target: "chainstore::init", "seeding empty store with genesis block");
            chain.put_genesis(chain_spec.genesis())
        }
    }
}

/// A minimal [`ChainSpec`] for callers that configured the store with a
/// bare chain id instead of a full chain-parameter object.
struct DefaultChainSpec {
    chain_id: u64,
}

impl ChainSpec for DefaultChainSpec {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn genesis(&self) -> Block {
        use alloy_primitives::{Bytes, U256};
        use crate::types::Body;

        let header = Header {
            hash: B256::ZERO,
            parent_hash: B256::ZERO,
            number: 0,
            difficulty: U256::from(1u64),
            chain_id: self.chain_id,
            raw: Bytes::new(),
        };
        Block { header, body: Body::empty() }
    }
}

/// The persistent chain store: the crate's public API.
pub struct ChainStore {
    db: Arc<DbManager>,
    chain: Arc<ChainCore>,
    chain_id: u64,
    init: InitGate,
    serializer: WriteSerializer,
    metrics_enabled: bool,
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore")
            .field("chain_id", &self.chain_id)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish_non_exhaustive()
    }
}

impl ChainStore {
    /// Starts building a store with [`ChainStoreBuilder`].
    pub fn builder() -> ChainStoreBuilder {
        ChainStoreBuilder::new()
    }

    /// Opens a store over a fresh default in-memory backend for the given
    /// chain id. Convenience wrapper around [`ChainStoreBuilder`].
    pub async fn open(chain_id: u64) -> Result<Self, ChainStoreError> {
        ChainStoreBuilder::new().chain_id(chain_id).build().await
    }

    async fn ensure_ready(&self) -> Result<(), ChainStoreError> {
        self.init.ready(|| async { Ok(()) }).await
    }

    fn observe<T>(&self, method: &'static str, f: impl FnOnce() -> Result<T, ChainStoreError>) -> Result<T, ChainStoreError> {
        if !self.metrics_enabled {
            return f();
        }
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed().as_secs_f64();
        let outcome = if result.is_ok() { Metrics::REQUESTS_SUCCESS_TOTAL } else { Metrics::REQUESTS_ERROR_TOTAL };
        metrics::counter!(outcome, "method" => method, "chain_id" => self.chain_id.to_string()).increment(1);
        metrics::histogram!(
            Metrics::REQUEST_DURATION_SECONDS,
            "method" => method,
            "chain_id" => self.chain_id.to_string()
        )
        .record(elapsed);
        result
    }

    /// Persists a full block.
    pub async fn put_block(&self, block: Block) -> Result<(), ChainStoreError> {
        self.ensure_ready().await?;
        let chain = self.chain.clone();
        self.serializer
            .locked_mutation(|| async move {
                self.observe(Metrics::METHOD_PUT_BLOCK, || {
                    chain.put_block_or_header(ChainItem::Block(block), false)
                })
            })
            .await
    }

    /// Persists a standalone header (no body key is ever written for a
    /// header-only put).
    pub async fn put_header(&self, header: Header) -> Result<(), ChainStoreError> {
        self.ensure_ready().await?;
        let chain = self.chain.clone();
        self.serializer
            .locked_mutation(|| async move {
                self.observe(Metrics::METHOD_PUT_HEADER, || {
                    chain.put_block_or_header(ChainItem::Header(header), false)
                })
            })
            .await
    }

    /// Persists `blocks` in order, stopping at the first failure.
    pub async fn put_blocks(&self, blocks: Vec<Block>) -> Result<(), ChainStoreError> {
        for block in blocks {
            self.put_block(block).await?;
        }
        Ok(())
    }

    /// Persists `headers` in order, stopping at the first failure.
    pub async fn put_headers(&self, headers: Vec<Header>) -> Result<(), ChainStoreError> {
        for header in headers {
            self.put_header(header).await?;
        }
        Ok(())
    }

    /// Resolves `id` to a full block.
    pub async fn get_block(&self, id: BlockId) -> Result<Block, ChainStoreError> {
        self.ensure_ready().await?;
        self.observe(Metrics::METHOD_GET_BLOCK, || self.chain.get_block(id))
    }

    /// Traverses backward by number from `start`.
    pub async fn get_blocks(&self, start: BlockId, skip: u64, max_blocks: usize) -> Result<Vec<Block>, ChainStoreError> {
        self.ensure_ready().await?;
        self.observe(Metrics::METHOD_GET_BLOCKS, || self.chain.get_blocks(start, skip, max_blocks))
    }

    /// The current `headHeader` hash.
    pub async fn get_head(&self) -> Result<B256, ChainStoreError> {
        self.ensure_ready().await?;
        self.observe(Metrics::METHOD_GET_HEAD, || {
            self.db.get_head_header()?.ok_or(ChainStoreError::NotFound)
        })
    }

    /// The header at the current `headHeader`.
    pub async fn get_latest_header(&self) -> Result<Header, ChainStoreError> {
        self.ensure_ready().await?;
        self.observe(Metrics::METHOD_GET_LATEST_HEADER, || {
            let hash = self.db.get_head_header()?.ok_or(ChainStoreError::NotFound)?;
            self.chain.get_block(BlockId::Hash(hash)).map(|b| b.header)
        })
    }

    /// The block at the current `headBlock`.
    pub async fn get_latest_block(&self) -> Result<Block, ChainStoreError> {
        self.ensure_ready().await?;
        self.observe(Metrics::METHOD_GET_LATEST_BLOCK, || {
            let hash = self.db.get_head_block()?.ok_or(ChainStoreError::NotFound)?;
            self.chain.get_block(BlockId::Hash(hash))
        })
    }

    /// Deletes `hash`, cascading through its canonical descendants if it
    /// was canonical.
    pub async fn del_block(&self, hash: B256) -> Result<(), ChainStoreError> {
        self.ensure_ready().await?;
        let chain = self.chain.clone();
        self.serializer
            .locked_mutation(|| async move { self.observe(Metrics::METHOD_DEL_BLOCK, || chain.delete_block(hash)) })
            .await
    }

    /// Drives `on_block` forward from the named iterator's last position.
    ///
    /// Acquires the write-serializer for the whole walk rather than just
    /// the final heads persist, trading finer lock granularity for a
    /// single code path; see `DESIGN.md`.
    pub async fn iterator<E>(&self, name: &str, on_block: impl FnMut(&Block, bool) -> Result<(), E>) -> Result<(), E>
    where
        E: From<ChainStoreError>,
    {
        self.ensure_ready().await.map_err(E::from)?;
        let chain = self.chain.clone();
        let name = name.to_string();
        self.serializer.locked_mutation(|| async move { chain.iterator(&name, on_block) }).await
    }

    /// Returns the suffix of `hashes` this store does not already know.
    pub async fn select_needed_hashes(&self, hashes: &[B256]) -> Result<Vec<B256>, ChainStoreError> {
        self.ensure_ready().await?;
        self.observe(Metrics::METHOD_SELECT_NEEDED_HASHES, || self.chain.select_needed_hashes(hashes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Body;

    fn child(number: u64, hash_byte: u8, parent: B256, difficulty: u64, chain_id: u64) -> Header {
        Header {
            hash: B256::repeat_byte(hash_byte),
            parent_hash: parent,
            number,
            difficulty: alloy_primitives::U256::from(difficulty),
            chain_id,
            raw: alloy_primitives::Bytes::from_static(b"h"),
        }
    }

    #[tokio::test]
    async fn opening_a_fresh_store_seeds_genesis() {
        let store = ChainStore::open(7).await.unwrap();
        let header = store.get_latest_header().await.unwrap();
        assert_eq!(header.number, 0);
        assert_eq!(header.chain_id, 7);
        assert_eq!(store.get_head().await.unwrap(), header.hash);
    }

    #[tokio::test]
    async fn builder_rejects_missing_chain_identity() {
        let err = ChainStoreBuilder::new().build().await.unwrap_err();
        assert!(matches!(err, ChainStoreError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn builder_rejects_both_chain_id_and_chain_spec() {
        struct Spec;
        impl ChainSpec for Spec {
            fn chain_id(&self) -> u64 {
                1
            }
            fn genesis(&self) -> Block {
                Block { header: child(0, 0, B256::ZERO, 1, 1), body: Body::empty() }
            }
        }

        let err = ChainStoreBuilder::new().chain_id(1).chain_spec(Arc::new(Spec)).build().await.unwrap_err();
        assert!(matches!(err, ChainStoreError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn put_block_then_get_block_round_trips() {
        let store = ChainStore::open(1).await.unwrap();
        let genesis_hash = store.get_head().await.unwrap();
        let header = child(1, 1, genesis_hash, 10, 1);
        let block = Block { header: header.clone(), body: Body::empty() };
        store.put_block(block.clone()).await.unwrap();

        let got = store.get_block(BlockId::Hash(header.hash)).await.unwrap();
        assert_eq!(got, block);
        assert_eq!(store.get_latest_block().await.unwrap().hash(), header.hash);
    }

    #[tokio::test]
    async fn put_header_never_writes_a_body() {
        let store = ChainStore::open(1).await.unwrap();
        let genesis_hash = store.get_head().await.unwrap();
        let header = child(1, 1, genesis_hash, 10, 1);
        store.put_header(header.clone()).await.unwrap();

        let err = store.get_block(BlockId::Hash(header.hash)).await.unwrap_err();
        assert!(matches!(err, ChainStoreError::BodyMissing { number: 1 }));
        assert_eq!(store.get_latest_header().await.unwrap().hash, header.hash);
    }

    #[tokio::test]
    async fn del_block_removes_it() {
        let store = ChainStore::open(1).await.unwrap();
        let genesis_hash = store.get_head().await.unwrap();
        let header = child(1, 1, genesis_hash, 10, 1);
        store.put_block(Block { header: header.clone(), body: Body::empty() }).await.unwrap();

        store.del_block(header.hash).await.unwrap();
        let err = store.get_block(BlockId::Hash(header.hash)).await.unwrap_err();
        assert!(matches!(err, ChainStoreError::NotFound));
    }

    #[tokio::test]
    async fn reopening_an_existing_backend_does_not_reseed_genesis() {
        let kv = MemStore::shared();
        let first = ChainStoreBuilder::new().chain_id(1).kv_store(kv.clone()).build().await.unwrap();
        let genesis_hash = first.get_head().await.unwrap();
        let header = child(1, 1, genesis_hash, 10, 1);
        first.put_block(Block { header: header.clone(), body: Body::empty() }).await.unwrap();
        drop(first);

        let reopened = ChainStoreBuilder::new().chain_id(1).kv_store(kv).build().await.unwrap();
        assert_eq!(reopened.get_head().await.unwrap(), header.hash);
    }

    #[tokio::test]
    async fn select_needed_hashes_round_trips_through_the_public_api() {
        let store = ChainStore::open(1).await.unwrap();
        let genesis_hash = store.get_head().await.unwrap();
        let header = child(1, 1, genesis_hash, 10, 1);
        store.put_block(Block { header: header.clone(), body: Body::empty() }).await.unwrap();

        let unknown = B256::repeat_byte(9);
        let needed = store.select_needed_hashes(&[genesis_hash, header.hash, unknown]).await.unwrap();
        assert_eq!(needed, vec![unknown]);
    }

    #[tokio::test]
    async fn iterator_advances_the_named_head_across_calls() {
        let store = ChainStore::open(1).await.unwrap();
        let genesis_hash = store.get_head().await.unwrap();
        let b1 = child(1, 1, genesis_hash, 10, 1);
        let b2 = child(2, 2, b1.hash, 10, 1);
        store.put_block(Block { header: b1.clone(), body: Body::empty() }).await.unwrap();
        store.put_block(Block { header: b2.clone(), body: Body::empty() }).await.unwrap();

        let mut seen = Vec::new();
        store
            .iterator::<ChainStoreError>("vm", |blk, _reorg| {
                seen.push(blk.number());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn metrics_can_be_enabled_without_a_global_recorder() {
        let store = ChainStoreBuilder::new().chain_id(1).metrics(true).build().await.unwrap();
        let genesis_hash = store.get_head().await.unwrap();
        let header = child(1, 1, genesis_hash, 10, 1);
        store.put_block(Block { header, body: Body::empty() }).await.unwrap();
    }
}
