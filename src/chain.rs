//! The algorithmic heart: canonical-chain selection, reorganisation,
//! iterator-head bookkeeping, and deletion cascades. Consumes
//! [`DbManager`] directly; serialisation against concurrent mutations is
//! the caller's responsibility (see [`crate::sync::WriteSerializer`]):
//! `ChainCore` is the pipeline that runs *inside* a held write slot.
//!
//! `deleteStaleAssignments`, `rebuildCanonical` and `delChild` are
//! implemented as iterative loops over explicit work lists rather than
//! recursively.

use crate::cache::{CacheUpdate, Family};
use crate::collab::{BlockValidator, PowVerifier};
use crate::db::{encode_header, DbManager};
use crate::error::ChainStoreError;
use crate::keys;
use crate::kv::WriteBatch;
use crate::types::{Block, BlockId, BlockNumber, Body, ChainItem, Header};
use alloy_primitives::{B256, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The canonical-chain selection, reorganisation and deletion engine.
pub struct ChainCore {
    db: Arc<DbManager>,
    chain_id: u64,
    validate: bool,
    pow: Arc<dyn PowVerifier>,
    validator: Arc<dyn BlockValidator>,
}

/// Mutable state threaded through a single put or delete pipeline: the
/// accumulating write batch, the cache updates staged alongside it, and
/// the in-flight view of the three head singletons plus the named
/// iterator heads. Replaces the callback-pyramid control flow the
/// original algorithm used with a linear pipeline over one small record.
struct MutationContext {
    batch: WriteBatch,
    cache: CacheUpdate,
    heads: BTreeMap<String, B256>,
    head_header: B256,
    head_block: B256,
}

impl ChainCore {
    /// Wraps `db` with the chain id and collaborators the put/delete
    /// pipelines consult.
    pub fn new(
        db: Arc<DbManager>,
        chain_id: u64,
        validate: bool,
        pow: Arc<dyn PowVerifier>,
        validator: Arc<dyn BlockValidator>,
    ) -> Self {
        Self { db, chain_id, validate, pow, validator }
    }

    fn load_context(&self) -> Result<MutationContext, ChainStoreError> {
        Ok(MutationContext {
            batch: WriteBatch::new(),
            cache: CacheUpdate::new(),
            heads: self.db.get_heads()?,
            head_header: self.db.get_head_header()?.ok_or(ChainStoreError::NotFound)?,
            head_block: self.db.get_head_block()?.ok_or(ChainStoreError::NotFound)?,
        })
    }

    /// Seeds an empty store with `genesis`, used by [`crate::sync::InitGate`]
    /// when `numberToHash(0)` does not yet exist.
    pub fn put_genesis(&self, genesis: Block) -> Result<(), ChainStoreError> {
        let mut ctx = MutationContext {
            batch: WriteBatch::new(),
            cache: CacheUpdate::new(),
            heads: BTreeMap::new(),
            head_header: genesis.hash(),
            head_block: genesis.hash(),
        };
        self.write_block_keys(&mut ctx, &ChainItem::Block(genesis.clone()));
        self.write_td(&mut ctx, &genesis.header, genesis.header.difficulty);
        self.rebuild_canonical(&mut ctx, &genesis.header)?;
        self.persist_heads(&mut ctx)?;
        self.db.commit(ctx.batch, ctx.cache)
    }

    /// Entry point for `putBlock`/`putHeader`. `is_genesis` is `true` only
    /// for the very first block a store ever sees; see
    /// [`ChainCore::put_genesis`] for that path.
    pub fn put_block_or_header(&self, item: ChainItem, is_genesis: bool) -> Result<(), ChainStoreError> {
        let header = item.header().clone();

        if header.chain_id != self.chain_id {
            return Err(ChainStoreError::ChainMismatch { expected: self.chain_id, actual: header.chain_id });
        }

        if self.validate {
            if header.is_genesis() && !is_genesis {
                return Err(ChainStoreError::AlreadyHaveGenesis);
            }
            if !is_genesis {
                let parent = self
                    .db
                    .get_header(header.number - 1, header.parent_hash)?
                    .ok_or(ChainStoreError::ParentMissing { number: header.number })?;
                self.validator.validate(&item, &parent).map_err(|reason| {
                    warn!(
                        target: "chainstore::chain",
                        number = header.number,
                        hash = %header.hash,
                        %reason,
                        "rejecting block: structural validation failed"
                    );
                    ChainStoreError::InvalidBlock(reason)
                })?;
            }
            if !self.pow.verify(&item) {
                warn!(
                    target: "chainstore::chain",
                    number = header.number,
                    hash = %header.hash,
                    "rejecting block: proof-of-work verification failed"
                );
                return Err(ChainStoreError::InvalidPoW);
            }
        }

        let mut ctx = self.load_context()?;

        let (current_header_td, current_block_td) = if is_genesis {
            (U256::ZERO, U256::ZERO)
        } else {
            let header_number = self
                .db
                .hash_to_number(ctx.head_header)?
                .ok_or(ChainStoreError::NotFound)?;
            let block_number = self
                .db
                .hash_to_number(ctx.head_block)?
                .ok_or(ChainStoreError::NotFound)?;
            let header_td = self
                .db
                .get_td(header_number, ctx.head_header)?
                .ok_or(ChainStoreError::NotFound)?;
            let block_td = self
                .db
                .get_td(block_number, ctx.head_block)?
                .ok_or(ChainStoreError::NotFound)?;
            (header_td, block_td)
        };

        let block_td = if is_genesis {
            header.difficulty
        } else {
            let parent_td = self
                .db
                .get_td(header.number - 1, header.parent_hash)?
                .ok_or(ChainStoreError::ParentMissing { number: header.number })?;
            parent_td + header.difficulty
        };

        self.write_block_keys(&mut ctx, &item);
        self.write_td(&mut ctx, &header, block_td);

        let wins_header = is_genesis || block_td > current_header_td;
        if wins_header {
            let previous_head = ctx.head_header;
            let is_reorg = !is_genesis && previous_head != header.parent_hash;
            if is_reorg {
                warn!(
                    target: "chainstore::chain",
                    number = header.number,
                    new_head = %header.hash,
                    old_head = %previous_head,
                    "reorg start: accepted header does not extend the current head"
                );
            }

            ctx.head_header = header.hash;
            if item.has_body() {
                ctx.head_block = header.hash;
            }
            self.delete_stale_assignments(&mut ctx, header.number + 1, header.hash)?;
            self.rebuild_canonical(&mut ctx, &header)?;

            if is_reorg {
                debug!(
                    target: "chainstore::chain",
                    number = header.number,
                    new_head = %header.hash,
                    "reorg stop: canonical chain rebuilt"
                );
            }
        } else {
            if item.has_body() && block_td > current_block_td {
                ctx.head_block = header.hash;
            }
            let key = keys::hash_to_number_key(header.hash);
            ctx.batch.put(key.clone(), keys::buf_be8(header.number).to_vec());
            ctx.cache.put(Family::HashToNumber, key, keys::buf_be8(header.number).to_vec());
        }

        self.persist_heads(&mut ctx)?;
        self.db.commit(ctx.batch, ctx.cache)
    }

    fn write_td(&self, ctx: &mut MutationContext, header: &Header, td: U256) {
        let key = keys::td_key(header.number, header.hash);
        let value = td.to_be_bytes::<32>().to_vec();
        ctx.batch.put(key.clone(), value.clone());
        ctx.cache.put(Family::Td, key, value);
    }

    fn write_block_keys(&self, ctx: &mut MutationContext, item: &ChainItem) {
        let header = item.header();
        let header_key = keys::header_key(header.number, header.hash);
        let encoded = encode_header(header);
        ctx.batch.put(header_key.clone(), encoded.clone());
        ctx.cache.put(Family::Header, header_key, encoded);

        // A full-block put always writes a body key, even when the block
        // genuinely has none; a header-only put never does.
        if let Some(body) = item.body() {
            self.write_body(ctx, header.number, header.hash, body);
        }
    }

    fn write_body(&self, ctx: &mut MutationContext, number: BlockNumber, hash: B256, body: &Body) {
        let key = keys::body_key(number, hash);
        let value = body.raw.to_vec();
        ctx.batch.put(key.clone(), value.clone());
        ctx.cache.put(Family::Body, key, value);
    }

    fn persist_heads(&self, ctx: &mut MutationContext) -> Result<(), ChainStoreError> {
        ctx.batch.put(keys::head_header_key().to_vec(), ctx.head_header.as_slice().to_vec());
        ctx.batch.put(keys::head_block_key().to_vec(), ctx.head_block.as_slice().to_vec());
        ctx.batch.put(keys::heads_key().to_vec(), encode_heads(&ctx.heads)?);
        Ok(())
    }

    /// Walks forward from `start_number` while `numberToHash` entries
    /// exist, dropping each and redirecting any iterator head or
    /// `headBlock` that pointed at the now-stale hash.
    fn delete_stale_assignments(
        &self,
        ctx: &mut MutationContext,
        start_number: BlockNumber,
        new_head_hash: B256,
    ) -> Result<(), ChainStoreError> {
        let mut number = start_number;
        loop {
            let stale_hash = match self.db.number_to_hash(number)? {
                Some(h) => h,
                None => break,
            };

            let key = keys::number_to_hash_key(number);
            ctx.batch.delete(key.clone());
            ctx.cache.remove(Family::NumberToHash, key);
            debug!(
                target: "chainstore::chain",
                number,
                stale_hash = %stale_hash,
                "stale assignment: numberToHash entry dropped"
            );

            for (name, hash) in ctx.heads.iter_mut() {
                if *hash == stale_hash {
                    warn!(
                        target: "chainstore::chain",
                        head = %name,
                        from = %stale_hash,
                        to = %new_head_hash,
                        "stale assignment: redirecting iterator head off a reorged block"
                    );
                    *hash = new_head_hash;
                }
            }
            if ctx.head_block == stale_hash {
                ctx.head_block = new_head_hash;
            }

            number += 1;
        }
        Ok(())
    }

    /// Walks the newly accepted chain backward from `top`, writing
    /// `numberToHash`/`hashToNumber` until it reaches an ancestor that is
    /// already canonical (or genesis), then applies any iterator-head /
    /// `headBlock` redirections accumulated along the way.
    fn rebuild_canonical(&self, ctx: &mut MutationContext, top: &Header) -> Result<(), ChainStoreError> {
        let mut current_hash = top.hash;
        let mut current_number = top.number;
        let mut current_parent_hash = top.parent_hash;

        let mut stale_head_names = Vec::new();
        let mut head_block_flagged = false;

        loop {
            let existing = self.db.number_to_hash(current_number)?;

            if existing == Some(current_hash) {
                break;
            }

            self.write_number_hash_mapping(ctx, current_number, current_hash);

            if let Some(stale_hash) = existing {
                for (name, hash) in ctx.heads.iter() {
                    if *hash == stale_hash {
                        stale_head_names.push(name.clone());
                    }
                }
                if ctx.head_block == stale_hash {
                    head_block_flagged = true;
                }
            }

            if current_number == 0 {
                break;
            }

            let parent = self
                .db
                .get_header(current_number - 1, current_parent_hash)?
                .ok_or(ChainStoreError::BrokenChain { number: current_number - 1 })?;

            current_hash = current_parent_hash;
            current_number -= 1;
            current_parent_hash = parent.parent_hash;
        }

        for name in stale_head_names {
            warn!(
                target: "chainstore::chain",
                head = %name,
                new_head = %top.hash,
                "reorg fix-up: snapping iterator head to the accepted top"
            );
            ctx.heads.insert(name, top.hash);
        }
        if head_block_flagged {
            debug!(
                target: "chainstore::chain",
                new_head = %top.hash,
                "reorg fix-up: headBlock flagged stale, snapped to the accepted top"
            );
            ctx.head_block = top.hash;
        }

        Ok(())
    }

    fn write_number_hash_mapping(&self, ctx: &mut MutationContext, number: BlockNumber, hash: B256) {
        let n2h = keys::number_to_hash_key(number);
        ctx.batch.put(n2h.clone(), hash.as_slice().to_vec());
        ctx.cache.put(Family::NumberToHash, n2h, hash.as_slice().to_vec());

        let h2n = keys::hash_to_number_key(hash);
        let value = keys::buf_be8(number).to_vec();
        ctx.batch.put(h2n.clone(), value.clone());
        ctx.cache.put(Family::HashToNumber, h2n, value);
    }

    /// Deletes `hash` and, if it was canonical, cascades forward through
    /// its canonical descendants before fixing up the `numberToHash`
    /// entries those descendants left behind.
    pub fn delete_block(&self, hash: B256) -> Result<(), ChainStoreError> {
        let number = self.db.hash_to_number(hash)?.ok_or(ChainStoreError::NotFound)?;
        let header = self.db.get_header(number, hash)?.ok_or(ChainStoreError::NotFound)?;

        let mut ctx = self.load_context()?;

        let canonical_hash = self.db.number_to_hash(number)?;
        let in_canonical = canonical_hash == Some(hash);
        let redirect = if in_canonical { Some(header.parent_hash) } else { None };

        let mut cur_hash = hash;
        let mut cur_number = number;
        loop {
            self.delete_block_keys(&mut ctx, cur_number, cur_hash);

            let Some(new_head) = redirect else { break };

            if ctx.head_header == cur_hash {
                ctx.head_header = new_head;
            }
            if ctx.head_block == cur_hash {
                ctx.head_block = new_head;
            }

            match self.db.number_to_hash(cur_number + 1)? {
                Some(child_hash) => {
                    cur_hash = child_hash;
                    cur_number += 1;
                }
                None => break,
            }
        }

        if in_canonical {
            self.delete_stale_assignments(&mut ctx, number, header.parent_hash)?;
        }

        self.persist_heads(&mut ctx)?;
        self.db.commit(ctx.batch, ctx.cache)
    }

    fn delete_block_keys(&self, ctx: &mut MutationContext, number: BlockNumber, hash: B256) {
        let header_key = keys::header_key(number, hash);
        ctx.batch.delete(header_key.clone());
        ctx.cache.remove(Family::Header, header_key);

        let body_key = keys::body_key(number, hash);
        ctx.batch.delete(body_key.clone());
        ctx.cache.remove(Family::Body, body_key);

        let h2n = keys::hash_to_number_key(hash);
        ctx.batch.delete(h2n.clone());
        ctx.cache.remove(Family::HashToNumber, h2n);

        let td_key = keys::td_key(number, hash);
        ctx.batch.delete(td_key.clone());
        ctx.cache.remove(Family::Td, td_key);
    }

    /// Resolves `id` to a full [`Block`], composing header and body.
    pub fn get_block(&self, id: BlockId) -> Result<Block, ChainStoreError> {
        let (number, hash) = self.resolve_id(id)?;
        let header = self.db.get_header(number, hash)?.ok_or(ChainStoreError::NotFound)?;
        let body = self.db.get_body(number, hash)?;
        match body {
            Some(body) => Ok(Block { header, body }),
            None if header.is_genesis() => Ok(Block { header, body: Body::empty() }),
            None => Err(ChainStoreError::BodyMissing { number }),
        }
    }

    fn resolve_id(&self, id: BlockId) -> Result<(BlockNumber, B256), ChainStoreError> {
        match id {
            BlockId::Hash(hash) => {
                let number = self.db.hash_to_number(hash)?.ok_or(ChainStoreError::NotFound)?;
                Ok((number, hash))
            }
            BlockId::Number(number) => {
                let hash = self.db.number_to_hash(number)?.ok_or(ChainStoreError::NotFound)?;
                Ok((number, hash))
            }
        }
    }

    /// Drives `on_block` forward from the named iterator's last position,
    /// persisting the advanced head only once the walk terminates
    /// (naturally, on a gap, or on callback failure).
    pub fn iterator<E>(
        &self,
        name: &str,
        mut on_block: impl FnMut(&Block, bool) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<ChainStoreError>,
    {
        let mut ctx = self.load_context()?;

        let genesis_hash = self.db.number_to_hash(0)?.ok_or(ChainStoreError::NotFound)?;
        let start_hash = ctx.heads.get(name).copied().unwrap_or(genesis_hash);
        let start_number = self.db.hash_to_number(start_hash)?.ok_or(ChainStoreError::NotFound)?;

        let mut last_block = self.get_block(BlockId::Hash(start_hash)).ok();
        let mut number = start_number + 1;
        let mut callback_err: Option<E> = None;

        loop {
            let block = match self.get_block(BlockId::Number(number)) {
                Ok(block) => block,
                Err(ChainStoreError::NotFound) => break,
                Err(e) => {
                    callback_err = Some(e.into());
                    break;
                }
            };

            ctx.heads.insert(name.to_string(), block.hash());
            let reorg = last_block
                .as_ref()
                .map(|lb| lb.hash() != block.header.parent_hash)
                .unwrap_or(false);

            if let Err(e) = on_block(&block, reorg) {
                callback_err = Some(e);
                break;
            }

            last_block = Some(block);
            number += 1;
        }

        // Heads already reflect every block successfully handed to
        // `on_block`, plus the one it failed on (the head advances before
        // the callback runs). Persist that state regardless of how the
        // walk ended, then surface any callback failure.
        self.persist_heads(&mut ctx)?;
        self.db.commit(ctx.batch, ctx.cache)?;

        match callback_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `hashes` is presumed oldest-first along some chain; returns the
    /// suffix starting at the first hash this store does not already know
    /// about.
    pub fn select_needed_hashes(&self, hashes: &[B256]) -> Result<Vec<B256>, ChainStoreError> {
        let mut lo = 0usize;
        let mut hi = hashes.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.db.hash_to_number(hashes[mid])?.is_some() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(hashes[lo..].to_vec())
    }

    /// Traverses backward by number from `start`, skipping `skip`
    /// intermediaries between yielded blocks, stopping at `max_blocks` or
    /// the first gap.
    pub fn get_blocks(
        &self,
        start: BlockId,
        skip: u64,
        max_blocks: usize,
    ) -> Result<Vec<Block>, ChainStoreError> {
        let (mut number, _) = self.resolve_id(start)?;
        let mut out = Vec::new();
        let step = skip + 1;

        loop {
            if out.len() >= max_blocks {
                break;
            }
            match self.get_block(BlockId::Number(number)) {
                Ok(block) => out.push(block),
                Err(ChainStoreError::NotFound) => break,
                Err(e) => return Err(e),
            }
            if number < step {
                break;
            }
            number -= step;
        }

        Ok(out)
    }
}

fn encode_heads(heads: &BTreeMap<String, B256>) -> Result<Vec<u8>, ChainStoreError> {
    let as_hex: BTreeMap<&String, String> = heads.iter().map(|(k, v)| (k, v.to_string())).collect();
    serde_json::to_vec(&as_hex).map_err(|e| ChainStoreError::InvalidConfig(format!("heads encode: {e}")))
}
