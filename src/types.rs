//! Domain types: headers, bodies, blocks, and the tagged item ChainCore
//! operates on.

use crate::error::ChainStoreError;
use crate::keys;
use alloy_primitives::{Bytes, B256, U256};

/// A block number. Ethereum block numbers are non-negative and the key
/// layout encodes them in 8 bytes big-endian; values beyond `u64::MAX`
/// cannot be persisted ([`crate::error::ChainStoreError::OutOfRange`]).
pub type BlockNumber = u64;

/// Cumulative proof-of-work difficulty from genesis to a given block,
/// inclusive.
pub type TotalDifficulty = U256;

/// The canonical empty RLP encoding of `[[], []]` — an empty transaction
/// list paired with an empty uncle list. A body this short is treated as
/// "empty" for the purpose of deciding whether a body key should exist.
pub const EMPTY_BODY_RAW: [u8; 3] = [0xc2, 0xc0, 0xc0];

/// An Ethereum-style block header.
///
/// `raw` is the exact encoded bytes handed in by the caller's RLP layer
/// and is persisted byte-exact; the remaining fields are the ones the
/// canonical-chain algorithm needs extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Hash of this header, content-addressed over `raw`.
    pub hash: B256,
    /// Hash of the parent header.
    pub parent_hash: B256,
    /// Block number.
    pub number: BlockNumber,
    /// This block's own difficulty (not cumulative).
    pub difficulty: U256,
    /// The chain id this header was produced for.
    pub chain_id: u64,
    /// Exact encoded header bytes, preserved byte-for-byte.
    pub raw: Bytes,
}

impl Header {
    /// True if this header has no parent, i.e. it is the genesis header.
    pub fn is_genesis(&self) -> bool {
        self.number == 0
    }

    /// Builds a header from a decoder's wide `number` representation
    /// (RLP integers are arbitrary-precision), narrowing it to the 64-bit
    /// [`BlockNumber`] this crate persists. The real ingestion path for
    /// headers coming off an external RLP layer; [`ChainStoreError::OutOfRange`]
    /// surfaces a block number this store cannot encode.
    pub fn from_wide_number(
        hash: B256,
        parent_hash: B256,
        number: U256,
        difficulty: U256,
        chain_id: u64,
        raw: Bytes,
    ) -> Result<Self, ChainStoreError> {
        let number = keys::checked_block_number(number)?;
        Ok(Self { hash, parent_hash, number, difficulty, chain_id, raw })
    }
}

/// An Ethereum-style block body (transactions + uncles), opaque beyond
/// knowing whether it encodes the empty list pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Exact encoded body bytes, preserved byte-for-byte.
    pub raw: Bytes,
}

impl Body {
    /// An empty body: no transactions, no uncles.
    pub fn empty() -> Self {
        Self { raw: Bytes::from_static(&EMPTY_BODY_RAW) }
    }

    /// True if this body encodes the empty transaction/uncle list pair.
    pub fn is_empty(&self) -> bool {
        self.raw.as_ref() == EMPTY_BODY_RAW
    }
}

/// A full block: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The block's header.
    pub header: Header,
    /// The block's body.
    pub body: Body,
}

impl Block {
    /// Convenience accessor mirroring [`Header::hash`].
    pub fn hash(&self) -> B256 {
        self.header.hash
    }

    /// Convenience accessor mirroring [`Header::number`].
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }
}

/// Addresses a block either by hash or by canonical number, the two forms
/// accepted by `getBlock`/`getBlocks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    /// Address by content hash.
    Hash(B256),
    /// Address by canonical chain position.
    Number(BlockNumber),
}

/// An item accepted by the put path: either a standalone header or a full
/// block. Header-only puts never write a body key; full-block puts always
/// do, synthesizing [`Body::empty`] when the block genuinely has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainItem {
    /// A full block: header, TD, and body keys are all written.
    Block(Block),
    /// A standalone header: only header, TD, and index keys are written.
    Header(Header),
}

impl ChainItem {
    /// The header shared by both variants.
    pub fn header(&self) -> &Header {
        match self {
            ChainItem::Block(b) => &b.header,
            ChainItem::Header(h) => h,
        }
    }

    /// True if this item carries a body (i.e. is a full block).
    pub fn has_body(&self) -> bool {
        matches!(self, ChainItem::Block(_))
    }

    /// The body to persist, if this item carries one.
    pub fn body(&self) -> Option<&Body> {
        match self {
            ChainItem::Block(b) => Some(&b.body),
            ChainItem::Header(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_wide_number_narrows_a_representable_value() {
        let header = Header::from_wide_number(
            B256::repeat_byte(1),
            B256::ZERO,
            U256::from(42u64),
            U256::from(10u64),
            1,
            Bytes::from_static(b"raw"),
        )
        .unwrap();
        assert_eq!(header.number, 42);
    }

    #[test]
    fn from_wide_number_rejects_a_number_past_u64() {
        let too_big = U256::from(u64::MAX) + U256::from(1u64);
        let err = Header::from_wide_number(
            B256::repeat_byte(1),
            B256::ZERO,
            too_big,
            U256::from(10u64),
            1,
            Bytes::from_static(b"raw"),
        )
        .unwrap_err();
        assert!(matches!(err, ChainStoreError::OutOfRange(_)));
    }
}
