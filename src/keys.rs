//! Pure functions computing the binary keys used in the key-value store.
//!
//! The byte layout is fixed to match the widely used Ethereum
//! "Geth-compatible" database format — see the open question recorded in
//! `DESIGN.md` about confirming these bytes against a reference database.

use crate::error::ChainStoreError;
use crate::types::BlockNumber;
use alloy_primitives::B256;

const HEADER_PREFIX: u8 = b'h';
const BODY_PREFIX: u8 = b'b';
const NUMBER_TO_HASH_PREFIX: u8 = b'n';
const NUMBER_TO_HASH_SUFFIX: u8 = b'n';
const HASH_TO_NUMBER_PREFIX: u8 = b'H';
const TD_SUFFIX: u8 = b't';

const HEAD_HEADER_KEY: &[u8] = b"LastHeader";
const HEAD_BLOCK_KEY: &[u8] = b"LastBlock";
const HEADS_KEY: &[u8] = b"heads";

/// Encodes a block number as 8 bytes big-endian. Every `BlockNumber` is a
/// `u64` so this never fails at the type level; [`ChainStoreError::OutOfRange`]
/// exists for callers converting from a wider external representation
/// (e.g. `alloy_primitives::U256`) before it reaches this codec.
pub fn buf_be8(n: BlockNumber) -> [u8; 8] {
    n.to_be_bytes()
}

/// Converts an arbitrary-width external block number into a [`BlockNumber`],
/// failing if it does not fit in 8 bytes big-endian.
pub fn checked_block_number(n: alloy_primitives::U256) -> Result<BlockNumber, ChainStoreError> {
    u64::try_from(n).map_err(|_| ChainStoreError::OutOfRange(u128::from_le_bytes(
        n.to_le_bytes::<32>()[..16].try_into().unwrap(),
    )))
}

/// `'h' ++ be8(number) ++ hash`
pub fn header_key(number: BlockNumber, hash: B256) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + 8 + 32);
    k.push(HEADER_PREFIX);
    k.extend_from_slice(&buf_be8(number));
    k.extend_from_slice(hash.as_slice());
    k
}

/// `'b' ++ be8(number) ++ hash`
pub fn body_key(number: BlockNumber, hash: B256) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + 8 + 32);
    k.push(BODY_PREFIX);
    k.extend_from_slice(&buf_be8(number));
    k.extend_from_slice(hash.as_slice());
    k
}

/// `'h' ++ be8(number) ++ hash ++ 't'`
pub fn td_key(number: BlockNumber, hash: B256) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + 8 + 32 + 1);
    k.push(HEADER_PREFIX);
    k.extend_from_slice(&buf_be8(number));
    k.extend_from_slice(hash.as_slice());
    k.push(TD_SUFFIX);
    k
}

/// `'n' ++ be8(number) ++ 'n'`
pub fn number_to_hash_key(number: BlockNumber) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + 8 + 1);
    k.push(NUMBER_TO_HASH_PREFIX);
    k.extend_from_slice(&buf_be8(number));
    k.push(NUMBER_TO_HASH_SUFFIX);
    k
}

/// `'H' ++ hash`
pub fn hash_to_number_key(hash: B256) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + 32);
    k.push(HASH_TO_NUMBER_PREFIX);
    k.extend_from_slice(hash.as_slice());
    k
}

/// The fixed key under which `headHeader`'s hash is stored.
pub fn head_header_key() -> &'static [u8] {
    HEAD_HEADER_KEY
}

/// The fixed key under which `headBlock`'s hash is stored.
pub fn head_block_key() -> &'static [u8] {
    HEAD_BLOCK_KEY
}

/// The fixed key under which the JSON-encoded `heads` map is stored.
pub fn heads_key() -> &'static [u8] {
    HEADS_KEY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> B256 {
        B256::repeat_byte(byte)
    }

    #[test]
    fn header_key_layout() {
        let k = header_key(7, h(0xab));
        assert_eq!(k[0], b'h');
        assert_eq!(&k[1..9], &7u64.to_be_bytes());
        assert_eq!(&k[9..41], h(0xab).as_slice());
        assert_eq!(k.len(), 41);
    }

    #[test]
    fn body_key_layout() {
        let k = body_key(7, h(0xab));
        assert_eq!(k[0], b'b');
        assert_eq!(k.len(), 41);
    }

    #[test]
    fn td_key_layout() {
        let k = td_key(7, h(0xab));
        assert_eq!(k[0], b'h');
        assert_eq!(*k.last().unwrap(), b't');
        assert_eq!(k.len(), 42);
    }

    #[test]
    fn number_to_hash_key_layout() {
        let k = number_to_hash_key(42);
        assert_eq!(k[0], b'n');
        assert_eq!(&k[1..9], &42u64.to_be_bytes());
        assert_eq!(*k.last().unwrap(), b'n');
        assert_eq!(k.len(), 10);
    }

    #[test]
    fn hash_to_number_key_layout() {
        let k = hash_to_number_key(h(0xcd));
        assert_eq!(k[0], b'H');
        assert_eq!(&k[1..], h(0xcd).as_slice());
        assert_eq!(k.len(), 33);
    }

    #[test]
    fn fixed_keys_match_expected_strings() {
        assert_eq!(head_header_key(), b"LastHeader");
        assert_eq!(head_block_key(), b"LastBlock");
        assert_eq!(heads_key(), b"heads");
    }

    #[test]
    fn header_and_body_keys_share_prefix_up_to_family_byte() {
        let n = 100;
        let hash = h(0x11);
        assert_eq!(&header_key(n, hash)[1..], &body_key(n, hash)[1..]);
    }
}
