//! External collaborator boundaries.
//!
//! Proof-of-work verification, structural block validation, and
//! chain-parameter/genesis lookup are out of scope for the core; these
//! traits are the interfaces the core consumes instead of implementing
//! that logic itself.

use crate::types::{Block, ChainItem, Header};

/// Verifies proof-of-work for a candidate item. The core delegates to this
/// trait rather than implementing any PoW algorithm itself.
pub trait PowVerifier: Send + Sync {
    /// Returns `true` if `item` carries valid proof-of-work.
    fn verify(&self, item: &ChainItem) -> bool;
}

/// Accepts every item's proof-of-work unchanged. The default when a
/// caller has not supplied a real verifier (PoW math is explicitly out of
/// scope for this crate).
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllPow;

impl PowVerifier for AcceptAllPow {
    fn verify(&self, _item: &ChainItem) -> bool {
        true
    }
}

/// Performs structural validation of a block or header against its
/// declared parent (header fields, uncle well-formedness, monotonic
/// timestamps). The core delegates to this trait rather than hard-coding
/// any particular chain's rules.
pub trait BlockValidator: Send + Sync {
    /// Validates `item` against its `parent`, returning an error message
    /// on failure.
    fn validate(&self, item: &ChainItem, parent: &Header) -> Result<(), String>;
}

/// Accepts every structurally-presented item. The default when a caller
/// has not supplied chain-specific validation rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveValidator;

impl BlockValidator for PermissiveValidator {
    fn validate(&self, _item: &ChainItem, _parent: &Header) -> Result<(), String> {
        Ok(())
    }
}

/// Chain parameters: the chain id the core enforces, and the genesis
/// block it seeds the store with on first initialisation. Genesis
/// construction itself is external — the core only ever sees the
/// resulting block.
pub trait ChainSpec: Send + Sync {
    /// The chain id every persisted item must carry.
    fn chain_id(&self) -> u64;

    /// The genesis block to seed an empty store with.
    fn genesis(&self) -> Block;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, B256, U256};

    fn sample_header() -> Header {
        Header {
            hash: B256::repeat_byte(1),
            parent_hash: B256::ZERO,
            number: 0,
            difficulty: U256::from(1u64),
            chain_id: 1,
            raw: Bytes::new(),
        }
    }

    #[test]
    fn accept_all_pow_always_passes() {
        let item = ChainItem::Header(sample_header());
        assert!(AcceptAllPow.verify(&item));
    }

    #[test]
    fn permissive_validator_always_passes() {
        let header = sample_header();
        let item = ChainItem::Header(header.clone());
        assert!(PermissiveValidator.validate(&item, &header).is_ok());
    }
}
