use thiserror::Error;

/// Errors produced by the chain store.
///
/// This enum is returned from every fallible public operation.
#[derive(Debug, Error, Clone)]
pub enum ChainStoreError {
    /// Initialisation could not complete. Terminal for the instance: every
    /// later operation on the same store reports this same error.
    #[error("chain store initialisation failed: {0}")]
    InitFailed(String),

    /// The item's chain id differs from the store's configured chain id.
    #[error("chain id mismatch: expected {expected}, got {actual}")]
    ChainMismatch {
        /// Chain id the store was configured with.
        expected: u64,
        /// Chain id carried by the rejected item.
        actual: u64,
    },

    /// Structural validation of a block or header failed.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Proof-of-work verification failed.
    #[error("invalid proof of work")]
    InvalidPoW,

    /// The parent header or its total difficulty is absent.
    #[error("parent missing for block at number {number}")]
    ParentMissing {
        /// Number of the block whose parent is missing.
        number: u64,
    },

    /// The parent header was absent while walking the canonical chain
    /// backward during a reorg.
    #[error("broken chain: missing ancestor at number {number}")]
    BrokenChain {
        /// Number of the missing ancestor.
        number: u64,
    },

    /// The requested header, body, block, TD or lookup does not exist.
    /// Not fatal: reported verbatim to the caller.
    #[error("not found")]
    NotFound,

    /// A body was required but is absent for a block that is not genesis.
    #[error("body missing for block at number {number}")]
    BodyMissing {
        /// Number of the block whose body is missing.
        number: u64,
    },

    /// A non-genesis put claimed to be genesis.
    #[error("already have genesis")]
    AlreadyHaveGenesis,

    /// A block number does not fit the 8-byte big-endian encoding.
    #[error("block number {0} out of range")]
    OutOfRange(u128),

    /// The underlying key-value store failed.
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// A cache or in-memory store lock was poisoned by a panicking holder.
    #[error("lock poisoned")]
    LockPoisoned,

    /// The store was constructed with an invalid combination of options.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PartialEq for ChainStoreError {
    fn eq(&self, other: &Self) -> bool {
        use ChainStoreError::*;
        match (self, other) {
            (InitFailed(a), InitFailed(b)) => a == b,
            (ChainMismatch { expected: ea, actual: aa }, ChainMismatch { expected: eb, actual: ab }) => {
                ea == eb && aa == ab
            }
            (InvalidBlock(a), InvalidBlock(b)) => a == b,
            (InvalidPoW, InvalidPoW) => true,
            (ParentMissing { number: a }, ParentMissing { number: b }) => a == b,
            (BrokenChain { number: a }, BrokenChain { number: b }) => a == b,
            (NotFound, NotFound) => true,
            (BodyMissing { number: a }, BodyMissing { number: b }) => a == b,
            (AlreadyHaveGenesis, AlreadyHaveGenesis) => true,
            (OutOfRange(a), OutOfRange(b)) => a == b,
            (StoreError(a), StoreError(b)) => a == b,
            (LockPoisoned, LockPoisoned) => true,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ChainStoreError {}

/// Error surfaced by a [`crate::kv::KvStore`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend reported an I/O or encoding failure.
    #[error("backend error: {0}")]
    Backend(String),
}
