//! Persistent storage for an Ethereum-style blockchain.
//!
//! This crate implements the core of a persistent blockchain store: it
//! ingests block headers and full blocks, persists them in an ordered
//! key-value store, and maintains a canonical chain selected by highest
//! accumulated proof-of-work difficulty.
//!
//! Block and header RLP encode/decode, proof-of-work verification, and
//! chain-parameter lookup are treated as external collaborators,
//! referenced only through the traits in [`collab`]. The underlying
//! ordered key-value store is itself a collaborator — see [`kv::KvStore`]
//! — with an in-memory default and an optional `sled`-backed
//! implementation behind the `sled-backend` feature.
//!
//! ## Capabilities
//!
//! - Persist headers and full blocks, selecting the canonical chain by
//!   cumulative difficulty
//! - Reorganise the canonical chain when a higher-difficulty alternative
//!   arrives, fixing up named iterator cursors as it does
//! - Delete a block and cascade through its canonical descendants
//! - Drive a named, crash-resumable iterator over the canonical chain

pub mod cache;
pub mod chain;
pub mod collab;
pub mod db;
pub mod error;
pub mod keys;
pub mod kv;
mod metrics;
pub mod store;
pub mod sync;
pub mod types;

pub use chain::ChainCore;
pub use collab::{AcceptAllPow, BlockValidator, ChainSpec, PermissiveValidator, PowVerifier};
pub use error::{ChainStoreError, StoreError};
#[cfg(feature = "sled-backend")]
pub use kv::SledStore;
pub use kv::{KvStore, MemStore, WriteBatch};
pub use store::{ChainStore, ChainStoreBuilder};
pub use types::{Block, BlockId, BlockNumber, Body, ChainItem, Header, TotalDifficulty};
