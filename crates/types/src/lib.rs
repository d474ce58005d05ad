//! Core types for the Cadence consensus core.
//!
//! This crate provides the foundational types used throughout the chain-replay
//! implementation:
//!
//! - **Primitives**: [`Hash`], [`Address`], [`NodeId`], recoverable signatures
//! - **Consensus types**: [`BlockHeader`], [`Block`], [`ConfirmData`], [`DeputyNode`]
//! - **State types**: [`AccountData`], [`ChangeLog`] with undo/redo, contract [`Event`]
//! - **Transactions**: the transfer payload and its rejection errors
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crates, making it the foundation layer. Account state is only visible here
//! through the narrow [`AccountReader`]/[`AccountWriter`] capability traits;
//! concrete account storage lives above.

mod account;
mod address;
mod block;
mod changelog;
mod crypto;
mod deputy;
mod event;
mod hash;
mod header;
mod merkle;
mod params;
mod transaction;

pub use account::{AccountData, AccountReader, AccountWriter, VersionRecord};
pub use address::{Address, NodeId};
pub use block::{Block, ConfirmData};
pub use changelog::{change_log_root, ChangeLog, ChangeLogError, ChangeLogType, LogValue};
pub use crypto::{CryptoError, KeyPair, SignData};
pub use deputy::{
    check_committee, deputy_root, CandidateNode, DeputyError, DeputyNode, KEY_DEPOSIT_AMOUNT,
    KEY_INCOME_ADDRESS, KEY_IS_CANDIDATE,
};
pub use event::Event;
pub use hash::{keccak256, Hash};
pub use header::BlockHeader;
pub use merkle::{merkle_root, EMPTY_TRIE_HASH};
pub use params::ChainParams;
pub use transaction::{tx_root, Transaction, TxError};

/// Canonical byte encoding used for hash preimages and Merkle leaves.
///
/// Everything that contributes to a content hash goes through this single
/// entry point so two nodes always hash identical bytes.
pub fn canonical_encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    // bincode on plain data structures cannot fail; the types hashed here
    // contain no floats, untagged enums or non-string map keys.
    bincode::serialize(value).unwrap_or_default()
}

/// Test utilities shared by the workspace test suites.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Deterministic keypair from a seed byte. An all-zero scalar is invalid
    /// for secp256k1, so the seed lands in the last byte of a fixed pattern.
    pub fn test_keypair(seed: u8) -> KeyPair {
        let mut secret = [0x11u8; 32];
        secret[31] = seed.wrapping_add(1);
        KeyPair::from_secret_bytes(&secret).expect("test secret is a valid scalar")
    }

    /// A test address with a recognisable byte pattern.
    pub fn test_address(seed: u8) -> Address {
        Address([seed; 20])
    }

    /// A test hash with a recognisable byte pattern.
    pub fn test_hash(seed: u8) -> Hash {
        Hash([seed; 32])
    }

    /// Build a deputy for the given rank whose node id matches `keypair`.
    pub fn test_deputy(keypair: &KeyPair, rank: u16, votes: u128) -> DeputyNode {
        DeputyNode {
            miner_address: keypair.node_id().address(),
            income_address: None,
            node_id: keypair.node_id(),
            rank,
            votes,
        }
    }
}
