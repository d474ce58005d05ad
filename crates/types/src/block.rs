//! Blocks and confirm messages.

use crate::address::Address;
use crate::changelog::ChangeLog;
use crate::crypto::SignData;
use crate::deputy::DeputyNode;
use crate::hash::Hash;
use crate::header::BlockHeader;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A full block: header plus body lists.
///
/// `confirms` never contains the miner's own signature; the miner's
/// `sign_data` in the header counts toward quorum separately.
/// `deputies` is present only on snapshot blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    pub change_logs: Vec<ChangeLog>,
    pub confirms: Vec<SignData>,
    pub deputies: Option<Vec<DeputyNode>>,
}

impl Block {
    pub fn new(header: BlockHeader, txs: Vec<Transaction>, change_logs: Vec<ChangeLog>) -> Block {
        Block {
            header,
            txs,
            change_logs,
            confirms: Vec::new(),
            deputies: None,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    pub fn miner_address(&self) -> Address {
        self.header.miner_address
    }

    pub fn time(&self) -> u32 {
        self.header.time
    }

    /// Whether `sig` already counts toward this block's quorum, either as
    /// the miner signature or an accepted confirm.
    pub fn is_confirm_exist(&self, sig: &SignData) -> bool {
        self.header.sign_data == *sig || self.confirms.contains(sig)
    }

    /// Quorum signers so far: accepted confirms plus the miner.
    pub fn signer_count(&self) -> usize {
        self.confirms.len() + 1
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.height(), self.hash())
    }
}

/// A committee member's signature over a block hash, contributing to
/// finality. Arrives out of order and possibly before the block itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmData {
    pub hash: Hash,
    pub height: u32,
    pub sign_data: SignData,
}
