//! Collaborator seams the core consumes.
//!
//! These are contracts only; the store, the mempool policy and the VM are
//! external. The core talks to them through `Arc<dyn …>` handles threaded in
//! at construction.

use crate::error::ConsensusError;
use cadence_account::{AccountLoader, AccountManager};
use cadence_types::{
    AccountData, Address, Block, BlockHeader, ChangeLog, DeputyNode, Hash, SignData, Transaction,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure inside a collaborator the core cannot interpret further.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl From<StoreError> for ConsensusError {
    fn from(err: StoreError) -> Self {
        ConsensusError::Store(err.0)
    }
}

/// Everything transaction execution produced for one block.
#[derive(Debug, Clone, Default)]
pub struct TxsProduct {
    /// Transactions actually applied, in block order.
    pub txs: Vec<Transaction>,
    pub gas_used: u64,
    /// Change logs as of the end of transaction execution. The assembler
    /// refreshes this after finalisation adds reward and refund logs.
    pub change_logs: Vec<ChangeLog>,
    /// Version root as of the last finalisation.
    pub version_root: Hash,
}

/// The block/account store. Persistence layout is the implementor's choice.
pub trait Store: AccountLoader + Send + Sync {
    /// Look up a block by hash, on any branch.
    fn block(&self, hash: &Hash) -> Option<Block>;

    /// Look up the canonical-chain block at `height`.
    fn block_by_height(&self, height: u32) -> Option<Block>;

    /// All known blocks at `height`, canonical and fork, above stable.
    fn blocks_at_height(&self, height: u32) -> Vec<Block>;

    /// Persist a block.
    fn put_block(&self, block: Block) -> Result<(), StoreError>;

    /// Replace a stored block's confirm set.
    fn update_confirms(&self, hash: &Hash, confirms: Vec<SignData>) -> Result<(), StoreError>;

    /// Mark a block stable.
    fn set_stable(&self, hash: &Hash) -> Result<(), StoreError>;

    /// The current stable block.
    fn stable(&self) -> Block;

    /// Persist finalised account state.
    fn commit_accounts(&self, accounts: &[AccountData]) -> Result<(), StoreError>;

    /// Contract code by hash.
    fn contract_code(&self, hash: &Hash) -> Option<Vec<u8>>;
}

/// Adapter exposing a [`Store`] handle as an [`AccountLoader`].
#[derive(Clone)]
pub struct StoreLoader(pub Arc<dyn Store>);

impl AccountLoader for StoreLoader {
    fn load_account(&self, addr: Address) -> Option<AccountData> {
        self.0.load_account(addr)
    }
}

/// Drives transaction execution against the account engine.
pub trait TxProcessor: Send + Sync {
    /// Re-execute a received block's transactions. Any invalid transaction
    /// fails the whole block.
    fn apply(
        &self,
        header: &BlockHeader,
        txs: &[Transaction],
        am: &mut AccountManager,
    ) -> Result<TxsProduct, ConsensusError>;

    /// Execute candidate transactions while mining, best-effort: invalid
    /// transactions land in the rejected list, execution stops at the
    /// deadline or when `cancel` is raised — always at a transaction
    /// boundary, never mid-transaction. Unprocessed candidates are simply
    /// left out.
    fn apply_candidates(
        &self,
        header: &BlockHeader,
        txs: Vec<Transaction>,
        am: &mut AccountManager,
        deadline: Option<Instant>,
        cancel: &AtomicBool,
    ) -> (TxsProduct, Vec<Transaction>);

    /// Run a read-only call against current state; nothing is journalled
    /// past the call's own lifetime. `timeout` bounds VM execution; trivial
    /// processors may ignore it.
    fn pre_execute(
        &self,
        am: &mut AccountManager,
        header: &BlockHeader,
        to: Address,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(Vec<u8>, u64), ConsensusError>;
}

/// The transaction pool, as seen from the core.
pub trait TxPool: Send + Sync {
    /// Candidate transactions valid at `time`, at most `size` of them.
    fn pending(&self, time: u32, size: usize) -> Vec<Transaction>;

    /// Offer a transaction to the pool; returns whether it was accepted.
    fn add_tx(&self, tx: Transaction) -> bool;

    /// Pool-level admission check over a received block's transactions
    /// (duplicates, double-spends across pending blocks).
    fn block_is_valid(&self, block: &Block) -> bool;

    /// A block joined the canonical chain; drop its transactions.
    fn on_block(&self, block: &Block);

    /// A block left the canonical chain; recycle its transactions.
    fn on_prune(&self, block: &Block);
}

/// Supplies committee candidates and deposit refunds from the vote tally.
pub trait CandidateLoader: Send + Sync {
    /// The ranked top candidates as of the snapshot parent state.
    fn load_top(&self, snapshot_parent: &Hash) -> Vec<DeputyNode>;

    /// Candidates that unregistered during the closing term and are owed
    /// their deposit back at `height`.
    fn load_refunds(&self, height: u32) -> Result<Vec<Address>, StoreError>;
}
