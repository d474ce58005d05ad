//! Consensus core: validation, assembly and finality.
//!
//! This crate turns an ordered stream of signed blocks into local chain
//! state:
//!
//! - [`Validator`]: pure verification of headers, slot timing, signers,
//!   roots, committee snapshots and equivocation
//! - [`BlockAssembler`]: drives transaction execution, handles term rewards
//!   and deposit refunds, seals normal and snapshot blocks
//! - [`ConfirmCache`] / [`BlockCache`] / [`FinalityTracker`]: buffer
//!   out-of-order confirms and orphan blocks, promote blocks to stable
//! - Collaborator traits ([`Store`], [`TxProcessor`], [`TxPool`],
//!   [`CandidateLoader`]): the seams to storage, execution and the mempool
//!
//! The components here perform no I/O of their own beyond the collaborator
//! traits and never block on the network.

mod assembler;
mod cache;
mod error;
mod finality;
mod reward;
mod traits;
mod transfer;
mod validator;

pub use assembler::BlockAssembler;
pub use cache::{BlockCache, ConfirmCache};
pub use error::{BlockIssue, ConsensusError, HeaderIssue};
pub use finality::FinalityTracker;
pub use reward::{
    calculate_salaries, encode_reward_table, load_term_reward, reward_storage_key, DeputySalary,
};
pub use traits::{
    CandidateLoader, Store, StoreError, StoreLoader, TxPool, TxProcessor, TxsProduct,
};
pub use transfer::TransferProcessor;
pub use validator::Validator;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
