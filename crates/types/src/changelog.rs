//! Typed account mutation records with undo/redo.
//!
//! Every state change a block makes is captured as a [`ChangeLog`] carrying
//! the value before and after. Replaying `new_val` (redo) rebuilds state from
//! history; replaying `old_val` (undo) unwinds speculative execution. The
//! `version` field forms a dense per-`(address, log_type)` sequence within a
//! block, which is what makes both directions checkable.

use crate::account::AccountWriter;
use crate::address::Address;
use crate::hash::{hash_of, Hash};
use crate::merkle::merkle_root;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The kind of account mutation a change log records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u32)]
pub enum ChangeLogType {
    Balance = 1,
    Storage = 2,
    StorageRoot = 3,
    Code = 4,
    Suicide = 5,
    Votes = 6,
    VoteFor = 7,
    Candidate = 8,
    CandidateState = 9,
}

impl ChangeLogType {
    /// Stable numeric tag used for deterministic sorting.
    pub fn tag(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for ChangeLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeLogType::Balance => "BalanceLog",
            ChangeLogType::Storage => "StorageLog",
            ChangeLogType::StorageRoot => "StorageRootLog",
            ChangeLogType::Code => "CodeLog",
            ChangeLogType::Suicide => "SuicideLog",
            ChangeLogType::Votes => "VotesLog",
            ChangeLogType::VoteFor => "VoteForLog",
            ChangeLogType::Candidate => "CandidateLog",
            ChangeLogType::CandidateState => "CandidateStateLog",
        };
        f.write_str(name)
    }
}

/// A value carried by a change log. Which variant is legal depends on the
/// log type; [`ChangeLog::redo`]/[`ChangeLog::undo`] enforce the pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogValue {
    #[default]
    None,
    Amount(u128),
    Bytes(Vec<u8>),
    Hash(Hash),
    Address(Address),
    Bool(bool),
    Text(String),
    Profile(BTreeMap<String, String>),
}

/// Mismatched value variant for a log type: the journal is corrupt.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{log_type} cannot apply value {value:?}")]
pub struct ChangeLogError {
    pub log_type: ChangeLogType,
    pub value: LogValue,
}

/// One typed account mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub log_type: ChangeLogType,
    pub address: Address,
    /// Dense per-(address, log_type) sequence number within a block.
    pub version: u32,
    pub old_val: LogValue,
    pub new_val: LogValue,
    /// Sub-key for keyed mutations: the storage slot (`Hash`) for
    /// `Storage`, the profile key (`Text`) for `CandidateState`.
    pub extra: LogValue,
}

impl ChangeLog {
    /// Content hash, used as the log-root Merkle leaf.
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }

    /// Sort key for deterministic replay: log type first, then version.
    pub fn sort_key(&self) -> (u32, u32) {
        (self.log_type.tag(), self.version)
    }

    /// Apply the post-state value to the account.
    pub fn redo(&self, account: &mut dyn AccountWriter) -> Result<(), ChangeLogError> {
        self.apply(&self.new_val, account)
    }

    /// Apply the pre-state value to the account, unwinding this log.
    pub fn undo(&self, account: &mut dyn AccountWriter) -> Result<(), ChangeLogError> {
        self.apply(&self.old_val, account)
    }

    fn apply(
        &self,
        value: &LogValue,
        account: &mut dyn AccountWriter,
    ) -> Result<(), ChangeLogError> {
        match (self.log_type, value) {
            (ChangeLogType::Balance, LogValue::Amount(balance)) => {
                account.set_balance(*balance);
            }
            (ChangeLogType::Storage, stored) => {
                let key = match &self.extra {
                    LogValue::Hash(key) => *key,
                    _ => return Err(self.mismatch(self.extra.clone())),
                };
                match stored {
                    LogValue::Bytes(bytes) => {
                        account.set_storage_state(key, Some(bytes.clone()))
                    }
                    LogValue::None => account.set_storage_state(key, None),
                    other => return Err(self.mismatch(other.clone())),
                }
            }
            (ChangeLogType::StorageRoot, LogValue::Hash(root)) => {
                account.set_storage_root(*root);
            }
            (ChangeLogType::Code, LogValue::Bytes(code)) => {
                account.set_code(code.clone());
            }
            (ChangeLogType::Code, LogValue::None) => {
                account.set_code(Vec::new());
            }
            (ChangeLogType::Suicide, LogValue::Bool(suicide)) => {
                account.set_suicide(*suicide);
            }
            (ChangeLogType::Votes, LogValue::Amount(votes)) => {
                account.set_votes(*votes);
            }
            (ChangeLogType::VoteFor, LogValue::Address(addr)) => {
                account.set_vote_for(*addr);
            }
            (ChangeLogType::Candidate, LogValue::Profile(profile)) => {
                account.set_candidate_profile(profile.clone());
            }
            (ChangeLogType::Candidate, LogValue::None) => {
                account.set_candidate_profile(BTreeMap::new());
            }
            (ChangeLogType::CandidateState, stored) => {
                let key = match &self.extra {
                    LogValue::Text(key) => key.clone(),
                    _ => return Err(self.mismatch(self.extra.clone())),
                };
                match stored {
                    LogValue::Text(text) => {
                        account.set_candidate_state(key, Some(text.clone()))
                    }
                    LogValue::None => account.set_candidate_state(key, None),
                    other => return Err(self.mismatch(other.clone())),
                }
            }
            (_, other) => return Err(self.mismatch(other.clone())),
        }
        Ok(())
    }

    fn mismatch(&self, value: LogValue) -> ChangeLogError {
        ChangeLogError {
            log_type: self.log_type,
            value,
        }
    }
}

/// Merkle root over an ordered list of change logs, as carried in headers.
pub fn change_log_root(logs: &[ChangeLog]) -> Hash {
    let leaves: Vec<Hash> = logs.iter().map(ChangeLog::hash).collect();
    merkle_root(&leaves)
}
