//! Persisted account state and the capability traits mutations go through.

use crate::address::Address;
use crate::changelog::ChangeLogType;
use crate::hash::Hash;
use crate::merkle::EMPTY_TRIE_HASH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The newest committed change-log version of one type, and the block height
/// that committed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub height: u32,
}

/// Consensus representation of an account, as persisted by the store.
///
/// `newest_records` holds the committed base version per change-log type;
/// mid-block versions live only in the journal and are folded in here when a
/// block commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub address: Address,
    pub balance: u128,
    pub code_hash: Hash,
    pub storage_root: Hash,
    pub votes: u128,
    pub vote_for: Address,
    pub candidate_profile: BTreeMap<String, String>,
    pub newest_records: BTreeMap<ChangeLogType, VersionRecord>,
}

impl AccountData {
    /// A fresh, empty account at `address`.
    pub fn empty(address: Address) -> AccountData {
        AccountData {
            address,
            balance: 0,
            code_hash: Hash::ZERO,
            storage_root: EMPTY_TRIE_HASH,
            votes: 0,
            vote_for: Address::ZERO,
            candidate_profile: BTreeMap::new(),
            newest_records: BTreeMap::new(),
        }
    }

    /// Committed base version for one change-log type (0 when untouched).
    pub fn base_version(&self, log_type: ChangeLogType) -> u32 {
        self.newest_records
            .get(&log_type)
            .map(|record| record.version)
            .unwrap_or(0)
    }

    /// True when nothing distinguishes this account from a never-used one.
    pub fn is_empty(&self) -> bool {
        self.balance == 0
            && self.votes == 0
            && self.code_hash == Hash::ZERO
            && self.storage_root == EMPTY_TRIE_HASH
            && self.vote_for.is_zero()
            && self.candidate_profile.is_empty()
            && self.newest_records.is_empty()
    }
}

/// Read capability over one account. The VM-facing surface: everything a
/// transaction executor may inspect.
pub trait AccountReader {
    fn address(&self) -> Address;
    fn balance(&self) -> u128;
    fn code_hash(&self) -> Hash;
    fn code(&self) -> &[u8];
    fn storage_root(&self) -> Hash;
    fn storage_state(&self, key: &Hash) -> Option<&[u8]>;
    fn votes(&self) -> u128;
    fn vote_for(&self) -> Address;
    fn candidate_profile(&self) -> &BTreeMap<String, String>;
    fn suicide(&self) -> bool;
    fn base_version(&self, log_type: ChangeLogType) -> u32;
    fn is_empty(&self) -> bool;

    fn candidate_state(&self, key: &str) -> Option<&str> {
        self.candidate_profile().get(key).map(String::as_str)
    }
}

/// Write capability over one account. Change-log undo/redo and the journal
/// apply mutations exclusively through this trait; it never reaches the VM.
pub trait AccountWriter: AccountReader {
    fn set_balance(&mut self, balance: u128);
    fn set_code(&mut self, code: Vec<u8>);
    fn set_storage_root(&mut self, root: Hash);
    fn set_storage_state(&mut self, key: Hash, value: Option<Vec<u8>>);
    fn set_suicide(&mut self, suicide: bool);
    fn set_votes(&mut self, votes: u128);
    fn set_vote_for(&mut self, addr: Address);
    fn set_candidate_profile(&mut self, profile: BTreeMap<String, String>);
    fn set_candidate_state(&mut self, key: String, value: Option<String>);
    fn set_version(&mut self, log_type: ChangeLogType, version: u32, height: u32);
}
