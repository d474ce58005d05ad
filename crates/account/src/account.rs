//! In-memory account view with uncommitted overlays.

use cadence_types::{
    AccountData, AccountReader, AccountWriter, Address, ChangeLogType, Hash, VersionRecord,
};
use std::collections::{BTreeMap, HashMap};

/// One account's working copy during block execution.
///
/// Base versions (`newest_records`) only move in `set_version`, which the
/// manager calls when a block commits; everything else is overlay state the
/// journal can wind back.
#[derive(Debug, Clone)]
pub struct Account {
    data: AccountData,
    code: Vec<u8>,
    /// Touched storage slots. `None` marks a deletion.
    storage: HashMap<Hash, Option<Vec<u8>>>,
    suicide: bool,
}

impl Account {
    pub(crate) fn from_data(data: AccountData) -> Account {
        Account {
            data,
            code: Vec::new(),
            storage: HashMap::new(),
            suicide: false,
        }
    }

    pub(crate) fn fresh(address: Address) -> Account {
        Account::from_data(AccountData::empty(address))
    }

    /// The persistable snapshot of this account.
    pub fn data(&self) -> &AccountData {
        &self.data
    }

    /// Whether any storage slot was touched during this block.
    pub(crate) fn storage_touched(&self) -> bool {
        !self.storage.is_empty()
    }

    /// Touched slots in deterministic key order.
    pub(crate) fn storage_entries(&self) -> Vec<(Hash, Option<Vec<u8>>)> {
        let mut entries: Vec<_> = self
            .storage
            .iter()
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }
}

impl AccountReader for Account {
    fn address(&self) -> Address {
        self.data.address
    }

    fn balance(&self) -> u128 {
        self.data.balance
    }

    fn code_hash(&self) -> Hash {
        self.data.code_hash
    }

    fn code(&self) -> &[u8] {
        &self.code
    }

    fn storage_root(&self) -> Hash {
        self.data.storage_root
    }

    fn storage_state(&self, key: &Hash) -> Option<&[u8]> {
        match self.storage.get(key) {
            Some(Some(bytes)) => Some(bytes.as_slice()),
            Some(None) => None,
            None => None,
        }
    }

    fn votes(&self) -> u128 {
        self.data.votes
    }

    fn vote_for(&self) -> Address {
        self.data.vote_for
    }

    fn candidate_profile(&self) -> &BTreeMap<String, String> {
        &self.data.candidate_profile
    }

    fn suicide(&self) -> bool {
        self.suicide
    }

    fn base_version(&self, log_type: ChangeLogType) -> u32 {
        self.data.base_version(log_type)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AccountWriter for Account {
    fn set_balance(&mut self, balance: u128) {
        self.data.balance = balance;
    }

    fn set_code(&mut self, code: Vec<u8>) {
        self.data.code_hash = if code.is_empty() {
            Hash::ZERO
        } else {
            cadence_types::keccak256(&code)
        };
        self.code = code;
    }

    fn set_storage_root(&mut self, root: Hash) {
        self.data.storage_root = root;
    }

    fn set_storage_state(&mut self, key: Hash, value: Option<Vec<u8>>) {
        self.storage.insert(key, value);
    }

    fn set_suicide(&mut self, suicide: bool) {
        self.suicide = suicide;
    }

    fn set_votes(&mut self, votes: u128) {
        self.data.votes = votes;
    }

    fn set_vote_for(&mut self, addr: Address) {
        self.data.vote_for = addr;
    }

    fn set_candidate_profile(&mut self, profile: BTreeMap<String, String>) {
        self.data.candidate_profile = profile;
    }

    fn set_candidate_state(&mut self, key: String, value: Option<String>) {
        match value {
            Some(text) => self.data.candidate_profile.insert(key, text),
            None => self.data.candidate_profile.remove(&key),
        };
    }

    fn set_version(&mut self, log_type: ChangeLogType, version: u32, height: u32) {
        self.data
            .newest_records
            .insert(log_type, VersionRecord { version, height });
    }
}
