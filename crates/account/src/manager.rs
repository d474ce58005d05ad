//! The mutation front door over the account set.
//!
//! Every write goes through a typed setter here, which assigns the next
//! journal version, records the old/new pair, applies the change to the
//! working copy and appends the log — in that order. `finalise()` turns the
//! accumulated journal into committed versions, storage roots and the block's
//! version root.

use crate::account::Account;
use crate::journal::{Journal, JournalError};
use crate::set::{AccountLoader, AccountSet};
use cadence_types::{
    keccak256, AccountReader, AccountWriter, Address, ChangeLog, ChangeLogType, Event, Hash,
    LogValue,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// State finalisation failures; surfaced to the caller as a rejected block.
#[derive(Debug, Error)]
pub enum StateError {
    /// Updating a derived root failed.
    #[error("trie update failed: {0}")]
    Trie(String),

    /// Journal corruption detected while finalising or rebuilding.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Account state manager for the span of one block's execution.
pub struct AccountManager {
    accounts: AccountSet,
    journal: Journal,
    /// Version root of the parent block; finalise chains from it.
    base_version_root: Hash,
    /// Height of the block being executed, stamped into version records.
    height: u32,
    /// Version root computed by the last `finalise()`.
    version_root: Hash,
}

impl AccountManager {
    /// Start a fresh manager over the parent block's state.
    pub fn new(loader: Arc<dyn AccountLoader>, base_version_root: Hash, height: u32) -> Self {
        AccountManager {
            accounts: AccountSet::new(loader),
            journal: Journal::new(),
            base_version_root,
            height,
            version_root: base_version_root,
        }
    }

    /// Read view of an account, loading it on first access.
    pub fn account(&mut self, addr: Address) -> &Account {
        self.accounts.account(addr)
    }

    /// Balance convenience read.
    pub fn balance(&mut self, addr: Address) -> u128 {
        self.accounts.account(addr).balance()
    }

    // ── Journal pass-throughs ──────────────────────────────────────────────

    /// Name the current journal position.
    pub fn snapshot(&mut self) -> u32 {
        self.journal.snapshot()
    }

    /// Undo everything since revision `id`.
    pub fn revert_to_snapshot(&mut self, id: u32) -> Result<(), JournalError> {
        self.journal.revert_to(id, &mut self.accounts)
    }

    /// Compact the journal tail starting at `from_index`.
    pub fn merge_change_logs(&mut self, from_index: usize) -> Result<(), JournalError> {
        self.journal.merge(from_index)
    }

    /// All change logs issued so far, in order.
    pub fn change_logs(&self) -> &[ChangeLog] {
        self.journal.logs()
    }

    /// Logs touching one account, in issue order.
    pub fn logs_by_address(&self, addr: Address) -> Vec<ChangeLog> {
        self.journal.logs_by_address(addr)
    }

    pub fn push_event(&mut self, event: Event) {
        self.journal.push_event(event);
    }

    pub fn pop_event(&mut self) -> Result<(), JournalError> {
        self.journal.pop_event()
    }

    pub fn events(&self) -> &[Event] {
        self.journal.events()
    }

    /// Replay an externally supplied log slice for one account and commit
    /// the resulting versions at this manager's height.
    pub fn rebuild(&mut self, addr: Address, logs: Vec<ChangeLog>) -> Result<(), StateError> {
        let newest = Journal::rebuild(addr, logs, &mut self.accounts)?;
        let account = self.accounts.account_mut(addr);
        for (log_type, version) in newest {
            account.set_version(log_type, version, self.height);
        }
        Ok(())
    }

    // ── Journalled setters ─────────────────────────────────────────────────

    pub fn set_balance(&mut self, addr: Address, balance: u128) {
        let old = self.accounts.account(addr).balance();
        if old == balance {
            return;
        }
        self.write(
            ChangeLogType::Balance,
            addr,
            LogValue::Amount(old),
            LogValue::Amount(balance),
            LogValue::None,
        );
    }

    pub fn set_storage(&mut self, addr: Address, key: Hash, value: Option<Vec<u8>>) {
        let old = self
            .accounts
            .account(addr)
            .storage_state(&key)
            .map(<[u8]>::to_vec);
        if old == value {
            return;
        }
        self.write(
            ChangeLogType::Storage,
            addr,
            old.map_or(LogValue::None, LogValue::Bytes),
            value.map_or(LogValue::None, LogValue::Bytes),
            LogValue::Hash(key),
        );
    }

    pub fn set_code(&mut self, addr: Address, code: Vec<u8>) {
        let old = self.accounts.account(addr).code().to_vec();
        if old == code {
            return;
        }
        self.write(
            ChangeLogType::Code,
            addr,
            if old.is_empty() {
                LogValue::None
            } else {
                LogValue::Bytes(old)
            },
            LogValue::Bytes(code),
            LogValue::None,
        );
    }

    pub fn set_suicide(&mut self, addr: Address, suicide: bool) {
        let old = self.accounts.account(addr).suicide();
        if old == suicide {
            return;
        }
        self.write(
            ChangeLogType::Suicide,
            addr,
            LogValue::Bool(old),
            LogValue::Bool(suicide),
            LogValue::None,
        );
    }

    pub fn set_votes(&mut self, addr: Address, votes: u128) {
        let old = self.accounts.account(addr).votes();
        if old == votes {
            return;
        }
        self.write(
            ChangeLogType::Votes,
            addr,
            LogValue::Amount(old),
            LogValue::Amount(votes),
            LogValue::None,
        );
    }

    pub fn set_vote_for(&mut self, addr: Address, target: Address) {
        let old = self.accounts.account(addr).vote_for();
        if old == target {
            return;
        }
        self.write(
            ChangeLogType::VoteFor,
            addr,
            LogValue::Address(old),
            LogValue::Address(target),
            LogValue::None,
        );
    }

    pub fn set_candidate_profile(&mut self, addr: Address, profile: BTreeMap<String, String>) {
        let old = self.accounts.account(addr).candidate_profile().clone();
        if old == profile {
            return;
        }
        self.write(
            ChangeLogType::Candidate,
            addr,
            if old.is_empty() {
                LogValue::None
            } else {
                LogValue::Profile(old)
            },
            LogValue::Profile(profile),
            LogValue::None,
        );
    }

    pub fn set_candidate_state(&mut self, addr: Address, key: &str, value: Option<String>) {
        let old = self
            .accounts
            .account(addr)
            .candidate_state(key)
            .map(str::to_string);
        if old == value {
            return;
        }
        self.write(
            ChangeLogType::CandidateState,
            addr,
            old.map_or(LogValue::None, LogValue::Text),
            value.map_or(LogValue::None, LogValue::Text),
            LogValue::Text(key.to_string()),
        );
    }

    fn write(
        &mut self,
        log_type: ChangeLogType,
        addr: Address,
        old_val: LogValue,
        new_val: LogValue,
        extra: LogValue,
    ) {
        let version = self.journal.next_version(log_type, addr, &mut self.accounts);
        let log = ChangeLog {
            log_type,
            address: addr,
            version,
            old_val,
            new_val,
            extra,
        };
        let account = self.accounts.account_mut(addr);
        // Applying the new value cannot mismatch: the setter built the pair.
        let applied = log.redo(account);
        debug_assert!(applied.is_ok());
        self.journal.push(log);
    }

    // ── Finalisation ───────────────────────────────────────────────────────

    /// Realise the block's state roots.
    ///
    /// Re-derives storage roots for accounts with touched slots (emitting
    /// `StorageRoot` logs), folds the journal's newest versions into each
    /// account's committed records, and chains the version root from the
    /// parent's. Idempotent for an unchanged journal.
    pub fn finalise(&mut self) -> Result<Hash, StateError> {
        // Storage roots first; they append further change logs.
        let mut storage_dirty: Vec<Address> = self
            .accounts
            .addresses()
            .copied()
            .filter(|addr| {
                self.accounts
                    .loaded(*addr)
                    .map(Account::storage_touched)
                    .unwrap_or(false)
            })
            .collect();
        storage_dirty.sort();
        for addr in storage_dirty {
            let account = self.accounts.account(addr);
            let entries = account.storage_entries();
            let old_root = account.storage_root();
            let encoded = bincode::serialize(&entries)
                .map_err(|err| StateError::Trie(err.to_string()))?;
            let new_root = keccak256(&encoded);
            if new_root != old_root {
                self.write(
                    ChangeLogType::StorageRoot,
                    addr,
                    LogValue::Hash(old_root),
                    LogValue::Hash(new_root),
                    LogValue::None,
                );
            }
        }

        // Fold the newest journal versions into committed records.
        let mut newest: HashMap<(Address, ChangeLogType), u32> = HashMap::new();
        for log in self.journal.logs() {
            let entry = newest.entry((log.address, log.log_type)).or_insert(0);
            if log.version > *entry {
                *entry = log.version;
            }
        }
        for ((addr, log_type), version) in &newest {
            self.accounts
                .account_mut(*addr)
                .set_version(*log_type, *version, self.height);
        }

        // Version root: unchanged state keeps the parent root.
        if self.journal.is_empty() {
            self.version_root = self.base_version_root;
            return Ok(self.version_root);
        }

        let mut dirty: Vec<Address> = newest.keys().map(|(addr, _)| *addr).collect();
        dirty.sort();
        dirty.dedup();
        let summaries: Vec<Hash> = dirty
            .iter()
            .map(|addr| {
                let data = self.accounts.account(*addr).data();
                let encoded = bincode::serialize(data)
                    .map_err(|err| StateError::Trie(err.to_string()))?;
                Ok(keccak256(&encoded))
            })
            .collect::<Result<_, StateError>>()?;

        let encoded = bincode::serialize(&(&self.base_version_root, &summaries))
            .map_err(|err| StateError::Trie(err.to_string()))?;
        self.version_root = keccak256(&encoded);
        debug!(
            height = self.height,
            dirty = dirty.len(),
            version_root = %self.version_root,
            "state finalised"
        );
        Ok(self.version_root)
    }

    /// The version root realised by the last `finalise()`.
    pub fn version_root(&self) -> Hash {
        self.version_root
    }

    /// Working copies of all dirty accounts, for persistence by the caller.
    pub fn dirty_accounts(&self) -> Vec<&Account> {
        let mut addresses: Vec<Address> = self
            .journal
            .logs()
            .iter()
            .map(|log| log.address)
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
            .into_iter()
            .filter_map(|addr| self.accounts.loaded(addr))
            .collect()
    }

    /// Reset between blocks.
    pub fn clear(&mut self) {
        self.accounts.clear();
        self.journal.clear();
        self.version_root = self.base_version_root;
    }
}
