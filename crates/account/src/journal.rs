//! The change-log journal: snapshot, revert, merge, rebuild.
//!
//! All change logs produced while executing one block sit in a single queue
//! so execution can be wound back to any named revision. Versions within the
//! queue are dense per `(address, log_type)`; both the reverse walk in
//! [`Journal::revert_to`] and the forward walk in [`Journal::rebuild`] verify
//! that density and treat violations as state corruption.

use crate::merge::merge_change_logs;
use crate::set::AccountSet;
use cadence_types::{AccountReader, Address, ChangeLog, ChangeLogError, ChangeLogType, Event};
use std::collections::HashMap;
use thiserror::Error;
use tracing::error;

/// Journal corruption and misuse errors.
///
/// Everything except [`JournalError::NoEvents`] means the in-memory state no
/// longer matches the log queue; callers are expected to treat those as
/// fatal and abort the surrounding block (or the process).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JournalError {
    /// `revert_to` was asked for a revision id that does not exist.
    #[error("revision {0} does not exist")]
    RevisionNotExist(u32),

    /// A change log's version broke the dense per-account sequence.
    #[error("wrong change log version: expected {expected}, got {got}")]
    WrongChangeLogVersion { expected: u32, got: u32 },

    /// A merge invalidated an outstanding revision.
    #[error("snapshot is broken")]
    SnapshotBroken,

    /// `pop_event` on an empty event queue.
    #[error("no events to pop")]
    NoEvents,

    /// A log carried a value its type cannot apply.
    #[error(transparent)]
    Apply(#[from] ChangeLogError),
}

/// A named marker into the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Revision {
    id: u32,
    journal_index: usize,
}

/// The change-log queue for one block's execution.
#[derive(Default)]
pub struct Journal {
    logs: Vec<ChangeLog>,
    /// Outstanding revisions, id-ascending. Each satisfies
    /// `journal_index <= logs.len()`.
    revisions: Vec<Revision>,
    next_revision_id: u32,
    events: Vec<Event>,
}

impl Journal {
    pub fn new() -> Journal {
        Journal::default()
    }

    /// Append a change log.
    pub fn push(&mut self, log: ChangeLog) {
        self.logs.push(log);
    }

    /// All logs in issue order.
    pub fn logs(&self) -> &[ChangeLog] {
        &self.logs
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Logs touching `addr`, in issue order.
    pub fn logs_by_address(&self, addr: Address) -> Vec<ChangeLog> {
        self.logs
            .iter()
            .filter(|log| log.address == addr)
            .cloned()
            .collect()
    }

    /// Record a contract event.
    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Drop the newest contract event.
    pub fn pop_event(&mut self) -> Result<(), JournalError> {
        if self.events.pop().is_none() {
            return Err(JournalError::NoEvents);
        }
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The version the next log of `(log_type, addr)` must carry.
    ///
    /// Scans the journal tail-to-head for the newest matching log; falls
    /// back to the account's committed base version. Either way the result
    /// is `newest + 1`, keeping each typed stream densely versioned.
    pub fn next_version(
        &self,
        log_type: ChangeLogType,
        addr: Address,
        accounts: &mut AccountSet,
    ) -> u32 {
        for log in self.logs.iter().rev() {
            if log.log_type == log_type && log.address == addr {
                return log.version + 1;
            }
        }
        accounts.account(addr).base_version(log_type) + 1
    }

    /// Name the current queue position; `revert_to` can rewind to it.
    pub fn snapshot(&mut self) -> u32 {
        let id = self.next_revision_id;
        self.next_revision_id += 1;
        self.revisions.push(Revision {
            id,
            journal_index: self.logs.len(),
        });
        id
    }

    /// Undo every change made since revision `id` was taken.
    ///
    /// Walks the queue newest-first down to the revision's index, checking
    /// on the way that versions are above the committed base and decrease by
    /// exactly one per step for each account. Any violation means the queue
    /// and the accounts have diverged, which is unrecoverable.
    pub fn revert_to(
        &mut self,
        id: u32,
        accounts: &mut AccountSet,
    ) -> Result<(), JournalError> {
        let idx = self
            .revisions
            .binary_search_by_key(&id, |revision| revision.id)
            .map_err(|_| {
                error!(revision = id, "revision cannot be reverted");
                JournalError::RevisionNotExist(id)
            })?;
        let snapshot_index = self.revisions[idx].journal_index;

        let mut last_versions: HashMap<Address, u32> = HashMap::new();
        for log in self.logs[snapshot_index..].iter().rev() {
            let account = accounts.account_mut(log.address);
            let base_version = account.base_version(log.log_type);

            // The version must still be uncommitted, and each account's
            // versions must step down by one as we walk backwards.
            let sequential = match last_versions.get(&log.address) {
                Some(last) => last.checked_sub(1) == Some(log.version),
                None => true,
            };
            if !sequential || base_version >= log.version {
                let expected = last_versions
                    .get(&log.address)
                    .map(|last| last.saturating_sub(1))
                    .unwrap_or(base_version + 1);
                error!(
                    expected,
                    got = log.version,
                    address = %log.address,
                    "undo found a corrupt change log sequence"
                );
                return Err(JournalError::WrongChangeLogVersion {
                    expected,
                    got: log.version,
                });
            }
            last_versions.insert(log.address, log.version);

            log.undo(account)?;
        }

        self.logs.truncate(snapshot_index);
        self.revisions.truncate(idx);
        Ok(())
    }

    /// Redo an externally supplied slice of one account's logs on top of the
    /// account's current base state.
    ///
    /// Logs are sorted by `(log_type, version)` first. Versions at or below
    /// the last seen one are skipped as already applied; a gap above
    /// `last + 1` is corruption. Returns the newest version applied per log
    /// type so the caller can advance the account's records.
    pub fn rebuild(
        addr: Address,
        mut logs: Vec<ChangeLog>,
        accounts: &mut AccountSet,
    ) -> Result<HashMap<ChangeLogType, u32>, JournalError> {
        logs.sort_by_key(ChangeLog::sort_key);

        let mut last_versions: HashMap<ChangeLogType, u32> = HashMap::new();
        for log in &logs {
            debug_assert_eq!(log.address, addr);
            let account = accounts.account_mut(addr);
            let last = *last_versions
                .entry(log.log_type)
                .or_insert_with(|| account.base_version(log.log_type));

            if log.version <= last {
                // Already folded into the base state.
                continue;
            }
            if log.version != last + 1 {
                error!(
                    expected = last + 1,
                    got = log.version,
                    address = %addr,
                    "redo found a gap in the change log sequence"
                );
                return Err(JournalError::WrongChangeLogVersion {
                    expected: last + 1,
                    got: log.version,
                });
            }

            log.redo(account)?;
            last_versions.insert(log.log_type, log.version);
        }
        Ok(last_versions)
    }

    /// Compact `logs[from_index..]` into its canonical form.
    ///
    /// Merging must not reach under a live revision: the newest revision's
    /// index has to be at or below `from_index`, and afterwards every
    /// revision must still point inside the queue.
    pub fn merge(&mut self, from_index: usize) -> Result<(), JournalError> {
        if let Some(last) = self.revisions.last() {
            if last.journal_index > from_index {
                error!(
                    revision_index = last.journal_index,
                    from_index, "merge would straddle a live revision"
                );
                return Err(JournalError::SnapshotBroken);
            }
        }

        let merged = merge_change_logs(&self.logs[from_index..]);
        self.logs.truncate(from_index);
        self.logs.extend(merged);

        if !self.check_revisions_available() {
            error!(
                logs = self.logs.len(),
                from_index, "merge left a revision dangling"
            );
            return Err(JournalError::SnapshotBroken);
        }
        Ok(())
    }

    /// Reset the journal between blocks.
    pub fn clear(&mut self) {
        self.logs.clear();
        self.revisions.clear();
        self.next_revision_id = 0;
        self.events.clear();
    }

    fn check_revisions_available(&self) -> bool {
        match self.revisions.last() {
            Some(last) => last.journal_index <= self.logs.len(),
            None => true,
        }
    }
}
