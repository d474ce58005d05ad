//! Account state engine.
//!
//! This crate implements the state side of block execution:
//!
//! - [`Journal`]: the append-only change-log queue with snapshot, revert,
//!   merge and rebuild — the undo/redo engine behind speculative execution
//! - [`Account`] / [`AccountSet`]: in-memory account overlays loaded lazily
//!   through an [`AccountLoader`]
//! - [`AccountManager`]: the mutation front door; every write is journalled
//!   before it lands, and `finalise()` realises the version root
//!
//! The journal and the account set are exclusively owned by the executing
//! thread; nothing here is shared or locked.

mod account;
mod journal;
mod manager;
mod merge;
mod set;

pub use account::Account;
pub use journal::{Journal, JournalError};
pub use manager::{AccountManager, StateError};
pub use merge::merge_change_logs;
pub use set::{AccountLoader, AccountSet};

/// Test helpers for crates driving the account engine.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use cadence_types::{AccountData, Address};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Loader over a fixed map of pre-seeded accounts.
    #[derive(Default)]
    pub struct MapLoader {
        accounts: HashMap<Address, AccountData>,
    }

    impl MapLoader {
        pub fn new() -> MapLoader {
            MapLoader::default()
        }

        pub fn with_balance(mut self, addr: Address, balance: u128) -> MapLoader {
            let mut data = AccountData::empty(addr);
            data.balance = balance;
            self.accounts.insert(addr, data);
            self
        }

        pub fn insert(&mut self, data: AccountData) {
            self.accounts.insert(data.address, data);
        }

        pub fn into_loader(self) -> Arc<dyn AccountLoader> {
            Arc::new(self)
        }
    }

    impl AccountLoader for MapLoader {
        fn load_account(&self, addr: Address) -> Option<AccountData> {
            self.accounts.get(&addr).cloned()
        }
    }
}
