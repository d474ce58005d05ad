//! Lazily-loaded account working set.

use crate::account::Account;
use cadence_types::{AccountData, Address};
use std::collections::HashMap;
use std::sync::Arc;

/// Source of committed account state, implemented by the store above.
pub trait AccountLoader: Send + Sync {
    /// Load the committed state of `addr`, or `None` for a never-seen
    /// account.
    fn load_account(&self, addr: Address) -> Option<AccountData>;
}

/// The set of accounts touched while executing one block.
///
/// Accounts are pulled from the loader on first access and kept as working
/// copies; committed state is never written back from here.
pub struct AccountSet {
    accounts: HashMap<Address, Account>,
    loader: Arc<dyn AccountLoader>,
}

impl AccountSet {
    pub fn new(loader: Arc<dyn AccountLoader>) -> AccountSet {
        AccountSet {
            accounts: HashMap::new(),
            loader,
        }
    }

    /// Mutable working copy, loading or creating the account on first use.
    pub fn account_mut(&mut self, addr: Address) -> &mut Account {
        let loader = &self.loader;
        self.accounts.entry(addr).or_insert_with(|| {
            match loader.load_account(addr) {
                Some(data) => Account::from_data(data),
                None => Account::fresh(addr),
            }
        })
    }

    /// Read view; loads like [`AccountSet::account_mut`].
    pub fn account(&mut self, addr: Address) -> &Account {
        self.account_mut(addr)
    }

    /// Read view over an already-loaded account only.
    pub fn loaded(&self, addr: Address) -> Option<&Account> {
        self.accounts.get(&addr)
    }

    /// Addresses currently in the working set.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.accounts.keys()
    }

    /// Drop all working copies.
    pub fn clear(&mut self) {
        self.accounts.clear();
    }
}
