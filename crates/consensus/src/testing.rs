//! In-memory collaborators for the workspace test suites.

use crate::traits::{CandidateLoader, Store, StoreError, TxPool};
use cadence_account::AccountLoader;
use cadence_types::{
    AccountData, Address, Block, DeputyNode, Hash, KeyPair, SignData, Transaction,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory block/account store.
///
/// Canonical-chain queries return the first block inserted at a height,
/// which is what the tests produce; fork bookkeeping beyond that is the
/// real store's concern.
#[derive(Default)]
pub struct MemStore {
    blocks: RwLock<HashMap<Hash, Block>>,
    by_height: RwLock<HashMap<u32, Vec<Hash>>>,
    stable: RwLock<Hash>,
    accounts: RwLock<HashMap<Address, AccountData>>,
    code: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl MemStore {
    /// A store seeded with `genesis` as the stable block.
    pub fn with_genesis(genesis: Block) -> MemStore {
        let store = MemStore::default();
        let hash = genesis.hash();
        store.put_block(genesis).expect("fresh store accepts genesis");
        *store.stable.write() = hash;
        store
    }

    /// Seed an account balance.
    pub fn seed_balance(&self, addr: Address, balance: u128) {
        let mut data = AccountData::empty(addr);
        data.balance = balance;
        self.accounts.write().insert(addr, data);
    }

    /// Seed a full account.
    pub fn seed_account(&self, data: AccountData) {
        self.accounts.write().insert(data.address, data);
    }
}

impl AccountLoader for MemStore {
    fn load_account(&self, addr: Address) -> Option<AccountData> {
        self.accounts.read().get(&addr).cloned()
    }
}

impl Store for MemStore {
    fn block(&self, hash: &Hash) -> Option<Block> {
        self.blocks.read().get(hash).cloned()
    }

    fn block_by_height(&self, height: u32) -> Option<Block> {
        let by_height = self.by_height.read();
        let hash = by_height.get(&height)?.first()?;
        self.blocks.read().get(hash).cloned()
    }

    fn blocks_at_height(&self, height: u32) -> Vec<Block> {
        let by_height = self.by_height.read();
        let blocks = self.blocks.read();
        by_height
            .get(&height)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|hash| blocks.get(hash).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn put_block(&self, block: Block) -> Result<(), StoreError> {
        let hash = block.hash();
        let height = block.height();
        self.blocks.write().insert(hash, block);
        let mut by_height = self.by_height.write();
        let bucket = by_height.entry(height).or_default();
        if !bucket.contains(&hash) {
            bucket.push(hash);
        }
        Ok(())
    }

    fn update_confirms(&self, hash: &Hash, confirms: Vec<SignData>) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        let block = blocks
            .get_mut(hash)
            .ok_or_else(|| StoreError("unknown block".to_string()))?;
        block.confirms = confirms;
        Ok(())
    }

    fn set_stable(&self, hash: &Hash) -> Result<(), StoreError> {
        if !self.blocks.read().contains_key(hash) {
            return Err(StoreError("stable block not stored".to_string()));
        }
        *self.stable.write() = *hash;
        Ok(())
    }

    fn stable(&self) -> Block {
        let hash = *self.stable.read();
        self.blocks
            .read()
            .get(&hash)
            .cloned()
            .unwrap_or_default()
    }

    fn commit_accounts(&self, accounts: &[AccountData]) -> Result<(), StoreError> {
        let mut map = self.accounts.write();
        for data in accounts {
            map.insert(data.address, data.clone());
        }
        Ok(())
    }

    fn contract_code(&self, hash: &Hash) -> Option<Vec<u8>> {
        self.code.read().get(hash).cloned()
    }
}

/// A pool that accepts everything and remembers what it saw.
#[derive(Default)]
pub struct VecPool {
    pending: RwLock<Vec<Transaction>>,
}

impl VecPool {
    pub fn new() -> VecPool {
        VecPool::default()
    }

    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }
}

impl TxPool for VecPool {
    fn pending(&self, _time: u32, size: usize) -> Vec<Transaction> {
        let pending = self.pending.read();
        pending.iter().take(size).cloned().collect()
    }

    fn add_tx(&self, tx: Transaction) -> bool {
        let mut pending = self.pending.write();
        if pending.contains(&tx) {
            return false;
        }
        pending.push(tx);
        true
    }

    fn block_is_valid(&self, _block: &Block) -> bool {
        true
    }

    fn on_block(&self, block: &Block) {
        let mut pending = self.pending.write();
        pending.retain(|tx| !block.txs.contains(tx));
    }

    fn on_prune(&self, block: &Block) {
        let mut pending = self.pending.write();
        for tx in &block.txs {
            if !pending.contains(tx) {
                pending.push(tx.clone());
            }
        }
    }
}

/// Candidate loader over a fixed committee and refund schedule.
#[derive(Default)]
pub struct FixedCandidates {
    nodes: Vec<DeputyNode>,
    refunds: RwLock<HashMap<u32, Vec<Address>>>,
    fail_refunds: bool,
}

impl FixedCandidates {
    pub fn new(nodes: Vec<DeputyNode>) -> FixedCandidates {
        FixedCandidates {
            nodes,
            refunds: RwLock::new(HashMap::new()),
            fail_refunds: false,
        }
    }

    /// A loader whose refund query always errors.
    pub fn failing_refunds(nodes: Vec<DeputyNode>) -> FixedCandidates {
        FixedCandidates {
            nodes,
            refunds: RwLock::new(HashMap::new()),
            fail_refunds: true,
        }
    }

    pub fn schedule_refund(&self, height: u32, addr: Address) {
        self.refunds.write().entry(height).or_default().push(addr);
    }
}

impl CandidateLoader for FixedCandidates {
    fn load_top(&self, _snapshot_parent: &Hash) -> Vec<DeputyNode> {
        self.nodes.clone()
    }

    fn load_refunds(&self, height: u32) -> Result<Vec<Address>, StoreError> {
        if self.fail_refunds {
            return Err(StoreError("refund query failed".to_string()));
        }
        Ok(self
            .refunds
            .read()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

/// A ranked committee whose keys the tests control.
pub fn committee_with_keys(votes: &[u128]) -> (Vec<KeyPair>, Vec<DeputyNode>) {
    let keys: Vec<KeyPair> = (0..votes.len())
        .map(|i| cadence_types::test_utils::test_keypair(i as u8))
        .collect();
    let nodes = keys
        .iter()
        .zip(votes)
        .enumerate()
        .map(|(rank, (kp, v))| DeputyNode {
            miner_address: kp.node_id().address(),
            income_address: None,
            node_id: kp.node_id(),
            rank: rank as u16,
            votes: *v,
        })
        .collect();
    (keys, nodes)
}

/// A genesis block at `time`.
pub fn genesis_block(time: u32) -> Block {
    let mut block = Block::default();
    block.header.time = time;
    block.header.gas_limit = 0;
    block
}
