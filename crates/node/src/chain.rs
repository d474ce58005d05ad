//! The chain: block ingress, fork tracking, mining and finality.

use crate::events::{ChainEvent, ChainTopic, SubscriptionHub};
use cadence_account::AccountManager;
use cadence_consensus::{
    BlockAssembler, BlockCache, CandidateLoader, ConsensusError, FinalityTracker, Store,
    StoreLoader, TxPool, TxProcessor, Validator,
};
use cadence_deputy::DeputyManager;
use cadence_types::{Block, ChainParams, ConfirmData, DeputyNode, KeyPair, Transaction};
use parking_lot::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

/// Collaborator handles the chain is built from.
pub struct ChainHandles {
    pub store: Arc<dyn Store>,
    pub pool: Arc<dyn TxPool>,
    pub candidates: Arc<dyn CandidateLoader>,
    pub processor: Arc<dyn TxProcessor>,
    /// The local signing identity; mining requires it to be a deputy.
    pub signer: KeyPair,
}

/// The consensus-core orchestrator.
///
/// Incoming blocks run the validate → replay → compare pipeline before they
/// are stored; confirms flow through the finality tracker; orphans wait in
/// the block cache until their parent shows up.
pub struct Chain {
    params: ChainParams,
    dm: Arc<DeputyManager>,
    store: Arc<dyn Store>,
    pool: Arc<dyn TxPool>,
    validator: Validator,
    assembler: BlockAssembler,
    finality: FinalityTracker,
    orphans: BlockCache,
    current: RwLock<Block>,
    hub: SubscriptionHub,
}

impl Chain {
    /// Build a chain over the genesis committee and collaborator handles.
    pub fn new(params: ChainParams, genesis_committee: Vec<DeputyNode>, handles: ChainHandles) -> Chain {
        let dm = Arc::new(DeputyManager::new(params.clone(), genesis_committee));
        let validator = Validator::new(
            dm.clone(),
            handles.store.clone(),
            handles.pool.clone(),
            handles.candidates.clone(),
        );
        let assembler = BlockAssembler::new(
            dm.clone(),
            handles.processor.clone(),
            handles.candidates.clone(),
            handles.signer.clone(),
        );
        let finality = FinalityTracker::new(handles.store.clone(), dm.clone());
        let current = handles.store.stable();
        info!(
            height = current.height(),
            hash = %current.hash(),
            "chain starting from stable block"
        );
        Chain {
            params,
            dm,
            store: handles.store,
            pool: handles.pool,
            validator,
            assembler,
            finality,
            orphans: BlockCache::new(),
            current: RwLock::new(current),
            hub: SubscriptionHub::new(),
        }
    }

    /// The head of the branch this node currently follows.
    pub fn current_block(&self) -> Block {
        self.current.read().clone()
    }

    /// The newest block with a confirm quorum.
    pub fn stable_block(&self) -> Block {
        self.store.stable()
    }

    pub fn stable_height(&self) -> u32 {
        self.finality.stable_height()
    }

    pub fn deputy_manager(&self) -> &Arc<DeputyManager> {
        &self.dm
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Register a subscriber channel for `topic`.
    pub fn subscribe(&self, topic: ChainTopic, sender: UnboundedSender<ChainEvent>) {
        self.hub.subscribe(topic, sender);
    }

    /// Offer a transaction to the pool.
    pub fn add_tx(&self, tx: Transaction) -> bool {
        let accepted = self.pool.add_tx(tx.clone());
        if accepted {
            self.hub
                .publish(ChainTopic::NewTx, ChainEvent::Tx(Box::new(tx)));
        }
        accepted
    }

    /// Insert a block received from the network.
    ///
    /// `ParentMissing` buffers the block and surfaces the error so the
    /// caller can request the parent. Journal corruption aborts the insert
    /// and must be treated as fatal by the embedder.
    #[instrument(skip(self, block), fields(height = block.height(), hash = %block.hash()))]
    pub fn insert_block(&self, block: Block) -> Result<(), ConsensusError> {
        if block.height() <= self.finality.stable_height() {
            debug!("block at or below stable, ignored");
            return Ok(());
        }
        if self.store.block(&block.hash()).is_some() {
            debug!("block already known");
            return Ok(());
        }

        let parent = match self.validator.verify_before_tx_process(&block, self.now()) {
            Ok(parent) => parent,
            Err(ConsensusError::ParentMissing) => {
                debug!("parent missing, block parked in the orphan cache");
                self.orphans.add(block);
                return Err(ConsensusError::ParentMissing);
            }
            Err(err) => return Err(err),
        };

        if self.validator.judge_deputy(&block) {
            // Advisory only; slashing policy belongs above the core.
            warn!("double-sign evidence recorded for this producer");
        }

        let mut am = self.manager_for(&parent);
        let computed = self.assembler.run_block(&block, &mut am)?;
        self.validator.verify_after_tx_process(&block, &computed)?;

        self.commit(&block, &am)?;
        self.advance_head(&block);
        self.pool.on_block(&block);

        let mut stored = block;
        if let Some(stable) = self
            .finality
            .on_block_inserted(&self.validator, &mut stored)?
        {
            self.on_stable(&stable);
        }

        self.drain_orphans();
        Ok(())
    }

    /// Apply a confirm message.
    #[instrument(skip(self, data), fields(height = data.height, hash = %data.hash))]
    pub fn insert_confirm(&self, data: ConfirmData) -> Result<(), ConsensusError> {
        let promoted = self.finality.insert_confirm(&self.validator, &data)?;
        self.hub
            .publish(ChainTopic::NewConfirm, ChainEvent::Confirm(Box::new(data)));
        if let Some(stable) = promoted {
            self.on_stable(&stable);
        }
        Ok(())
    }

    /// Mine a block on the current head, if the local key is a deputy.
    pub fn mine(
        &self,
        time_budget: Duration,
        cancel: &AtomicBool,
    ) -> Result<Block, ConsensusError> {
        let parent = self.current_block();
        let now = self.now() as u32;
        let candidates = self.pool.pending(now, 10_000);

        let mut am = self.manager_for(&parent);
        let (block, rejected) =
            self.assembler
                .mine_block(&parent, candidates, &mut am, time_budget, cancel, now)?;
        if !rejected.is_empty() {
            debug!(rejected = rejected.len(), "invalid candidates dropped");
        }

        self.commit(&block, &am)?;
        self.advance_head(&block);
        self.pool.on_block(&block);
        self.hub.publish(
            ChainTopic::NewMinedBlock,
            ChainEvent::MinedBlock(Box::new(block.clone())),
        );

        let mut stored = block.clone();
        if let Some(stable) = self
            .finality
            .on_block_inserted(&self.validator, &mut stored)?
        {
            self.on_stable(&stable);
        }
        Ok(block)
    }

    /// Confirm the current head with the local key and apply the confirm
    /// locally, returning it for gossip.
    pub fn confirm_current(&self, signer: &KeyPair) -> Result<ConfirmData, ConsensusError> {
        let head = self.current_block();
        let data = ConfirmData {
            hash: head.hash(),
            height: head.height(),
            sign_data: signer.sign(&head.hash()),
        };
        self.insert_confirm(data.clone())?;
        Ok(data)
    }

    fn manager_for(&self, parent: &Block) -> AccountManager {
        AccountManager::new(
            Arc::new(StoreLoader(self.store.clone())),
            parent.header.version_root,
            parent.height() + 1,
        )
    }

    /// Persist the block and the account state its execution produced.
    fn commit(&self, block: &Block, am: &AccountManager) -> Result<(), ConsensusError> {
        let dirty: Vec<_> = am
            .dirty_accounts()
            .into_iter()
            .map(|account| account.data().clone())
            .collect();
        self.store.commit_accounts(&dirty).map_err(ConsensusError::from)?;
        self.store.put_block(block.clone()).map_err(ConsensusError::from)
    }

    /// Fork choice: extend the head, or switch to a strictly better branch.
    fn advance_head(&self, block: &Block) {
        let mut current = self.current.write();
        let extends = block.parent_hash() == current.hash();
        let better_branch = block.height() > current.height()
            || (block.height() == current.height() && block.hash() < current.hash());
        if extends {
            *current = block.clone();
        } else if better_branch {
            warn!(
                from = %current.hash(),
                to = %block.hash(),
                height = block.height(),
                "switching to a better branch"
            );
            self.pool.on_prune(&current);
            *current = block.clone();
        }
    }

    fn on_stable(&self, stable: &Block) {
        self.orphans.clear(stable.height());
        self.hub.publish(
            ChainTopic::NewStableBlock,
            ChainEvent::StableBlock(Box::new(stable.clone())),
        );
    }

    /// Re-inject orphans whose parent has become available.
    fn drain_orphans(&self) {
        let mut ready = Vec::new();
        self.orphans.iterate(|block| {
            if self.store.block(&block.parent_hash()).is_some() {
                ready.push(block.clone());
                true
            } else {
                false
            }
        });
        for block in ready {
            debug!(height = block.height(), hash = %block.hash(), "replaying orphan");
            if let Err(err) = self.insert_block(block) {
                debug!(%err, "orphan replay rejected");
            }
        }
    }

    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }
}
