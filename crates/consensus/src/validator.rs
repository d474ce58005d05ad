//! Pure block verification.
//!
//! Each check maps to exactly one error kind so the orchestrator can score
//! peers by what they sent. Checks that need execution results live in
//! [`Validator::verify_after_tx_process`]; everything else runs before any
//! state is touched.

use crate::error::{BlockIssue, ConsensusError, HeaderIssue};
use crate::traits::{CandidateLoader, Store, TxPool};
use cadence_deputy::DeputyManager;
use cadence_types::{
    change_log_root, deputy_root, tx_root, Block, ChangeLog, DeputyNode, SignData,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum header extra-data length in bytes.
pub const MAX_EXTRA_DATA_LEN: usize = 256;

/// Clock skew tolerated on incoming blocks, in seconds.
const TIME_SKEW: u64 = 1;

/// Stateless-ish block verification over the store and committee state.
pub struct Validator {
    dm: Arc<DeputyManager>,
    store: Arc<dyn Store>,
    pool: Arc<dyn TxPool>,
    candidates: Arc<dyn CandidateLoader>,
}

impl Validator {
    pub fn new(
        dm: Arc<DeputyManager>,
        store: Arc<dyn Store>,
        pool: Arc<dyn TxPool>,
        candidates: Arc<dyn CandidateLoader>,
    ) -> Validator {
        Validator {
            dm,
            store,
            pool,
            candidates,
        }
    }

    /// All pre-execution checks. Returns the parent on success so the caller
    /// can seed execution from it.
    pub fn verify_before_tx_process(
        &self,
        block: &Block,
        now: u64,
    ) -> Result<Block, ConsensusError> {
        let parent = self.verify_parent(block)?;
        self.verify_height(block, &parent)?;
        self.verify_time(block, now)?;
        self.verify_signer(block)?;
        self.verify_extra_data(block)?;
        self.verify_tx_root(block)?;
        self.verify_txs(block)?;
        self.verify_mine_slot(block, &parent)?;
        self.verify_deputy(block)?;
        Ok(parent)
    }

    /// The post-execution check: the block re-executed locally must hash to
    /// the received header. Covers version root, tx root, log root and gas.
    pub fn verify_after_tx_process(
        &self,
        block: &Block,
        computed: &Block,
    ) -> Result<(), ConsensusError> {
        if block.hash() != computed.hash() {
            warn!(
                block = %block.hash(),
                computed = %computed.hash(),
                height = block.height(),
                "re-execution diverged from received block"
            );
            return Err(ConsensusError::InvalidBlock(BlockIssue::Replay));
        }
        Ok(())
    }

    /// Compare a block's change-log root against locally produced logs.
    pub fn verify_change_logs(
        &self,
        block: &Block,
        computed: &[ChangeLog],
    ) -> Result<(), ConsensusError> {
        if block.header.log_root != change_log_root(computed)
            || block.change_logs.as_slice() != computed
        {
            return Err(ConsensusError::InvalidBlock(BlockIssue::LogRoot));
        }
        Ok(())
    }

    fn verify_parent(&self, block: &Block) -> Result<Block, ConsensusError> {
        self.store
            .block(&block.parent_hash())
            .ok_or(ConsensusError::ParentMissing)
    }

    fn verify_height(&self, block: &Block, parent: &Block) -> Result<(), ConsensusError> {
        if parent.height() + 1 != block.height() {
            return Err(ConsensusError::InvalidHeader(HeaderIssue::Height));
        }
        Ok(())
    }

    fn verify_time(&self, block: &Block, now: u64) -> Result<(), ConsensusError> {
        if u64::from(block.time()) > now + TIME_SKEW {
            return Err(ConsensusError::InvalidHeader(HeaderIssue::FutureTime));
        }
        Ok(())
    }

    fn verify_signer(&self, block: &Block) -> Result<(), ConsensusError> {
        let signer = block
            .header
            .signer_node_id()
            .map_err(|_| ConsensusError::InvalidHeader(HeaderIssue::Signer))?;
        let deputy = self
            .dm
            .deputy_by_address(block.height(), block.miner_address())
            .ok_or(ConsensusError::InvalidHeader(HeaderIssue::Signer))?;
        if deputy.node_id != signer {
            return Err(ConsensusError::InvalidHeader(HeaderIssue::Signer));
        }
        Ok(())
    }

    fn verify_extra_data(&self, block: &Block) -> Result<(), ConsensusError> {
        if block.header.extra.len() > MAX_EXTRA_DATA_LEN {
            return Err(ConsensusError::InvalidHeader(HeaderIssue::ExtraTooLong));
        }
        Ok(())
    }

    fn verify_tx_root(&self, block: &Block) -> Result<(), ConsensusError> {
        if tx_root(&block.txs) != block.header.tx_root {
            return Err(ConsensusError::InvalidBlock(BlockIssue::TxRoot));
        }
        Ok(())
    }

    fn verify_txs(&self, block: &Block) -> Result<(), ConsensusError> {
        if !self.pool.block_is_valid(block) {
            return Err(ConsensusError::InvalidBlock(BlockIssue::PoolRejected));
        }
        let params = self.dm.params();
        for tx in &block.txs {
            tx.check(params.chain_id, u64::from(block.time()))
                .map_err(|err| ConsensusError::InvalidBlock(BlockIssue::Tx(err)))?;
        }
        Ok(())
    }

    /// The slot-timing rule. With `gap` the rotational distance between the
    /// parent's and this block's producers, `Δ = (time − parent.time)` in
    /// milliseconds and `one_loop = N · timeout`:
    ///
    /// - `gap == 0`: the producer repeats itself and must have waited out a
    ///   full round: `Δ mod one_loop ≥ one_loop − timeout`
    /// - `gap == 1`: the immediate successor: `Δ mod one_loop < timeout`
    /// - otherwise: `⌊(Δ mod one_loop) / timeout⌋ == gap − 1`
    fn verify_mine_slot(&self, block: &Block, parent: &Block) -> Result<(), ConsensusError> {
        if parent.height() == 0 {
            // The genesis timestamp carries no slot information.
            debug!("parent is genesis, skipping slot check");
            return Ok(());
        }
        let count = self.dm.deputy_count(block.height());
        let gap = self
            .dm
            .slot_distance(block.height(), parent.miner_address(), block.miner_address());
        if gap < 0 {
            return Err(ConsensusError::InvalidHeader(HeaderIssue::Slot));
        }

        let params = self.dm.params();
        let timeout = params.timeout_ms;
        let one_loop = params.one_loop_ms(count);
        let span_ms = u64::from(block.time().saturating_sub(parent.time())) * 1000;
        let span = span_ms % one_loop;

        let in_slot = match gap {
            0 => span >= one_loop - timeout,
            1 => span < timeout,
            gap => span / timeout == (gap as u64) - 1,
        };
        if !in_slot {
            warn!(
                height = block.height(),
                gap,
                span_ms,
                one_loop,
                "block produced outside its slot window"
            );
            return Err(ConsensusError::InvalidHeader(HeaderIssue::Slot));
        }
        Ok(())
    }

    /// Snapshot blocks must embed exactly the committee the local candidate
    /// tally produces, and carry its Merkle root. Non-snapshot blocks must
    /// not carry a deputy root at all.
    fn verify_deputy(&self, block: &Block) -> Result<(), ConsensusError> {
        let params = self.dm.params();
        if !params.is_snapshot_height(block.height()) {
            if block.header.deputy_root.is_some() || block.deputies.is_some() {
                return Err(ConsensusError::InvalidHeader(
                    HeaderIssue::UnexpectedDeputyRoot,
                ));
            }
            return Ok(());
        }

        let embedded: &[DeputyNode] = block
            .deputies
            .as_deref()
            .ok_or(ConsensusError::InvalidBlock(BlockIssue::DeputyRoot))?;
        let root = deputy_root(embedded);
        if block.header.deputy_root != Some(root) {
            return Err(ConsensusError::InvalidBlock(BlockIssue::DeputyRoot));
        }

        let expected = self.candidates.load_top(&block.parent_hash());
        if embedded != expected.as_slice() {
            warn!(
                height = block.height(),
                "snapshot committee differs from the local candidate tally"
            );
            return Err(ConsensusError::InvalidBlock(BlockIssue::DeputyRoot));
        }
        Ok(())
    }

    /// Advisory double-sign detection: true when the same node already
    /// signed a different block at this height above stable. What to do
    /// about it (slash, ban, ignore) is the orchestrator's policy.
    pub fn judge_deputy(&self, new_block: &Block) -> bool {
        let signer = match new_block.header.signer_node_id() {
            Ok(signer) => signer,
            Err(_) => return false,
        };
        let stable_height = self.store.stable().height();
        if new_block.height() <= stable_height {
            return false;
        }
        for sibling in self.store.blocks_at_height(new_block.height()) {
            if sibling.hash() == new_block.hash() {
                continue;
            }
            if sibling.header.signer_node_id().ok() == Some(signer) {
                warn!(
                    height = new_block.height(),
                    node = ?signer,
                    first = %sibling.hash(),
                    second = %new_block.hash(),
                    "deputy signed two blocks at the same height"
                );
                return true;
            }
        }
        false
    }

    /// Filter a batch of confirms down to the acceptable subset.
    ///
    /// Drops duplicates (within the batch and against the block), the
    /// miner's own signature, and signatures whose signer is not on the
    /// committee for the block's height. Partial acceptance is the norm;
    /// the first rejection reason is reported alongside.
    pub fn verify_new_confirms(
        &self,
        block: &Block,
        sigs: &[SignData],
    ) -> (Vec<SignData>, Option<ConsensusError>) {
        let committee = self.dm.committee_at(block.height());
        let hash = block.hash();
        let miner = block.header.signer_node_id().ok();

        let mut accepted: Vec<SignData> = Vec::with_capacity(sigs.len());
        let mut first_err = None;
        for sig in sigs {
            if accepted.contains(sig) || block.is_confirm_exist(sig) {
                continue;
            }
            let signer = match sig.recover_node_id(&hash) {
                Ok(signer) => signer,
                Err(_) => {
                    first_err.get_or_insert(ConsensusError::InvalidConfirmSigner);
                    continue;
                }
            };
            if Some(signer) == miner {
                first_err.get_or_insert(ConsensusError::InvalidConfirmSigner);
                continue;
            }
            if !committee.iter().any(|deputy| deputy.node_id == signer) {
                first_err.get_or_insert(ConsensusError::InvalidConfirmSigner);
                continue;
            }
            accepted.push(*sig);
        }
        (accepted, first_err)
    }
}
