//! Block assembly: mining, replay, term finalisation and sealing.

use crate::error::ConsensusError;
use crate::reward::{calculate_salaries, load_term_reward};
use crate::traits::{CandidateLoader, TxProcessor, TxsProduct};
use cadence_account::AccountManager;
use cadence_deputy::{DeputyManager, TermRecord};
use cadence_types::{
    change_log_root, tx_root, AccountReader, Block, BlockHeader, ChainParams, KeyPair, SignData,
    Transaction, EMPTY_TRIE_HASH, KEY_DEPOSIT_AMOUNT, KEY_IS_CANDIDATE,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Assembles blocks for mining and replays received ones.
///
/// The assembler owns no state: account managers are created per block by
/// the caller and passed in, following the rule that execution borrows
/// storage rather than holding it.
pub struct BlockAssembler {
    dm: Arc<DeputyManager>,
    processor: Arc<dyn TxProcessor>,
    candidates: Arc<dyn CandidateLoader>,
    signer: KeyPair,
}

impl BlockAssembler {
    pub fn new(
        dm: Arc<DeputyManager>,
        processor: Arc<dyn TxProcessor>,
        candidates: Arc<dyn CandidateLoader>,
        signer: KeyPair,
    ) -> BlockAssembler {
        BlockAssembler {
            dm,
            processor,
            candidates,
            signer,
        }
    }

    /// Prepare an unsigned header on top of `parent` for the local miner.
    ///
    /// Fails with `NotDeputy` when the local key is not on the committee at
    /// the new height.
    pub fn prepare_header(
        &self,
        parent: &BlockHeader,
        extra: String,
        now: u32,
    ) -> Result<BlockHeader, ConsensusError> {
        let height = parent.height + 1;
        let me = self
            .dm
            .deputy_by_node_id(height, &self.signer.node_id())
            .ok_or(ConsensusError::NotDeputy)?;
        Ok(BlockHeader {
            parent_hash: parent.hash(),
            miner_address: me.miner_address,
            height,
            gas_limit: calc_gas_limit(parent, self.dm.params()),
            time: now.max(parent.time),
            extra,
            ..BlockHeader::default()
        })
    }

    /// Mine a block on top of `parent` from the given candidates.
    ///
    /// Returns the sealed, signed block and the transactions rejected as
    /// invalid. Execution respects `time_budget` as a soft deadline and the
    /// `cancel` flag, both honoured at transaction boundaries.
    pub fn mine_block(
        &self,
        parent: &Block,
        candidate_txs: Vec<Transaction>,
        am: &mut AccountManager,
        time_budget: Duration,
        cancel: &AtomicBool,
        now: u32,
    ) -> Result<(Block, Vec<Transaction>), ConsensusError> {
        let header = self.prepare_header(&parent.header, String::new(), now)?;
        let deadline = Instant::now() + time_budget;

        let (mut product, rejected) = if self.dm.params().is_snapshot_height(header.height) {
            // Snapshot blocks carry no transactions.
            (TxsProduct::default(), Vec::new())
        } else {
            self.processor
                .apply_candidates(&header, candidate_txs, am, Some(deadline), cancel)
        };

        self.finalize(&header, am)?;
        product.version_root = am.finalise()?;
        product.change_logs = am.change_logs().to_vec();

        let mut block = self.seal(header, &product, Vec::new())?;
        block.header.sign(&self.signer);
        info!(
            height = block.height(),
            hash = %block.hash(),
            txs = block.txs.len(),
            rejected = rejected.len(),
            gas_used = block.header.gas_used,
            "mined block"
        );
        Ok((block, rejected))
    }

    /// Re-execute a received block against the parent state and return the
    /// block that execution produces; the validator compares it against the
    /// received one.
    pub fn run_block(
        &self,
        raw: &Block,
        am: &mut AccountManager,
    ) -> Result<Block, ConsensusError> {
        let mut product = if self.dm.params().is_snapshot_height(raw.height()) {
            TxsProduct::default()
        } else {
            self.processor.apply(&raw.header, &raw.txs, am)?
        };

        self.finalize(&raw.header, am)?;
        product.version_root = am.finalise()?;
        product.change_logs = am.change_logs().to_vec();

        // Carry the producer's header fields; sealing recomputes the roots.
        let header = BlockHeader {
            parent_hash: raw.header.parent_hash,
            miner_address: raw.header.miner_address,
            height: raw.header.height,
            gas_limit: raw.header.gas_limit,
            time: raw.header.time,
            sign_data: raw.header.sign_data,
            extra: raw.header.extra.clone(),
            ..BlockHeader::default()
        };
        self.seal(header, &product, raw.confirms.clone())
    }

    /// Term-boundary state transitions for the block at `header.height`,
    /// then nothing — the caller runs `am.finalise()` to realise roots.
    ///
    /// - at `k·T`: snapshot the next committee from the candidate tally
    /// - at `k·T + I + 1 − reward_check_height`: warn when the closing
    ///   term's reward is still unset (non-fatal)
    /// - at `k·T + I + 1`: pay the closing term's reward and refund
    ///   deposits for candidates that unregistered during it
    pub fn finalize(
        &self,
        header: &BlockHeader,
        am: &mut AccountManager,
    ) -> Result<(), ConsensusError> {
        let params = self.dm.params().clone();
        let height = header.height;

        if params.is_snapshot_height(height) {
            let term = height / params.term_duration;
            let nodes = self.candidates.load_top(&header.parent_hash);
            debug!(height, term, candidates = nodes.len(), "term snapshot");
            self.dm.save_snapshot(term, nodes);
        }

        if is_reward_check_height(height, &params) {
            let term = (height + params.reward_check_height) / params.term_duration - 1;
            if load_term_reward(am, &params, term)?.is_none() {
                warn!(
                    term,
                    height, "term reward not yet configured, payout will be skipped"
                );
            }
        }

        if is_reward_height(height, &params) {
            let closing_term = height / params.term_duration - 1;
            self.issue_term_reward(closing_term, am, &params)?;
            self.refund_deposits(height, am, &params)?;
        }

        Ok(())
    }

    fn issue_term_reward(
        &self,
        term: u32,
        am: &mut AccountManager,
        params: &ChainParams,
    ) -> Result<(), ConsensusError> {
        let total = match load_term_reward(am, params, term)? {
            Some(total) if total > 0 => total,
            _ => {
                warn!(term, "no reward configured, skipping payout");
                return Ok(());
            }
        };
        let committee = self
            .dm
            .committee_of_term(term)
            .unwrap_or_else(|| self.dm.committee_at(params.reward_height(term) - 1));

        let salaries = calculate_salaries(total, &committee, params.reward_precision);
        let mut paid: u128 = 0;
        for salary in &salaries {
            if salary.salary == 0 {
                continue;
            }
            let balance = am.balance(salary.payout);
            am.set_balance(salary.payout, balance + salary.salary);
            paid += salary.salary;
        }
        let pool = params.reward_pool_address;
        let pool_balance = am.balance(pool);
        am.set_balance(pool, pool_balance.saturating_sub(paid));
        info!(term, total, paid, deputies = salaries.len(), "term reward issued");
        Ok(())
    }

    fn refund_deposits(
        &self,
        height: u32,
        am: &mut AccountManager,
        params: &ChainParams,
    ) -> Result<(), ConsensusError> {
        let refunds = self.candidates.load_refunds(height)?;
        for addr in refunds {
            let deposit = am
                .account(addr)
                .candidate_state(KEY_DEPOSIT_AMOUNT)
                .and_then(|raw| raw.parse::<u128>().ok())
                .unwrap_or(0);
            if deposit > 0 {
                let balance = am.balance(addr);
                am.set_balance(addr, balance + deposit);
                let pool = params.deposit_pool_address;
                let pool_balance = am.balance(pool);
                am.set_balance(pool, pool_balance.saturating_sub(deposit));
            }
            am.set_candidate_state(addr, KEY_DEPOSIT_AMOUNT, None);
            am.set_candidate_state(addr, KEY_IS_CANDIDATE, None);
            am.set_votes(addr, 0);
            debug!(address = %addr, deposit, "candidate deposit refunded");
        }
        Ok(())
    }

    /// Seal a header and execution product into a block.
    ///
    /// Snapshot blocks get an empty body, the empty-trie roots and the
    /// committee embedded with its Merkle root; normal blocks take their
    /// roots from the product. Sealing is pure: sealing twice without
    /// re-execution yields identical roots.
    pub fn seal(
        &self,
        mut header: BlockHeader,
        product: &TxsProduct,
        confirms: Vec<SignData>,
    ) -> Result<Block, ConsensusError> {
        let params = self.dm.params();
        if params.is_snapshot_height(header.height) {
            let term = header.height / params.term_duration;
            // Sealing a snapshot without its candidates recorded means
            // finalize was skipped.
            let deputies = self.dm.candidates_of_term(term).ok_or_else(|| {
                ConsensusError::Store(format!("no committee recorded for term {term}"))
            })?;
            let record = TermRecord::new(term, deputies);
            header.version_root = product.version_root;
            header.tx_root = EMPTY_TRIE_HASH;
            header.log_root = EMPTY_TRIE_HASH;
            header.gas_used = 0;
            header.deputy_root = Some(record.merkle_root());
            let mut block = Block::new(header, Vec::new(), Vec::new());
            block.deputies = Some(record.nodes);
            return Ok(block);
        }

        header.version_root = product.version_root;
        header.tx_root = tx_root(&product.txs);
        header.log_root = change_log_root(&product.change_logs);
        header.gas_used = product.gas_used;
        let mut block = Block::new(header, product.txs.clone(), product.change_logs.clone());
        block.confirms = confirms;
        Ok(block)
    }
}

/// Gas limit for a child of `parent`: bounded drift toward the target.
fn calc_gas_limit(parent: &BlockHeader, params: &ChainParams) -> u64 {
    if parent.gas_limit == 0 {
        return params.target_gas_limit;
    }
    let decay = parent.gas_limit / 1024;
    let contrib = (parent.gas_used + parent.gas_used / 2) / 1024;
    let mut limit = parent.gas_limit.saturating_sub(decay) + contrib;
    if limit < params.target_gas_limit {
        limit = (parent.gas_limit + decay).min(params.target_gas_limit);
    }
    limit.max(params.min_gas_limit)
}

fn is_reward_height(height: u32, params: &ChainParams) -> bool {
    height > params.term_duration
        && height % params.term_duration == params.interim_duration + 1
}

fn is_reward_check_height(height: u32, params: &ChainParams) -> bool {
    let shifted = height + params.reward_check_height;
    shifted > params.term_duration
        && shifted % params.term_duration == params.interim_duration + 1
        // The check block and the reward block must not coincide.
        && params.reward_check_height != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChainParams {
        ChainParams {
            term_duration: 100,
            interim_duration: 10,
            reward_check_height: 5,
            ..ChainParams::default()
        }
    }

    #[test]
    fn gas_limit_seeds_from_target() {
        let parent = BlockHeader::default();
        assert_eq!(calc_gas_limit(&parent, &params()), params().target_gas_limit);
    }

    #[test]
    fn gas_limit_decays_when_idle() {
        let p = params();
        let parent = BlockHeader {
            gas_limit: p.target_gas_limit + 100_000_000,
            gas_used: 0,
            ..BlockHeader::default()
        };
        let limit = calc_gas_limit(&parent, &p);
        assert!(limit < parent.gas_limit);
        assert!(limit > p.target_gas_limit);
    }

    #[test]
    fn gas_limit_grows_under_load() {
        let p = params();
        let parent = BlockHeader {
            gas_limit: p.target_gas_limit + 100_000_000,
            gas_used: p.target_gas_limit + 100_000_000,
            ..BlockHeader::default()
        };
        assert!(calc_gas_limit(&parent, &p) > parent.gas_limit);
    }

    #[test]
    fn reward_heights_fire_once_per_term() {
        let p = params();
        // Term 1 reward block: 100 + 10 + 1.
        assert!(is_reward_height(111, &p));
        assert!(is_reward_height(211, &p));
        assert!(!is_reward_height(11, &p)); // term 0 has no predecessor
        assert!(!is_reward_height(110, &p));
        assert!(!is_reward_height(112, &p));

        // Check block runs reward_check_height blocks earlier.
        assert!(is_reward_check_height(106, &p));
        assert!(!is_reward_check_height(111, &p));
        assert!(!is_reward_check_height(6, &p));
    }
}
