//! Chain-wide consensus parameters.
//!
//! Everything that used to be a process-wide constant is carried explicitly
//! so tests can shrink terms and committees to a handful of blocks.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// Consensus parameters threaded through every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    /// Chain identifier checked against every transaction.
    pub chain_id: u16,

    /// Blocks per term. A snapshot block embedding the next committee is
    /// sealed at every multiple of this height.
    pub term_duration: u32,

    /// Blocks between a term snapshot and the new committee taking over.
    pub interim_duration: u32,

    /// Committee size cap. Snapshots may store more candidates; consensus
    /// uses the first `max_deputy_count` by rank.
    pub max_deputy_count: usize,

    /// How many candidates a term snapshot records.
    pub snapshot_candidate_count: usize,

    /// Per-slot production window in milliseconds.
    pub timeout_ms: u64,

    /// Blocks before the reward height at which a missing term reward is
    /// logged. Must not exceed `interim_duration`.
    pub reward_check_height: u32,

    /// Minimum payout granularity; salaries round down to a multiple of this.
    pub reward_precision: u128,

    /// Account whose storage holds the term → reward table.
    pub reward_pool_address: Address,

    /// Account holding candidate deposits until refund.
    pub deposit_pool_address: Address,

    /// Gas limit ceiling drift target.
    pub target_gas_limit: u64,

    /// Gas limit floor.
    pub min_gas_limit: u64,

    /// Base gas charged per transaction.
    pub tx_gas: u64,

    /// Gas charged per byte of transaction payload.
    pub tx_data_gas: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams {
            chain_id: 1,
            term_duration: 1_000_000,
            interim_duration: 1_000,
            max_deputy_count: 5,
            snapshot_candidate_count: 30,
            timeout_ms: 10_000,
            reward_check_height: 100,
            reward_precision: 1_000_000_000_000_000_000,
            reward_pool_address: Address([0x01; 20]),
            deposit_pool_address: Address([0x02; 20]),
            target_gas_limit: 105_000_000,
            min_gas_limit: 5_000,
            tx_gas: 21_000,
            tx_data_gas: 68,
        }
    }
}

impl ChainParams {
    /// Whether `height` seals a term snapshot (genesis is not a snapshot).
    pub fn is_snapshot_height(&self, height: u32) -> bool {
        height > 0 && height % self.term_duration == 0
    }

    /// Whether `height` is the first block produced by a fresh committee.
    pub fn is_term_start(&self, height: u32) -> bool {
        height == 1
            || (height > self.term_duration
                && height % self.term_duration == self.interim_duration + 1)
    }

    /// The term whose committee is authoritative at `height`.
    pub fn term_index_at(&self, height: u32) -> u32 {
        if height <= self.interim_duration {
            0
        } else {
            (height - self.interim_duration - 1) / self.term_duration
        }
    }

    /// Height at which term `k`'s reward (for term `k − 1`) is paid out.
    pub fn reward_height(&self, term: u32) -> u32 {
        term * self.term_duration + self.interim_duration + 1
    }

    /// A full committee rotation in milliseconds for `deputy_count` slots.
    pub fn one_loop_ms(&self, deputy_count: usize) -> u64 {
        deputy_count as u64 * self.timeout_ms
    }
}
