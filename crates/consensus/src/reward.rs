//! Term reward distribution.
//!
//! All integer math. For a term pool `R`, committee of `N` deputies with
//! votes `v_i` (total `V`) and precision `p`:
//!
//! ```text
//! V == 0:  salary_i = ⌊R / N⌋ floored to a multiple of p
//! V  > 0:  salary_i = ⌊R·v_i / V⌋ floored to a multiple of p
//! ```
//!
//! The residue stays in the reward pool.

use crate::error::ConsensusError;
use cadence_account::AccountManager;
use cadence_types::{keccak256, AccountReader, Address, ChainParams, DeputyNode, Hash};
use std::collections::BTreeMap;
use tracing::debug;

/// One deputy's payout for a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeputySalary {
    /// Where the salary goes: the deputy's income address when set, the
    /// miner address otherwise.
    pub payout: Address,
    pub salary: u128,
}

/// Split `total` across the committee proportionally to votes.
pub fn calculate_salaries(
    total: u128,
    deputies: &[DeputyNode],
    precision: u128,
) -> Vec<DeputySalary> {
    let precision = precision.max(1);
    let count = deputies.len() as u128;
    if count == 0 {
        return Vec::new();
    }
    let total_votes: u128 = deputies.iter().map(|deputy| deputy.votes).sum();

    deputies
        .iter()
        .map(|deputy| {
            let raw = if total_votes == 0 {
                total / count
            } else {
                // R·v/V, falling back to per-vote units if the product
                // would overflow 128 bits.
                total
                    .checked_mul(deputy.votes)
                    .map(|product| product / total_votes)
                    .unwrap_or_else(|| (total / total_votes).saturating_mul(deputy.votes))
            };
            DeputySalary {
                payout: deputy.income_address.unwrap_or(deputy.miner_address),
                salary: raw - raw % precision,
            }
        })
        .collect()
}

/// Storage slot in the reward pool account holding the term → reward table.
pub fn reward_storage_key(pool: &Address) -> Hash {
    keccak256(pool.as_bytes())
}

/// Read the reward configured for `term` from the reward pool's storage.
///
/// The table is a JSON object mapping term index to amount. A missing slot
/// or missing entry yields `None` (no reward configured); a malformed
/// payload is an error and rejects the block.
pub fn load_term_reward(
    am: &mut AccountManager,
    params: &ChainParams,
    term: u32,
) -> Result<Option<u128>, ConsensusError> {
    let pool = params.reward_pool_address;
    let key = reward_storage_key(&pool);
    let raw = match am.account(pool).storage_state(&key) {
        Some(bytes) => bytes.to_vec(),
        None => return Ok(None),
    };
    let table: BTreeMap<u32, u128> = serde_json::from_slice(&raw)
        .map_err(|err| ConsensusError::RewardDataCorrupt(err.to_string()))?;
    debug!(term, configured = table.len(), "loaded term reward table");
    Ok(table.get(&term).copied())
}

/// Serialise a reward table into the bytes stored at
/// [`reward_storage_key`]. Test and setup helper.
pub fn encode_reward_table(table: &BTreeMap<u32, u128>) -> Vec<u8> {
    serde_json::to_vec(table).unwrap_or_default()
}
