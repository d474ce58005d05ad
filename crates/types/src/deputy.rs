//! Deputy and candidate node records.

use crate::address::{Address, NodeId};
use crate::hash::{hash_of, Hash};
use crate::merkle::merkle_root;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Candidate profile key: `"1"` while registered, cleared on unregister.
pub const KEY_IS_CANDIDATE: &str = "is_candidate";
/// Candidate profile key: deposit locked at registration, decimal string.
pub const KEY_DEPOSIT_AMOUNT: &str = "deposit_amount";
/// Candidate profile key: optional hex address receiving block rewards.
pub const KEY_INCOME_ADDRESS: &str = "income_address";

/// A committee member for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeputyNode {
    /// Address credited for blocks this deputy produces.
    pub miner_address: Address,
    /// Reward payout target when set and parseable; falls back to
    /// `miner_address` otherwise.
    pub income_address: Option<Address>,
    /// Public key the deputy signs headers and confirms with.
    pub node_id: NodeId,
    /// Position in the committee rotation, dense from 0.
    pub rank: u16,
    /// Votes backing this deputy at snapshot time.
    pub votes: u128,
}

/// Malformed deputy record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeputyError {
    #[error("deputy rank {0} duplicated in committee")]
    DuplicateRank(u16),
}

impl DeputyNode {
    /// Content hash of this record, used as a Merkle leaf in the snapshot
    /// block's deputy root.
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }
}

/// Merkle root over an ordered committee, embedded in snapshot headers.
pub fn deputy_root(nodes: &[DeputyNode]) -> Hash {
    let leaves: Vec<Hash> = nodes.iter().map(DeputyNode::hash).collect();
    merkle_root(&leaves)
}

/// Check rank uniqueness across a committee.
pub fn check_committee(nodes: &[DeputyNode]) -> Result<(), DeputyError> {
    for (i, node) in nodes.iter().enumerate() {
        if nodes[..i].iter().any(|other| other.rank == node.rank) {
            return Err(DeputyError::DuplicateRank(node.rank));
        }
    }
    Ok(())
}

/// A registered candidate as reported by the vote tally, before ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNode {
    pub miner_address: Address,
    pub node_id: NodeId,
    pub total_votes: u128,
}

impl CandidateNode {
    /// Promote the top candidates into a ranked committee, rank following
    /// the input order (callers sort by votes descending first).
    pub fn into_deputies(candidates: Vec<CandidateNode>) -> Vec<DeputyNode> {
        candidates
            .into_iter()
            .enumerate()
            .map(|(rank, candidate)| DeputyNode {
                miner_address: candidate.miner_address,
                income_address: None,
                node_id: candidate.node_id,
                rank: rank as u16,
                votes: candidate.total_votes,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deputy(rank: u16, votes: u128) -> DeputyNode {
        DeputyNode {
            miner_address: Address([rank as u8 + 1; 20]),
            income_address: None,
            node_id: NodeId([rank as u8 + 1; 64]),
            rank,
            votes,
        }
    }

    #[test]
    fn hash_changes_with_votes() {
        let a = deputy(0, 100);
        let mut b = a.clone();
        b.votes = 101;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn root_is_order_sensitive() {
        let nodes = vec![deputy(0, 100), deputy(1, 50), deputy(2, 50)];
        let mut reversed = nodes.clone();
        reversed.reverse();
        assert_ne!(deputy_root(&nodes), deputy_root(&reversed));
    }

    #[test]
    fn duplicate_rank_rejected() {
        let nodes = vec![deputy(0, 1), deputy(0, 2)];
        assert_eq!(
            check_committee(&nodes),
            Err(DeputyError::DuplicateRank(0))
        );
    }

    #[test]
    fn candidates_rank_in_order() {
        let candidates = vec![
            CandidateNode {
                miner_address: Address([9; 20]),
                node_id: NodeId([9; 64]),
                total_votes: 500,
            },
            CandidateNode {
                miner_address: Address([8; 20]),
                node_id: NodeId([8; 64]),
                total_votes: 100,
            },
        ];
        let deputies = CandidateNode::into_deputies(candidates);
        assert_eq!(deputies[0].rank, 0);
        assert_eq!(deputies[0].votes, 500);
        assert_eq!(deputies[1].rank, 1);
    }
}
