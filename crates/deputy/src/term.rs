//! One term's committee snapshot.

use cadence_types::{deputy_root, DeputyNode, Hash};
use serde::{Deserialize, Serialize};

/// The committee recorded by the snapshot block of one term.
///
/// Nodes are ordered by rank ascending. Records are immutable once created;
/// the manager only ever appends new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub term_index: u32,
    pub nodes: Vec<DeputyNode>,
}

impl TermRecord {
    pub fn new(term_index: u32, mut nodes: Vec<DeputyNode>) -> TermRecord {
        nodes.sort_by_key(|node| node.rank);
        TermRecord { term_index, nodes }
    }

    /// Merkle root over the member hashes, embedded in the snapshot header.
    pub fn merkle_root(&self) -> Hash {
        deputy_root(&self.nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::test_utils::{test_deputy, test_keypair};

    #[test]
    fn nodes_sorted_by_rank() {
        let kp = test_keypair(1);
        let record = TermRecord::new(
            0,
            vec![
                test_deputy(&kp, 2, 10),
                test_deputy(&kp, 0, 30),
                test_deputy(&kp, 1, 20),
            ],
        );
        let ranks: Vec<u16> = record.nodes.iter().map(|node| node.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn root_matches_types_helper() {
        let kp = test_keypair(1);
        let nodes = vec![test_deputy(&kp, 0, 100), test_deputy(&kp, 1, 50)];
        let record = TermRecord::new(7, nodes.clone());
        assert_eq!(record.merkle_root(), deputy_root(&nodes));
    }
}
