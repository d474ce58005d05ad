//! Committee lookup and slot-distance arithmetic.

use crate::term::TermRecord;
use cadence_types::{Address, ChainParams, DeputyNode, NodeId};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Maintains the committee snapshots, indexed by term.
///
/// Many readers, rare writers: a new record lands once per term, lookups
/// happen on every block. Records are immutable after insertion.
pub struct DeputyManager {
    params: ChainParams,
    /// Term records, term-index ascending. Never empty: construction seeds
    /// the genesis term.
    terms: RwLock<Vec<TermRecord>>,
}

impl DeputyManager {
    /// Create a manager with the genesis committee as term 0.
    pub fn new(params: ChainParams, genesis: Vec<DeputyNode>) -> DeputyManager {
        DeputyManager {
            params,
            terms: RwLock::new(vec![TermRecord::new(0, genesis)]),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Record the committee snapshotted for `term_index`. Replacing an
    /// existing term is ignored; records are immutable once written.
    pub fn save_snapshot(&self, term_index: u32, nodes: Vec<DeputyNode>) {
        let mut terms = self.terms.write();
        if terms.iter().any(|record| record.term_index == term_index) {
            warn!(term_index, "term snapshot already recorded, ignoring");
            return;
        }
        debug!(term_index, deputies = nodes.len(), "term snapshot recorded");
        terms.push(TermRecord::new(term_index, nodes));
        terms.sort_by_key(|record| record.term_index);
    }

    /// The committee authoritative at `height`, truncated to the committee
    /// size cap. Falls back to the newest known term when the exact record
    /// is missing (e.g. replaying past a gap).
    pub fn committee_at(&self, height: u32) -> Vec<DeputyNode> {
        let wanted = self.params.term_index_at(height);
        let terms = self.terms.read();
        let record = terms
            .iter()
            .rev()
            .find(|record| record.term_index <= wanted)
            .or_else(|| terms.first())
            .expect("manager always holds the genesis term");
        let cap = self.params.max_deputy_count.min(record.nodes.len());
        record.nodes[..cap].to_vec()
    }

    /// Full candidate list of the term at `height`, without the size cap.
    pub fn term_candidates_at(&self, height: u32) -> Vec<DeputyNode> {
        let wanted = self.params.term_index_at(height);
        let terms = self.terms.read();
        terms
            .iter()
            .rev()
            .find(|record| record.term_index <= wanted)
            .or_else(|| terms.first())
            .map(|record| record.nodes.clone())
            .unwrap_or_default()
    }

    /// Committee size at `height`.
    pub fn deputy_count(&self, height: u32) -> usize {
        self.committee_at(height).len()
    }

    /// The capped committee recorded for one specific term, if known.
    pub fn committee_of_term(&self, term_index: u32) -> Option<Vec<DeputyNode>> {
        let terms = self.terms.read();
        terms
            .iter()
            .find(|record| record.term_index == term_index)
            .map(|record| {
                let cap = self.params.max_deputy_count.min(record.nodes.len());
                record.nodes[..cap].to_vec()
            })
    }

    /// The full candidate list recorded for one specific term, uncapped.
    pub fn candidates_of_term(&self, term_index: u32) -> Option<Vec<DeputyNode>> {
        let terms = self.terms.read();
        terms
            .iter()
            .find(|record| record.term_index == term_index)
            .map(|record| record.nodes.clone())
    }

    /// Find a committee member at `height` by miner address.
    pub fn deputy_by_address(&self, height: u32, addr: Address) -> Option<DeputyNode> {
        self.committee_at(height)
            .into_iter()
            .find(|node| node.miner_address == addr)
    }

    /// Find a committee member at `height` by node id.
    pub fn deputy_by_node_id(&self, height: u32, node_id: &NodeId) -> Option<DeputyNode> {
        self.committee_at(height)
            .into_iter()
            .find(|node| node.node_id == *node_id)
    }

    /// Whether `node_id` sits on the committee at `height`.
    pub fn is_deputy(&self, height: u32, node_id: &NodeId) -> bool {
        self.deputy_by_node_id(height, node_id).is_some()
    }

    /// Rotational slot gap from the producer of the parent block to the
    /// producer of the block at `height`.
    ///
    /// - the first block of a term starts a fresh rotation: `rank(next) + 1`
    /// - a committee of one always yields 1
    /// - an unknown producer yields -1
    /// - otherwise `(rank(next) − rank(prev) + N) mod N`
    pub fn slot_distance(&self, height: u32, prev_miner: Address, next_miner: Address) -> i64 {
        let next = self.deputy_by_address(height, next_miner);
        if self.params.is_term_start(height) {
            if let Some(next) = next {
                debug!(height, rank = next.rank, "term start, fresh rotation");
                return i64::from(next.rank) + 1;
            }
        }
        let (prev, next) = match (self.deputy_by_address(height, prev_miner), next) {
            (Some(prev), Some(next)) => (prev, next),
            _ => return -1,
        };
        let count = self.deputy_count(height) as i64;
        if count == 1 {
            return 1;
        }
        (i64::from(next.rank) - i64::from(prev.rank) + count) % count
    }
}
