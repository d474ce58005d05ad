//! Confirm application and stable promotion.

use crate::cache::ConfirmCache;
use crate::error::ConsensusError;
use crate::traits::Store;
use crate::validator::Validator;
use cadence_deputy::DeputyManager;
use cadence_types::{Block, ConfirmData, Hash};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Collects confirm signatures, applies them to local blocks and promotes
/// blocks to stable once a quorum of committee members signed.
///
/// Quorum counts the miner: a block is stable when
/// `confirms + 1 ≥ ⌊2·N/3⌋ + 1` for a committee of `N`.
pub struct FinalityTracker {
    store: Arc<dyn Store>,
    dm: Arc<DeputyManager>,
    cache: ConfirmCache,
    stable_height: AtomicU32,
    stable_hash: Mutex<Hash>,
}

impl FinalityTracker {
    /// Track finality from the store's current stable block.
    pub fn new(store: Arc<dyn Store>, dm: Arc<DeputyManager>) -> FinalityTracker {
        let stable = store.stable();
        let tracker = FinalityTracker {
            store,
            dm,
            cache: ConfirmCache::new(),
            stable_height: AtomicU32::new(stable.height()),
            stable_hash: Mutex::new(stable.hash()),
        };
        tracker.cache.clear(stable.height());
        tracker
    }

    /// The stable height; monotonically non-decreasing.
    pub fn stable_height(&self) -> u32 {
        self.stable_height.load(Ordering::Acquire)
    }

    pub fn stable_hash(&self) -> Hash {
        *self.stable_hash.lock()
    }

    /// Signers (confirms plus miner) required to make `height` stable.
    pub fn quorum(&self, height: u32) -> usize {
        self.dm.deputy_count(height) * 2 / 3 + 1
    }

    /// Buffered out-of-order confirms, exposed for pruning stats.
    pub fn cached_confirms(&self) -> usize {
        self.cache.len()
    }

    /// Apply a received confirm.
    ///
    /// For a local block the signature is validated and persisted; for an
    /// unknown block it is buffered until the block arrives. Returns the
    /// block that became stable, if promotion happened.
    pub fn insert_confirm(
        &self,
        validator: &Validator,
        data: &ConfirmData,
    ) -> Result<Option<Block>, ConsensusError> {
        if data.height <= self.stable_height() {
            debug!(height = data.height, "confirm at stable height, ignored");
            return Ok(None);
        }

        let Some(mut block) = self.store.block(&data.hash) else {
            debug!(height = data.height, hash = %data.hash, "confirm buffered, block not local");
            self.cache.push(data);
            return Ok(None);
        };

        if block.is_confirm_exist(&data.sign_data) {
            return Err(ConsensusError::DuplicateConfirm);
        }
        let (accepted, err) = validator.verify_new_confirms(&block, &[data.sign_data]);
        if accepted.is_empty() {
            return Err(err.unwrap_or(ConsensusError::DuplicateConfirm));
        }
        block.confirms.extend(accepted);
        self.store
            .update_confirms(&data.hash, block.confirms.clone())?;
        self.try_promote(&block)
    }

    /// A block just became local: fold in any confirms that arrived ahead
    /// of it, then check for promotion. Returns the newly stable block, if
    /// any.
    pub fn on_block_inserted(
        &self,
        validator: &Validator,
        block: &mut Block,
    ) -> Result<Option<Block>, ConsensusError> {
        let buffered = self.cache.pop(block.height(), &block.hash());
        if !buffered.is_empty() {
            let (accepted, _) = validator.verify_new_confirms(block, &buffered);
            if !accepted.is_empty() {
                debug!(
                    height = block.height(),
                    merged = accepted.len(),
                    "merged buffered confirms into arriving block"
                );
                block.confirms.extend(accepted);
                self.store
                    .update_confirms(&block.hash(), block.confirms.clone())?;
            }
        }
        self.try_promote(block)
    }

    /// Promote `block` if it has its quorum and sits above stable.
    fn try_promote(&self, block: &Block) -> Result<Option<Block>, ConsensusError> {
        if block.height() <= self.stable_height() {
            return Ok(None);
        }
        let quorum = self.quorum(block.height());
        if block.signer_count() < quorum {
            return Ok(None);
        }

        self.store.set_stable(&block.hash())?;
        // Monotonic advance; a racing promotion of a higher block wins.
        self.stable_height
            .fetch_max(block.height(), Ordering::AcqRel);
        *self.stable_hash.lock() = block.hash();
        self.cache.clear(block.height());
        info!(
            height = block.height(),
            hash = %block.hash(),
            signers = block.signer_count(),
            quorum,
            "block promoted to stable"
        );
        Ok(Some(block.clone()))
    }
}
