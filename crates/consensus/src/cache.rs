//! Buffers for out-of-order arrivals: confirms for unknown blocks and
//! blocks with unknown parents.

use cadence_types::{Block, ConfirmData, Hash, SignData};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Confirm signatures for blocks that are not local yet.
///
/// Two-level map `height → hash → signatures`, bounded from below by the
/// stable height: inserts at or under it are dropped, and promotion clears
/// everything it makes irrelevant.
#[derive(Default)]
pub struct ConfirmCache {
    inner: Mutex<ConfirmCacheInner>,
}

#[derive(Default)]
struct ConfirmCacheInner {
    cache: BTreeMap<u32, HashMap<Hash, Vec<SignData>>>,
    /// Heights at or below this are gone for good.
    floor: u32,
}

impl ConfirmCache {
    pub fn new() -> ConfirmCache {
        ConfirmCache::default()
    }

    /// Buffer a confirm. Dropped when its height is already stable.
    pub fn push(&self, data: &ConfirmData) {
        let mut inner = self.inner.lock();
        if data.height <= inner.floor {
            trace!(height = data.height, "confirm below stable, dropped");
            return;
        }
        inner
            .cache
            .entry(data.height)
            .or_default()
            .entry(data.hash)
            .or_default()
            .push(data.sign_data);
    }

    /// Take all buffered confirms for `(height, hash)`.
    pub fn pop(&self, height: u32, hash: &Hash) -> Vec<SignData> {
        let mut inner = self.inner.lock();
        let Some(by_hash) = inner.cache.get_mut(&height) else {
            return Vec::new();
        };
        by_hash.remove(hash).unwrap_or_default()
    }

    /// Drop everything at or below `height` and refuse such inserts from
    /// now on.
    pub fn clear(&self, height: u32) {
        let mut inner = self.inner.lock();
        inner.floor = inner.floor.max(height);
        inner.cache = inner.cache.split_off(&(height + 1));
    }

    /// Number of buffered signatures, across all heights.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .cache
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Orphan buffer: blocks whose parent is not local yet, height-ascending.
#[derive(Default)]
pub struct BlockCache {
    cache: Mutex<BTreeMap<u32, Vec<Block>>>,
}

impl BlockCache {
    pub fn new() -> BlockCache {
        BlockCache::default()
    }

    pub fn add(&self, block: Block) {
        let mut cache = self.cache.lock();
        let bucket = cache.entry(block.height()).or_default();
        if !bucket.iter().any(|cached| cached.hash() == block.hash()) {
            bucket.push(block);
        }
    }

    /// Visit buffered blocks in height order; the callback returns true to
    /// claim a block, which removes it from the buffer.
    pub fn iterate(&self, mut callback: impl FnMut(&Block) -> bool) {
        let mut cache = self.cache.lock();
        for bucket in cache.values_mut() {
            bucket.retain(|block| !callback(block));
        }
        cache.retain(|_, bucket| !bucket.is_empty());
    }

    /// Drop everything at or below `height`.
    pub fn clear(&self, height: u32) {
        let mut cache = self.cache.lock();
        *cache = cache.split_off(&(height + 1));
    }

    pub fn len(&self) -> usize {
        self.cache.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
