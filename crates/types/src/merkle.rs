//! Binary Merkle root over keccak-256 leaves.

use crate::hash::{keccak256, Hash};

/// Root of the empty trie: keccak-256 of no bytes. Headers use this sentinel
/// for empty transaction and change-log lists.
pub const EMPTY_TRIE_HASH: Hash = Hash([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
]);

/// Compute the Merkle root of a list of leaf hashes.
///
/// Pairs are combined with keccak-256 of the concatenated bytes; an odd node
/// at the end of a level is promoted unchanged. An empty list yields
/// [`EMPTY_TRIE_HASH`], a single leaf is its own root.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return EMPTY_TRIE_HASH;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0].0);
                buf[32..].copy_from_slice(&pair[1].0);
                next.push(keccak256(&buf));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}
