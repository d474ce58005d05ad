//! Block headers.

use crate::address::{Address, NodeId};
use crate::crypto::{CryptoError, KeyPair, SignData};
use crate::hash::{keccak256, Hash};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A block header.
///
/// The header hash excludes `sign_data` so signing is well-defined: the miner
/// hashes the header, signs the hash, then stores the signature in
/// `sign_data`. Verifiers recover the signer from `(hash, sign_data)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: Hash,
    pub miner_address: Address,
    /// Root of the account version trie after this block.
    pub version_root: Hash,
    pub tx_root: Hash,
    pub log_root: Hash,
    pub height: u32,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Seconds since the Unix epoch.
    pub time: u32,
    pub sign_data: SignData,
    /// Merkle root of the next committee; set only on snapshot blocks.
    pub deputy_root: Option<Hash>,
    /// Free-form miner data, at most 256 bytes.
    pub extra: String,

    #[serde(skip)]
    pub signer: OnceLock<NodeId>,
}

impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        // The memoised signer is derived state and never part of identity.
        self.hash() == other.hash() && self.sign_data == other.sign_data
    }
}

impl Eq for BlockHeader {}

impl BlockHeader {
    /// Header hash over the canonical preimage, excluding `sign_data`.
    pub fn hash(&self) -> Hash {
        keccak256(&crate::canonical_encode(&(
            &self.parent_hash,
            &self.miner_address,
            &self.version_root,
            &self.tx_root,
            &self.log_root,
            self.height,
            self.gas_limit,
            self.gas_used,
            self.time,
            &self.deputy_root,
            &self.extra,
        )))
    }

    /// Sign this header in place with the miner's key.
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.sign_data = keypair.sign(&self.hash());
        self.signer = OnceLock::new();
    }

    /// Recover the node id that signed this header, memoised after the
    /// first successful recovery.
    pub fn signer_node_id(&self) -> Result<NodeId, CryptoError> {
        if let Some(cached) = self.signer.get() {
            return Ok(*cached);
        }
        let recovered = self.sign_data.recover_node_id(&self.hash())?;
        Ok(*self.signer.get_or_init(|| recovered))
    }
}
