//! The transfer transaction payload.
//!
//! The sender is not part of the wire payload; it is recovered from the
//! signature, memoised on first access.

use crate::address::Address;
use crate::crypto::{KeyPair, SignData};
use crate::hash::{keccak256, Hash};
use crate::merkle::merkle_root;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Why a transaction was rejected during validation or execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction signed for chain {got}, this chain is {expected}")]
    ChainIdMismatch { expected: u16, got: u16 },

    #[error("transaction expired at {expiration}, block time is {block_time}")]
    Expired { expiration: u64, block_time: u64 },

    #[error("contract creation without code")]
    CreateContractNoData,

    #[error("invalid transaction signature")]
    InvalidSig,

    #[error("intrinsic gas {required} exceeds the transaction gas limit {limit}")]
    IntrinsicGas { required: u64, limit: u64 },

    #[error("sender balance {balance} cannot cover value {required}")]
    InsufficientBalance { balance: u128, required: u128 },

    #[error("block gas limit exhausted")]
    BlockGasExhausted,
}

/// A signed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Recipient; `None` creates a contract and requires non-empty `data`.
    pub to: Option<Address>,
    /// Amount moved to the recipient, in the smallest unit.
    pub amount: u128,
    pub gas_limit: u64,
    pub gas_price: u128,
    /// Unix seconds after which the transaction is invalid.
    pub expiration: u64,
    pub chain_id: u16,
    pub data: Vec<u8>,
    pub sig: SignData,

    #[serde(skip)]
    sender: OnceLock<Address>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash() && self.sig == other.sig
    }
}

impl Eq for Transaction {}

impl Transaction {
    /// Build an unsigned transaction.
    pub fn new(
        to: Option<Address>,
        amount: u128,
        gas_limit: u64,
        gas_price: u128,
        expiration: u64,
        chain_id: u16,
        data: Vec<u8>,
    ) -> Transaction {
        Transaction {
            to,
            amount,
            gas_limit,
            gas_price,
            expiration,
            chain_id,
            data,
            sig: SignData::zero(),
            sender: OnceLock::new(),
        }
    }

    /// Content hash excluding the signature; this is what gets signed.
    pub fn hash(&self) -> Hash {
        keccak256(&crate::canonical_encode(&(
            &self.to,
            self.amount,
            self.gas_limit,
            self.gas_price,
            self.expiration,
            self.chain_id,
            &self.data,
        )))
    }

    /// Sign with `keypair`, returning the signed transaction.
    pub fn signed(mut self, keypair: &KeyPair) -> Transaction {
        self.sig = keypair.sign(&self.hash());
        self.sender = OnceLock::new();
        self
    }

    /// Recover and memoise the sender address.
    pub fn sender(&self) -> Result<Address, TxError> {
        if let Some(cached) = self.sender.get() {
            return Ok(*cached);
        }
        let node_id = self
            .sig
            .recover_node_id(&self.hash())
            .map_err(|_| TxError::InvalidSig)?;
        let addr = node_id.address();
        Ok(*self.sender.get_or_init(|| addr))
    }

    /// Gas consumed before any execution: base cost plus payload bytes.
    pub fn intrinsic_gas(&self, tx_gas: u64, tx_data_gas: u64) -> u64 {
        tx_gas.saturating_add(tx_data_gas.saturating_mul(self.data.len() as u64))
    }

    /// Stateless checks applied at the block boundary.
    pub fn check(&self, chain_id: u16, block_time: u64) -> Result<(), TxError> {
        if self.chain_id != chain_id {
            return Err(TxError::ChainIdMismatch {
                expected: chain_id,
                got: self.chain_id,
            });
        }
        if self.expiration < block_time {
            return Err(TxError::Expired {
                expiration: self.expiration,
                block_time,
            });
        }
        if self.to.is_none() && self.data.is_empty() {
            return Err(TxError::CreateContractNoData);
        }
        Ok(())
    }
}

/// Merkle root over an ordered transaction list, as carried in headers.
pub fn tx_root(txs: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = txs.iter().map(Transaction::hash).collect();
    merkle_root(&leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_keypair;

    fn transfer(keypair: &KeyPair) -> Transaction {
        Transaction::new(
            Some(Address([2; 20])),
            5,
            21_000,
            0,
            2_000_000_000,
            1,
            Vec::new(),
        )
        .signed(keypair)
    }

    #[test]
    fn sender_recovers_signer() {
        let kp = test_keypair(1);
        let tx = transfer(&kp);
        assert_eq!(tx.sender().unwrap(), kp.node_id().address());
        // Memoised second read.
        assert_eq!(tx.sender().unwrap(), kp.node_id().address());
    }

    #[test]
    fn hash_excludes_signature() {
        let kp = test_keypair(1);
        let unsigned = Transaction::new(
            Some(Address([2; 20])),
            5,
            21_000,
            0,
            2_000_000_000,
            1,
            Vec::new(),
        );
        let hash = unsigned.hash();
        assert_eq!(hash, unsigned.signed(&kp).hash());
    }

    #[test]
    fn check_rejects_wrong_chain_and_expiry() {
        let kp = test_keypair(1);
        let tx = transfer(&kp);
        assert!(tx.check(1, 1_000).is_ok());
        assert!(matches!(
            tx.check(2, 1_000),
            Err(TxError::ChainIdMismatch { .. })
        ));
        assert!(matches!(
            tx.check(1, 3_000_000_000),
            Err(TxError::Expired { .. })
        ));
    }

    #[test]
    fn create_without_code_rejected() {
        let tx = Transaction::new(None, 0, 50_000, 0, 2_000_000_000, 1, Vec::new());
        assert_eq!(tx.check(1, 0), Err(TxError::CreateContractNoData));
    }

    #[test]
    fn intrinsic_gas_counts_payload() {
        let tx = Transaction::new(
            Some(Address([2; 20])),
            0,
            100_000,
            0,
            2_000_000_000,
            1,
            vec![0u8; 10],
        );
        assert_eq!(tx.intrinsic_gas(21_000, 68), 21_000 + 680);
    }
}
