//! The built-in transfer processor.
//!
//! Executes plain value transfers and code deployments against the account
//! engine. Each transaction runs inside its own journal snapshot: a failed
//! transaction unwinds completely and charges nothing.

use crate::error::{BlockIssue, ConsensusError};
use crate::traits::{TxProcessor, TxsProduct};
use cadence_account::AccountManager;
use cadence_types::{
    keccak256, Address, BlockHeader, ChainParams, Transaction, TxError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Transfer-only transaction execution.
pub struct TransferProcessor {
    params: ChainParams,
}

impl TransferProcessor {
    pub fn new(params: ChainParams) -> TransferProcessor {
        TransferProcessor { params }
    }

    /// Execute one transaction; on error the caller reverts the snapshot.
    fn execute(
        &self,
        header: &BlockHeader,
        tx: &Transaction,
        am: &mut AccountManager,
        gas_used: u64,
    ) -> Result<u64, TxError> {
        tx.check(self.params.chain_id, u64::from(header.time))?;
        let sender = tx.sender()?;

        let gas = tx.intrinsic_gas(self.params.tx_gas, self.params.tx_data_gas);
        if gas > tx.gas_limit {
            return Err(TxError::IntrinsicGas {
                required: gas,
                limit: tx.gas_limit,
            });
        }
        if gas_used.saturating_add(gas) > header.gas_limit {
            return Err(TxError::BlockGasExhausted);
        }

        let fee = u128::from(gas).saturating_mul(tx.gas_price);
        let need = tx.amount.saturating_add(fee);
        let sender_balance = am.balance(sender);
        if sender_balance < need {
            return Err(TxError::InsufficientBalance {
                balance: sender_balance,
                required: need,
            });
        }

        am.set_balance(sender, sender_balance - need);
        match tx.to {
            Some(to) => {
                let to_balance = am.balance(to);
                am.set_balance(to, to_balance + tx.amount);
            }
            None => {
                // Deployment: the new account's address derives from the
                // sender and the transaction hash.
                let contract = contract_address(&sender, tx);
                am.set_code(contract, tx.data.clone());
                let balance = am.balance(contract);
                am.set_balance(contract, balance + tx.amount);
            }
        }
        if fee > 0 {
            let miner_balance = am.balance(header.miner_address);
            am.set_balance(header.miner_address, miner_balance + fee);
        }
        trace!(sender = %sender, amount = tx.amount, gas, "transaction applied");
        Ok(gas)
    }
}

impl TxProcessor for TransferProcessor {
    fn apply(
        &self,
        header: &BlockHeader,
        txs: &[Transaction],
        am: &mut AccountManager,
    ) -> Result<TxsProduct, ConsensusError> {
        let mut gas_used = 0u64;
        for tx in txs {
            let snapshot = am.snapshot();
            match self.execute(header, tx, am, gas_used) {
                Ok(gas) => gas_used += gas,
                Err(err) => {
                    warn!(tx = %tx.hash(), %err, "transaction replay failed");
                    am.revert_to_snapshot(snapshot)?;
                    return Err(ConsensusError::InvalidBlock(BlockIssue::Tx(err)));
                }
            }
        }
        Ok(TxsProduct {
            txs: txs.to_vec(),
            gas_used,
            change_logs: am.change_logs().to_vec(),
            version_root: am.version_root(),
        })
    }

    fn apply_candidates(
        &self,
        header: &BlockHeader,
        txs: Vec<Transaction>,
        am: &mut AccountManager,
        deadline: Option<Instant>,
        cancel: &AtomicBool,
    ) -> (TxsProduct, Vec<Transaction>) {
        let mut applied = Vec::with_capacity(txs.len());
        let mut rejected = Vec::new();
        let mut gas_used = 0u64;

        for tx in txs {
            // Interrupt only at transaction boundaries.
            if cancel.load(Ordering::Relaxed) {
                debug!(applied = applied.len(), "mining cancelled, stopping batch");
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!(applied = applied.len(), "time budget spent, stopping batch");
                    break;
                }
            }

            let snapshot = am.snapshot();
            match self.execute(header, &tx, am, gas_used) {
                Ok(gas) => {
                    gas_used += gas;
                    applied.push(tx);
                }
                Err(TxError::BlockGasExhausted) => {
                    // The block is full; later, smaller transactions might
                    // still fit, so keep scanning.
                    if am.revert_to_snapshot(snapshot).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(tx = %tx.hash(), %err, "candidate rejected");
                    if am.revert_to_snapshot(snapshot).is_err() {
                        break;
                    }
                    rejected.push(tx);
                }
            }
        }

        (
            TxsProduct {
                txs: applied,
                gas_used,
                change_logs: am.change_logs().to_vec(),
                version_root: am.version_root(),
            },
            rejected,
        )
    }

    fn pre_execute(
        &self,
        am: &mut AccountManager,
        _header: &BlockHeader,
        to: Address,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<(Vec<u8>, u64), ConsensusError> {
        // Read-only call surface: report the target's balance; charge
        // intrinsic gas only. Nothing is journalled past the call.
        let snapshot = am.snapshot();
        let balance = am.balance(to);
        let gas = self.params.tx_gas + self.params.tx_data_gas * data.len() as u64;
        am.revert_to_snapshot(snapshot)
            .map_err(ConsensusError::from)?;
        Ok((balance.to_be_bytes().to_vec(), gas))
    }
}

/// Deterministic deployment address.
fn contract_address(sender: &Address, tx: &Transaction) -> Address {
    let mut preimage = Vec::with_capacity(52);
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(tx.hash().as_bytes());
    let digest = keccak256(&preimage);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.0[12..]);
    Address(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_account::test_utils::MapLoader;
    use cadence_types::test_utils::test_keypair;
    use cadence_types::AccountReader;
    use cadence_types::{Hash, KeyPair};

    fn params() -> ChainParams {
        ChainParams::default()
    }

    fn header(time: u32, miner: Address) -> BlockHeader {
        BlockHeader {
            miner_address: miner,
            height: 1,
            gas_limit: 1_000_000,
            time,
            ..BlockHeader::default()
        }
    }

    fn manager(sender: &KeyPair, balance: u128) -> AccountManager {
        let loader = MapLoader::new().with_balance(sender.node_id().address(), balance);
        AccountManager::new(loader.into_loader(), Hash::ZERO, 1)
    }

    fn transfer(kp: &KeyPair, to: Address, amount: u128, gas_price: u128) -> Transaction {
        Transaction::new(Some(to), amount, 30_000, gas_price, u64::MAX, 1, Vec::new()).signed(kp)
    }

    #[test]
    fn transfer_moves_value_and_charges_nothing_at_zero_price() {
        let kp = test_keypair(1);
        let to = Address([9; 20]);
        let mut am = manager(&kp, 100);
        let processor = TransferProcessor::new(params());

        let product = processor
            .apply(&header(1000, Address([8; 20])), &[transfer(&kp, to, 5, 0)], &mut am)
            .unwrap();
        assert_eq!(product.gas_used, 21_000);
        assert_eq!(am.balance(kp.node_id().address()), 95);
        assert_eq!(am.balance(to), 5);
        // Sender debit and recipient credit only.
        assert_eq!(product.change_logs.len(), 2);
    }

    #[test]
    fn fee_goes_to_the_miner() {
        let kp = test_keypair(1);
        let miner = Address([8; 20]);
        let mut am = manager(&kp, 1_000_000);
        let processor = TransferProcessor::new(params());

        processor
            .apply(
                &header(1000, miner),
                &[transfer(&kp, Address([9; 20]), 5, 1)],
                &mut am,
            )
            .unwrap();
        assert_eq!(am.balance(miner), 21_000);
        assert_eq!(am.balance(kp.node_id().address()), 1_000_000 - 5 - 21_000);
    }

    #[test]
    fn replay_fails_the_block_on_a_bad_transaction() {
        let kp = test_keypair(1);
        let mut am = manager(&kp, 2); // cannot cover amount
        let processor = TransferProcessor::new(params());

        let err = processor
            .apply(
                &header(1000, Address([8; 20])),
                &[transfer(&kp, Address([9; 20]), 5, 0)],
                &mut am,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::InvalidBlock(BlockIssue::Tx(TxError::InsufficientBalance { .. }))
        ));
        // The failed transaction left no trace.
        assert!(am.change_logs().is_empty());
    }

    #[test]
    fn mining_partitions_valid_and_invalid() {
        let kp = test_keypair(1);
        let broke = test_keypair(2);
        let mut am = manager(&kp, 100);
        let processor = TransferProcessor::new(params());

        let good = transfer(&kp, Address([9; 20]), 5, 0);
        let bad = transfer(&broke, Address([9; 20]), 50, 0);
        let cancel = AtomicBool::new(false);
        let (product, rejected) = processor.apply_candidates(
            &header(1000, Address([8; 20])),
            vec![bad.clone(), good.clone()],
            &mut am,
            None,
            &cancel,
        );
        assert_eq!(product.txs, vec![good]);
        assert_eq!(rejected, vec![bad]);
        assert_eq!(am.balance(Address([9; 20])), 5);
    }

    #[test]
    fn cancel_stops_at_a_transaction_boundary() {
        let kp = test_keypair(1);
        let mut am = manager(&kp, 1_000);
        let processor = TransferProcessor::new(params());

        let cancel = AtomicBool::new(true);
        let (product, rejected) = processor.apply_candidates(
            &header(1000, Address([8; 20])),
            vec![transfer(&kp, Address([9; 20]), 5, 0)],
            &mut am,
            None,
            &cancel,
        );
        assert!(product.txs.is_empty());
        assert!(rejected.is_empty());
        assert_eq!(am.balance(kp.node_id().address()), 1_000);
    }

    #[test]
    fn deployment_creates_code() {
        let kp = test_keypair(1);
        let mut am = manager(&kp, 1_000_000);
        let processor = TransferProcessor::new(params());

        let deploy =
            Transaction::new(None, 0, 100_000, 0, u64::MAX, 1, vec![0xfe, 0xed]).signed(&kp);
        let expected = contract_address(&kp.node_id().address(), &deploy);
        let product = processor
            .apply(&header(1000, Address([8; 20])), &[deploy], &mut am)
            .unwrap();
        assert_eq!(product.gas_used, 21_000 + 2 * 68);
        assert!(!am.account(expected).code().is_empty());
    }

    #[test]
    fn pre_execute_leaves_no_logs() {
        let kp = test_keypair(1);
        let mut am = manager(&kp, 777);
        let processor = TransferProcessor::new(params());

        let (ret, gas) = processor
            .pre_execute(
                &mut am,
                &header(1000, Address([8; 20])),
                kp.node_id().address(),
                &[],
                Duration::from_millis(100),
            )
            .unwrap();
        assert_eq!(gas, 21_000);
        assert_eq!(u128::from_be_bytes(ret.try_into().unwrap()), 777);
        assert!(am.change_logs().is_empty());
    }
}
