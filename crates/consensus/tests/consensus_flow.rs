//! End-to-end flows over the consensus core: mine → validate → replay →
//! confirm → promote.

use cadence_account::AccountManager;
use cadence_types::AccountReader;
use cadence_consensus::testing::{
    committee_with_keys, genesis_block, FixedCandidates, MemStore, VecPool,
};
use cadence_consensus::{
    BlockAssembler, BlockIssue, ConsensusError, FinalityTracker, HeaderIssue, Store, StoreLoader,
    TransferProcessor, TxsProduct, Validator,
};
use cadence_deputy::DeputyManager;
use cadence_types::{
    change_log_root, deputy_root, Address, Block, ChainParams, ConfirmData, DeputyNode, Hash,
    KeyPair, Transaction, EMPTY_TRIE_HASH,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    keys: Vec<KeyPair>,
    nodes: Vec<DeputyNode>,
    dm: Arc<DeputyManager>,
    store: Arc<MemStore>,
    candidates: Arc<FixedCandidates>,
    processor: Arc<TransferProcessor>,
    validator: Validator,
}

impl Harness {
    fn new(votes: &[u128], params: ChainParams) -> Harness {
        let (keys, nodes) = committee_with_keys(votes);
        let store = Arc::new(MemStore::with_genesis(genesis_block(1_000)));
        let dm = Arc::new(DeputyManager::new(params.clone(), nodes.clone()));
        let pool = Arc::new(VecPool::new());
        let candidates = Arc::new(FixedCandidates::new(nodes.clone()));
        let processor = Arc::new(TransferProcessor::new(params.clone()));
        let validator = Validator::new(
            dm.clone(),
            store.clone() as Arc<dyn Store>,
            pool.clone(),
            candidates.clone(),
        );
        Harness {
            keys,
            nodes,
            dm,
            store,
            candidates,
            processor,
            validator,
        }
    }

    fn assembler(&self, miner: usize) -> BlockAssembler {
        BlockAssembler::new(
            self.dm.clone(),
            self.processor.clone(),
            self.candidates.clone(),
            self.keys[miner].clone(),
        )
    }

    fn manager_for(&self, parent: &Block, height: u32) -> AccountManager {
        AccountManager::new(
            Arc::new(StoreLoader(self.store.clone() as Arc<dyn Store>)),
            parent.header.version_root,
            height,
        )
    }

    /// Mine a child of `parent` with `miner`'s key at `time` and store it.
    fn mine(&self, miner: usize, parent: &Block, txs: Vec<Transaction>, time: u32) -> Block {
        let mut am = self.manager_for(parent, parent.height() + 1);
        let cancel = AtomicBool::new(false);
        let (block, rejected) = self
            .assembler(miner)
            .mine_block(
                parent,
                txs,
                &mut am,
                Duration::from_secs(5),
                &cancel,
                time,
            )
            .expect("mining succeeds");
        assert!(rejected.is_empty(), "unexpected rejected txs: {rejected:?}");
        self.store.put_block(block.clone()).unwrap();
        block
    }

    fn miner_addr(&self, idx: usize) -> Address {
        self.keys[idx].node_id().address()
    }
}

fn small_params() -> ChainParams {
    ChainParams {
        term_duration: 100,
        interim_duration: 10,
        timeout_ms: 10_000,
        ..ChainParams::default()
    }
}

fn transfer(kp: &KeyPair, to: Address, amount: u128) -> Transaction {
    Transaction::new(Some(to), amount, 30_000, 0, u64::MAX, 1, Vec::new()).signed(kp)
}

#[test]
fn happy_path_normal_block() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let sender = cadence_types::test_utils::test_keypair(0xAA);
    let recipient = Address([0x99; 20]);
    h.store.seed_balance(sender.node_id().address(), 100);

    let genesis = h.store.stable();
    // Rank 0 mines the first block; the genesis parent is exempt from slot
    // timing.
    let parent = h.mine(0, &genesis, vec![], 1_000);

    // Rank 1 follows 5s later: rotational gap 1, inside its 10s window.
    let tx = transfer(&sender, recipient, 5);
    let block = h.mine(1, &parent, vec![tx], 1_005);

    assert_eq!(block.header.gas_used, 21_000);
    assert_eq!(block.change_logs.len(), 2);
    assert_eq!(block.header.log_root, change_log_root(&block.change_logs));

    // Full validation path on the received block.
    let checked_parent = h
        .validator
        .verify_before_tx_process(&block, 10_000)
        .expect("pre-execution checks pass");
    assert_eq!(checked_parent.hash(), parent.hash());

    let mut am = h.manager_for(&parent, block.height());
    let computed = h.assembler(1).run_block(&block, &mut am).unwrap();
    h.validator
        .verify_after_tx_process(&block, &computed)
        .expect("replay reproduces the block");

    // Balances moved.
    assert_eq!(am.balance(sender.node_id().address()), 95);
    assert_eq!(am.balance(recipient), 5);

    // No confirms yet: stable stays at genesis.
    let tracker = FinalityTracker::new(h.store.clone() as Arc<dyn Store>, h.dm.clone());
    assert_eq!(tracker.stable_height(), 0);
}

#[test]
fn slot_timing_accepts_and_rejects() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);

    // Δ = 5s, gap 1: inside the successor window.
    let ok = h.mine(1, &parent, vec![], 1_005);
    h.validator
        .verify_before_tx_process(&ok, 10_000)
        .expect("in-window block accepted");

    // Δ = 21s, gap 1: two slots too late.
    let late = h.mine(1, &parent, vec![], 1_021);
    assert_eq!(
        h.validator.verify_before_tx_process(&late, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::Slot))
    );

    // Δ = 12s, gap 1: the window has already rotated on.
    let drifted = h.mine(1, &parent, vec![], 1_012);
    assert_eq!(
        h.validator.verify_before_tx_process(&drifted, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::Slot))
    );

    // Δ = 15s, gap 2: exactly slot distance − 1 windows elapsed.
    let skip_one = h.mine(2, &parent, vec![], 1_015);
    h.validator
        .verify_before_tx_process(&skip_one, 10_000)
        .expect("gap-2 block in its window");

    // Same miner again must wait out the full loop (≥ 20s into it).
    let repeat = h.mine(0, &parent, vec![], 1_025);
    h.validator
        .verify_before_tx_process(&repeat, 10_000)
        .expect("full-loop repeat accepted");
    let early_repeat = h.mine(0, &parent, vec![], 1_012);
    assert_eq!(
        h.validator.verify_before_tx_process(&early_repeat, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::Slot))
    );
}

#[test]
fn future_blocks_and_long_extra_are_rejected() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);
    let block = h.mine(1, &parent, vec![], 1_005);

    // One second of skew is tolerated, two is not.
    h.validator
        .verify_before_tx_process(&block, 1_004)
        .expect("1s skew tolerated");
    assert_eq!(
        h.validator.verify_before_tx_process(&block, 1_003),
        Err(ConsensusError::InvalidHeader(HeaderIssue::FutureTime))
    );

    // Oversized extra data.
    let mut bloated = block.clone();
    bloated.header.extra = "x".repeat(300);
    bloated.header.sign(&h.keys[1]);
    assert_eq!(
        h.validator.verify_before_tx_process(&bloated, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::ExtraTooLong))
    );
}

#[test]
fn signer_must_match_the_registered_deputy() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);
    let mut block = h.mine(1, &parent, vec![], 1_005);

    // Re-sign with a key that is not the registered deputy for the miner
    // address.
    let outsider = cadence_types::test_utils::test_keypair(0xBB);
    block.header.sign(&outsider);
    assert_eq!(
        h.validator.verify_before_tx_process(&block, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::Signer))
    );

    // A miner address not on the committee at all.
    let mut stranger = block.clone();
    stranger.header.miner_address = Address([0xCC; 20]);
    stranger.header.sign(&h.keys[1]);
    assert_eq!(
        h.validator.verify_before_tx_process(&stranger, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::Signer))
    );
}

#[test]
fn parent_must_be_local() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);
    let mut orphan = h.mine(1, &parent, vec![], 1_005);
    orphan.header.parent_hash = Hash([0xDD; 32]);
    orphan.header.sign(&h.keys[1]);
    assert_eq!(
        h.validator.verify_before_tx_process(&orphan, 10_000),
        Err(ConsensusError::ParentMissing)
    );
}

#[test]
fn tampered_tx_root_is_rejected() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let sender = cadence_types::test_utils::test_keypair(0xAA);
    h.store.seed_balance(sender.node_id().address(), 100);

    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);
    let mut block = h.mine(1, &parent, vec![transfer(&sender, Address([9; 20]), 5)], 1_005);
    block.txs.clear();
    assert_eq!(
        h.validator.verify_before_tx_process(&block, 10_000),
        Err(ConsensusError::InvalidBlock(BlockIssue::TxRoot))
    );
}

#[test]
fn replay_divergence_is_detected() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let sender = cadence_types::test_utils::test_keypair(0xAA);
    h.store.seed_balance(sender.node_id().address(), 100);

    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);
    let block = h.mine(1, &parent, vec![transfer(&sender, Address([9; 20]), 5)], 1_005);

    // Tamper with the claimed gas so the recomputed header differs.
    let mut tampered = block.clone();
    tampered.header.gas_used = 1;

    let mut am = h.manager_for(&parent, block.height());
    let computed = h.assembler(1).run_block(&tampered, &mut am).unwrap();
    assert_eq!(
        h.validator.verify_after_tx_process(&tampered, &computed),
        Err(ConsensusError::InvalidBlock(BlockIssue::Replay))
    );
}

#[test]
fn snapshot_block_embeds_the_next_committee() {
    let params = ChainParams {
        term_duration: 3,
        interim_duration: 1,
        ..small_params()
    };
    let h = Harness::new(&[100, 50, 50], params);
    let genesis = h.store.stable();

    // Build up to the snapshot height T = 3.
    let b1 = h.mine(0, &genesis, vec![], 1_000);
    let b2 = h.mine(1, &b1, vec![], 1_005);
    let snapshot = h.mine(2, &b2, vec![], 1_010);

    assert_eq!(snapshot.height(), 3);
    assert!(snapshot.txs.is_empty());
    assert!(snapshot.change_logs.is_empty());
    assert!(snapshot.confirms.is_empty());
    assert_eq!(snapshot.header.tx_root, EMPTY_TRIE_HASH);
    assert_eq!(snapshot.header.log_root, EMPTY_TRIE_HASH);

    let embedded = snapshot.deputies.as_ref().expect("committee embedded");
    assert_eq!(embedded, &h.nodes);
    assert_eq!(snapshot.header.deputy_root, Some(deputy_root(embedded)));

    // Replay reproduces the snapshot exactly.
    let mut am = h.manager_for(&b2, 3);
    let computed = h.assembler(2).run_block(&snapshot, &mut am).unwrap();
    h.validator
        .verify_after_tx_process(&snapshot, &computed)
        .expect("snapshot replays cleanly");

    // A tampered committee root fails deputy verification.
    let mut tampered = snapshot.clone();
    tampered.header.deputy_root = Some(Hash([0x12; 32]));
    tampered.header.sign(&h.keys[2]);
    assert_eq!(
        h.validator.verify_before_tx_process(&tampered, 10_000),
        Err(ConsensusError::InvalidBlock(BlockIssue::DeputyRoot))
    );

    // Deputy roots outside snapshot heights are refused outright.
    let mut sneaky = h.mine(1, &b1, vec![], 1_006);
    sneaky.header.deputy_root = Some(Hash([0x12; 32]));
    sneaky.header.sign(&h.keys[1]);
    assert_eq!(
        h.validator.verify_before_tx_process(&sneaky, 10_000),
        Err(ConsensusError::InvalidHeader(HeaderIssue::UnexpectedDeputyRoot))
    );
}

#[test]
fn judge_deputy_flags_double_signing() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);

    // Two different blocks at the same height signed by the same deputy.
    let first = h.mine(1, &parent, vec![], 1_005);
    let mut second = first.clone();
    second.header.extra = "different".to_string();
    second.header.sign(&h.keys[1]);

    assert_ne!(first.hash(), second.hash());
    assert!(h.validator.judge_deputy(&second));

    // A different deputy at the same height is clean.
    let other = h.mine(2, &parent, vec![], 1_015);
    assert!(!h.validator.judge_deputy(&other));
}

#[test]
fn confirm_quorum_promotes_to_stable() {
    let h = Harness::new(&[100, 100, 100, 100, 100], small_params());
    let genesis = h.store.stable();
    let block = h.mine(0, &genesis, vec![], 1_000);
    let hash = block.hash();

    let tracker = FinalityTracker::new(h.store.clone() as Arc<dyn Store>, h.dm.clone());
    // Committee of five: ⌊10/3⌋ + 1 = 4 signers including the miner.
    assert_eq!(tracker.quorum(block.height()), 4);

    // Confirms arrive out of order from deputies 2, 4 and 1.
    for (i, idx) in [2usize, 4, 1].iter().enumerate() {
        let confirm = ConfirmData {
            hash,
            height: block.height(),
            sign_data: h.keys[*idx].sign(&hash),
        };
        let promoted = tracker.insert_confirm(&h.validator, &confirm).unwrap();
        if i < 2 {
            assert!(promoted.is_none(), "no quorum after {} confirms", i + 1);
            assert_eq!(tracker.stable_height(), 0);
        } else {
            let stable = promoted.expect("third confirm completes the quorum");
            assert_eq!(stable.hash(), hash);
        }
    }
    assert_eq!(tracker.stable_height(), block.height());
    assert_eq!(h.store.stable().hash(), hash);
}

#[test]
fn early_confirms_are_buffered_and_merged() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let tracker = FinalityTracker::new(h.store.clone() as Arc<dyn Store>, h.dm.clone());

    // Build the block but do not store it yet: its confirms must buffer.
    let parent = h.mine(0, &genesis, vec![], 1_000);
    let mut am = h.manager_for(&parent, 2);
    let cancel = AtomicBool::new(false);
    let (mut block, _) = h
        .assembler(1)
        .mine_block(&parent, vec![], &mut am, Duration::from_secs(5), &cancel, 1_005)
        .unwrap();

    let hash = block.hash();
    for idx in [0usize, 2] {
        let confirm = ConfirmData {
            hash,
            height: 2,
            sign_data: h.keys[idx].sign(&hash),
        };
        assert!(tracker
            .insert_confirm(&h.validator, &confirm)
            .unwrap()
            .is_none());
    }
    assert_eq!(tracker.cached_confirms(), 2);

    // The block arrives: buffered confirms merge and complete the quorum
    // (committee of three needs 3 signers = miner + 2).
    assert_eq!(tracker.quorum(2), 3);
    h.store.put_block(block.clone()).unwrap();
    let promoted = tracker
        .on_block_inserted(&h.validator, &mut block)
        .unwrap()
        .expect("merged confirms promote the block");
    assert_eq!(promoted.hash(), hash);
    assert_eq!(tracker.stable_height(), 2);
    assert_eq!(tracker.cached_confirms(), 0);
}

#[test]
fn duplicate_and_foreign_confirms_are_dropped() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let block = h.mine(0, &genesis, vec![], 1_000);
    let hash = block.hash();
    let tracker = FinalityTracker::new(h.store.clone() as Arc<dyn Store>, h.dm.clone());

    // The miner's own signature never counts as a confirm.
    let miner_confirm = ConfirmData {
        hash,
        height: 1,
        sign_data: h.keys[0].sign(&hash),
    };
    assert_eq!(
        tracker.insert_confirm(&h.validator, &miner_confirm),
        Err(ConsensusError::DuplicateConfirm)
    );

    // An outsider's signature is rejected.
    let outsider = cadence_types::test_utils::test_keypair(0xEE);
    let foreign = ConfirmData {
        hash,
        height: 1,
        sign_data: outsider.sign(&hash),
    };
    assert_eq!(
        tracker.insert_confirm(&h.validator, &foreign),
        Err(ConsensusError::InvalidConfirmSigner)
    );

    // A valid confirm applies once; the repeat is a duplicate.
    let confirm = ConfirmData {
        hash,
        height: 1,
        sign_data: h.keys[1].sign(&hash),
    };
    tracker.insert_confirm(&h.validator, &confirm).unwrap();
    assert_eq!(
        tracker.insert_confirm(&h.validator, &confirm),
        Err(ConsensusError::DuplicateConfirm)
    );
}

#[test]
fn verify_new_confirms_filters_partially() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let block = h.mine(0, &genesis, vec![], 1_000);
    let hash = block.hash();

    let good_1 = h.keys[1].sign(&hash);
    let good_2 = h.keys[2].sign(&hash);
    let outsider = cadence_types::test_utils::test_keypair(0xEE).sign(&hash);

    // Duplicates collapse, outsiders drop, the rest survives.
    let (accepted, err) = h
        .validator
        .verify_new_confirms(&block, &[good_1, good_1, outsider, good_2]);
    assert_eq!(accepted, vec![good_1, good_2]);
    assert_eq!(err, Some(ConsensusError::InvalidConfirmSigner));

    // Signatures over a different block recover to unknown signers.
    let other = h.mine(1, &genesis, vec![], 1_015);
    let misdirected = h.keys[1].sign(&other.hash());
    let (accepted, err) = h.validator.verify_new_confirms(&block, &[misdirected]);
    assert!(accepted.is_empty());
    assert_eq!(err, Some(ConsensusError::InvalidConfirmSigner));
}

#[test]
fn rewards_and_refunds_land_at_the_reward_height() {
    let params = ChainParams {
        term_duration: 100,
        interim_duration: 10,
        reward_precision: 1,
        ..small_params()
    };
    let reward_pool = params.reward_pool_address;
    let h = Harness::new(&[400, 100, 100, 100, 100], params.clone());

    // Configure the term-1 closing reward (term 0 committee) in the pool's
    // storage, and give the pool the funds.
    let table: std::collections::BTreeMap<u32, u128> = [(0u32, 10_000u128)].into_iter().collect();
    let mut pool_account = cadence_types::AccountData::empty(reward_pool);
    pool_account.balance = 50_000;
    h.store.seed_account(pool_account);

    // Candidate 0 unregistered during term 0: deposit comes back at the
    // reward height.
    let refunded = h.miner_addr(0);
    let mut refunded_account = cadence_types::AccountData::empty(refunded);
    refunded_account.candidate_profile.insert(
        cadence_types::KEY_IS_CANDIDATE.to_string(),
        "1".to_string(),
    );
    refunded_account.candidate_profile.insert(
        cadence_types::KEY_DEPOSIT_AMOUNT.to_string(),
        "5000".to_string(),
    );
    refunded_account.votes = 400;
    h.store.seed_account(refunded_account);
    let deposit_pool = params.deposit_pool_address;
    h.store.seed_balance(deposit_pool, 5_000);

    let reward_height = params.reward_height(1); // 111
    h.candidates.schedule_refund(reward_height, refunded);

    let mut am = AccountManager::new(
        Arc::new(StoreLoader(h.store.clone() as Arc<dyn Store>)),
        Hash::ZERO,
        reward_height,
    );
    // The reward table lives in the pool's storage slot.
    am.set_storage(
        reward_pool,
        cadence_consensus::reward_storage_key(&reward_pool),
        Some(cadence_consensus::encode_reward_table(&table)),
    );

    let header = cadence_types::BlockHeader {
        height: reward_height,
        ..cadence_types::BlockHeader::default()
    };
    h.assembler(0).finalize(&header, &mut am).unwrap();

    // Proportional split: 400/800 → 5000, 100/800 → 1250 each.
    assert_eq!(am.balance(h.miner_addr(1)), 1_250);
    assert_eq!(am.balance(h.miner_addr(4)), 1_250);
    // Deputy 0 got salary 5000 plus the 5000 deposit refund.
    assert_eq!(am.balance(refunded), 10_000);
    // Pool paid 5000 + 4·1250 = 10000.
    assert_eq!(am.balance(reward_pool), 40_000);
    assert_eq!(am.balance(deposit_pool), 0);

    // The candidate profile was cleared.
    let account = am.account(refunded);
    assert_eq!(
        account.candidate_state(cadence_types::KEY_IS_CANDIDATE),
        None
    );
    assert_eq!(
        account.candidate_state(cadence_types::KEY_DEPOSIT_AMOUNT),
        None
    );
    assert_eq!(account.votes(), 0);
}

#[test]
fn failing_refund_query_rejects_the_block() {
    let params = ChainParams {
        term_duration: 100,
        interim_duration: 10,
        ..small_params()
    };
    let (keys, nodes) = committee_with_keys(&[100]);
    let store = Arc::new(MemStore::with_genesis(genesis_block(1_000)));
    let dm = Arc::new(DeputyManager::new(params.clone(), nodes.clone()));
    let assembler = BlockAssembler::new(
        dm,
        Arc::new(TransferProcessor::new(params.clone())),
        Arc::new(FixedCandidates::failing_refunds(nodes)),
        keys[0].clone(),
    );
    let mut am = AccountManager::new(
        Arc::new(StoreLoader(store as Arc<dyn Store>)),
        Hash::ZERO,
        111,
    );
    let header = cadence_types::BlockHeader {
        height: params.reward_height(1),
        ..cadence_types::BlockHeader::default()
    };
    assert!(matches!(
        assembler.finalize(&header, &mut am),
        Err(ConsensusError::Store(_))
    ));
}

#[test]
fn corrupt_reward_table_rejects_the_block() {
    let params = ChainParams {
        term_duration: 100,
        interim_duration: 10,
        ..small_params()
    };
    let h = Harness::new(&[100], params.clone());
    let pool = params.reward_pool_address;

    let mut am = AccountManager::new(
        Arc::new(StoreLoader(h.store.clone() as Arc<dyn Store>)),
        Hash::ZERO,
        111,
    );
    am.set_storage(
        pool,
        cadence_consensus::reward_storage_key(&pool),
        Some(vec![0x12]),
    );
    let header = cadence_types::BlockHeader {
        height: params.reward_height(1),
        ..cadence_types::BlockHeader::default()
    };
    assert!(matches!(
        h.assembler(0).finalize(&header, &mut am),
        Err(ConsensusError::RewardDataCorrupt(_))
    ));
}

#[test]
fn mining_without_committee_membership_fails() {
    let h = Harness::new(&[100, 100], small_params());
    let outsider = cadence_types::test_utils::test_keypair(0xEE);
    let assembler = BlockAssembler::new(
        h.dm.clone(),
        h.processor.clone(),
        h.candidates.clone(),
        outsider,
    );
    let genesis = h.store.stable();
    let mut am = h.manager_for(&genesis, 1);
    let cancel = AtomicBool::new(false);
    let result = assembler.mine_block(
        &genesis,
        vec![],
        &mut am,
        Duration::from_secs(1),
        &cancel,
        1_000,
    );
    assert!(matches!(result, Err(ConsensusError::NotDeputy)));
}

#[test]
fn committee_of_one_auto_stabilises() {
    let h = Harness::new(&[100], small_params());
    let genesis = h.store.stable();
    let block = h.mine(0, &genesis, vec![], 1_000);

    let tracker = FinalityTracker::new(h.store.clone() as Arc<dyn Store>, h.dm.clone());
    // ⌊2/3⌋ + 1 = 1: the miner's own signature is the quorum.
    assert_eq!(tracker.quorum(1), 1);
    let mut owned = block.clone();
    let promoted = tracker
        .on_block_inserted(&h.validator, &mut owned)
        .unwrap()
        .expect("single-deputy blocks stabilise instantly");
    assert_eq!(promoted.hash(), block.hash());
}

#[test]
fn sealed_product_round_trips_roots() {
    let h = Harness::new(&[100, 100, 100], small_params());
    let genesis = h.store.stable();
    let parent = h.mine(0, &genesis, vec![], 1_000);

    // Sealing the same product twice yields identical roots.
    let mut am = h.manager_for(&parent, 2);
    let product = TxsProduct {
        txs: Vec::new(),
        gas_used: 0,
        change_logs: Vec::new(),
        version_root: am.finalise().unwrap(),
    };
    let header = h
        .assembler(1)
        .prepare_header(&parent.header, String::new(), 1_005)
        .unwrap();
    let sealed_a = h.assembler(1).seal(header.clone(), &product, vec![]).unwrap();
    let sealed_b = h.assembler(1).seal(header, &product, vec![]).unwrap();
    assert_eq!(sealed_a.hash(), sealed_b.hash());
    assert_eq!(sealed_a.header.tx_root, EMPTY_TRIE_HASH);
    assert_eq!(sealed_a.header.log_root, EMPTY_TRIE_HASH);
}
