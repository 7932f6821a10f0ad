//! Historical replay: `trace_replayTransaction`, `trace_replayBlockTransactions`, `trace_block`
//! and `trace_transaction`.

use crate::utils::{
    ALICE, BOB, CONTRACT, LIBRARY, MINER, MemoryChain, Op, ScriptedInterpreter, TestConsensus,
    TestNode, VALIDATORS, genesis, transfer,
};
use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_primitives::{B256, Bytes, U64, U256};
use oetrace::{
    CallKind, ChainConfig, TraceApi, TraceConfig, TraceError,
    backend::{Block, ChainBackend, Message, SYSTEM_ADDRESS, StateView, TransactionLocation},
    error::BackendError,
};
use oetrace_core::{Action, BatchTraceResult, Delta, LocalizedTransactionTrace, RewardType};
use std::sync::Arc;

/// Block 1: a transfer, a contract call, a message that cannot be applied and another transfer.
fn node() -> TestNode {
    let interpreter = ScriptedInterpreter::default()
        .with_script(
            CONTRACT,
            vec![Op::Call { kind: CallKind::Call, to: LIBRARY, value: U256::from(3) }],
        )
        .with_script(LIBRARY, vec![Op::Return(Bytes::from_static(&[0x01]))]);
    TestNode::new(
        interpreter,
        vec![vec![
            transfer(ALICE, BOB, 1000, 0),
            transfer(ALICE, CONTRACT, 10, 1),
            transfer(BOB, ALICE, 5000, 0),
            transfer(BOB, ALICE, 100, 0),
        ]],
    )
}

fn types(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_transaction_matches_block_trace() {
    let node = node();
    let block = node.chain.block(1).clone();
    let hash = block.transactions[1].hash;

    let replayed = node.api.trace_replay_transaction(hash, types(&["trace"])).await.unwrap();
    assert!(replayed.transaction_hash.is_none());
    let replayed = replayed.trace.unwrap();
    assert_eq!(replayed.len(), 2);

    let frames = node.api.trace_block(BlockId::number(1)).await.unwrap();
    let located: Vec<_> =
        frames.iter().filter(|frame| frame.transaction_hash == Some(hash)).collect();
    assert_eq!(located.len(), replayed.len());
    for (located, replayed) in located.iter().zip(&replayed) {
        assert_eq!(&located.trace, replayed);
        assert_eq!(located.block_hash, Some(block.hash()));
        assert_eq!(located.block_number, Some(1));
        assert_eq!(located.transaction_position, Some(1));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn replays_on_top_of_earlier_transactions() {
    let node = node();
    let hash = node.chain.block(1).transactions[1].hash;

    let res = node
        .api
        .trace_replay_transaction(hash, types(&["trace", "vmTrace", "stateDiff"]))
        .await
        .unwrap();
    let diff = res.state_diff.unwrap();
    // the earlier transfer already bumped the sender's nonce
    assert_eq!(diff[&ALICE].nonce, Delta::changed(U64::from(1), U64::from(2)));
    assert_eq!(diff[&CONTRACT].balance, Delta::changed(U256::ZERO, U256::from(7)));
    assert_eq!(diff[&LIBRARY].balance, Delta::changed(U256::ZERO, U256::from(3)));

    let vm = res.vm_trace.unwrap();
    assert_eq!(vm.ops.len(), 2);
    assert_eq!(vm.ops[0].op.as_deref(), Some("CALL"));
    assert_eq!(vm.ops[0].sub.as_ref().unwrap().ops[0].idx.as_deref(), Some("0-0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn replays_past_rejected_transactions() {
    let node = node();
    let hash = node.chain.block(1).transactions[3].hash;

    let res = node.api.trace_replay_transaction(hash, types(&["stateDiff"])).await.unwrap();
    assert!(res.trace.is_none());
    let diff = res.state_diff.unwrap();
    assert_eq!(diff[&BOB].balance, Delta::changed(U256::from(1000), U256::from(900)));
    assert_eq!(
        diff[&BOB].nonce,
        Delta::changed(U64::ZERO, U64::from(1))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn replays_block_transactions() {
    let node = node();
    let block = node.chain.block(1).clone();

    let results = node
        .api
        .trace_replay_block_transactions(BlockId::number(1), types(&["trace"]))
        .await
        .unwrap();
    assert_eq!(results.len(), 4);

    for (idx, res) in results.iter().enumerate() {
        match res {
            BatchTraceResult::Success(res) => {
                assert_eq!(res.transaction_hash, Some(block.transactions[idx].hash));
                assert!(res.state_diff.is_none());
            }
            BatchTraceResult::Failure { error } => {
                assert_eq!(idx, 2);
                assert!(error.contains("insufficient funds"), "{error}");
            }
        }
    }
    assert!(results[3].as_success().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn appends_block_rewards() {
    let node = node();
    let block = node.chain.block(1).clone();

    let frames = node.api.trace_block(BlockId::Number(BlockNumberOrTag::Latest)).await.unwrap();
    // one frame per transfer, two for the contract call, none for the rejected message
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[3].transaction_hash, Some(block.transactions[3].hash));
    assert_eq!(frames[3].transaction_position, Some(3));

    let reward = &frames[4];
    let Action::Reward(action) = &reward.trace.action else { panic!("expected reward action") };
    assert_eq!(action.author, MINER);
    assert_eq!(action.reward_type, RewardType::Block);
    assert_eq!(reward.block_hash, Some(block.hash()));
    assert_eq!(reward.block_number, Some(1));
    assert!(reward.transaction_hash.is_none());
    assert!(reward.transaction_position.is_none());
    assert!(reward.trace.trace_address.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn locates_transaction_frames() {
    let node = node();
    let block = node.chain.block(1).clone();
    let hash = block.transactions[1].hash;

    let frames = node.api.trace_transaction(hash).await.unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].trace.trace_address, vec![0]);
    for frame in &frames {
        assert_eq!(frame.transaction_hash, Some(hash));
        assert_eq!(frame.transaction_position, Some(1));
        assert_eq!(frame.block_hash, Some(block.hash()));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn reports_missing_targets() {
    let node = node();

    let err = node.api.trace_replay_transaction(B256::repeat_byte(0x11), types(&["trace"])).await;
    assert!(matches!(err, Err(TraceError::TransactionNotFound(_))));

    let err = node.api.trace_block(BlockId::number(99)).await.unwrap_err();
    assert_eq!(err.to_string(), "block #99 not found");

    let hash = B256::repeat_byte(0x22);
    let err = node.api.trace_block(BlockId::hash(hash)).await.unwrap_err();
    assert_eq!(err.to_string(), format!("block {hash} not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_genesis_and_pending() {
    let node = node();

    let err = node.api.trace_block(BlockId::number(0)).await.unwrap_err();
    assert!(matches!(err, TraceError::GenesisNotTraceable));

    let err = node
        .api
        .trace_replay_block_transactions(BlockId::Number(BlockNumberOrTag::Earliest), types(&["trace"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TraceError::GenesisNotTraceable));

    let err = node
        .api
        .trace_call(Default::default(), types(&["trace"]), Some(BlockId::pending()))
        .await
        .unwrap_err();
    assert!(matches!(err, TraceError::PendingBlock));
}

/// Fees collected in the system account before block 1.
const SYSTEM_FEES: u64 = 5000;

/// The block producer forwarding the collected fees to the validator contract.
fn system_call(nonce: u64) -> Message {
    transfer(MINER, VALIDATORS, SYSTEM_FEES, nonce)
}

fn system_node(consensus: TestConsensus, blocks: Vec<Vec<Message>>) -> TestNode {
    let mut genesis = genesis();
    genesis.insert_account(SYSTEM_ADDRESS, U256::from(SYSTEM_FEES), 0, Bytes::new());
    TestNode::build(
        ScriptedInterpreter::default(),
        consensus,
        genesis,
        blocks,
        TraceConfig::default(),
    )
}

fn is_reward(frame: &LocalizedTransactionTrace) -> bool {
    matches!(frame.trace.action, Action::Reward(_))
}

#[tokio::test(flavor = "multi_thread")]
async fn places_rewards_before_system_transactions() {
    let node = system_node(
        TestConsensus::default().with_system_contract(VALIDATORS),
        vec![vec![transfer(ALICE, BOB, 1000, 0), system_call(0)]],
    );
    let block = node.chain.block(1).clone();

    let frames = node.api.trace_block(BlockId::number(1)).await.unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].transaction_hash, Some(block.transactions[0].hash));
    assert!(is_reward(&frames[1]));
    assert_eq!(frames[2].transaction_hash, Some(block.transactions[1].hash));
    assert_eq!(frames[2].transaction_position, Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn places_rewards_first_without_user_transactions() {
    let node = system_node(
        TestConsensus::default().with_system_contract(VALIDATORS),
        vec![vec![system_call(0)], vec![]],
    );

    let frames = node.api.trace_block(BlockId::number(1)).await.unwrap();
    assert_eq!(frames.len(), 2);
    assert!(is_reward(&frames[0]));
    assert_eq!(frames[1].transaction_position, Some(0));

    let frames = node.api.trace_block(BlockId::number(2)).await.unwrap();
    assert_eq!(frames.len(), 1);
    assert!(is_reward(&frames[0]));
    assert_eq!(frames[0].block_number, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn hands_system_fees_to_block_producer() {
    let blocks = vec![vec![transfer(ALICE, BOB, 1000, 0), system_call(0)]];
    let node = system_node(TestConsensus::default().with_system_contract(VALIDATORS), blocks.clone());
    let hash = node.chain.block(1).transactions[1].hash;

    let res = node.api.trace_replay_transaction(hash, types(&["trace", "stateDiff"])).await.unwrap();
    let diff = res.state_diff.unwrap();
    assert_eq!(diff[&MINER].balance, Delta::changed(U256::from(SYSTEM_FEES), U256::ZERO));
    assert_eq!(diff[&MINER].nonce, Delta::changed(U64::ZERO, U64::from(1)));
    assert_eq!(diff[&VALIDATORS].balance, Delta::Added(U256::from(SYSTEM_FEES)));
    // emptied by the hand-over, then swept as an empty account
    assert_eq!(diff[&SYSTEM_ADDRESS].balance, Delta::Removed(U256::ZERO));
    assert!(!diff.contains_key(&BOB));

    // without system contracts the producer cannot pay
    let node = system_node(TestConsensus::default(), blocks);
    let err = node.api.trace_replay_transaction(hash, types(&["trace"])).await.unwrap_err();
    assert!(matches!(err, TraceError::Execution(_)), "{err}");
}

/// Reports every transaction at an index past the end of its block.
struct StaleIndex(Arc<MemoryChain>);

impl ChainBackend for StaleIndex {
    fn chain_config(&self) -> ChainConfig {
        self.0.chain_config()
    }

    fn block_by_number(&self, number: BlockNumberOrTag) -> Result<Option<Block>, BackendError> {
        self.0.block_by_number(number)
    }

    fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, BackendError> {
        self.0.block_by_hash(hash)
    }

    fn transaction_location(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionLocation>, BackendError> {
        let location = self.0.transaction_location(hash)?;
        Ok(location.map(|location| TransactionLocation { index: 10, ..location }))
    }

    fn state_at_block(
        &self,
        block: &Block,
        reexec: u64,
    ) -> Result<Box<dyn StateView>, BackendError> {
        self.0.state_at_block(block, reexec)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_location_outside_block() {
    let node = node();
    let hash = node.chain.block(1).transactions[0].hash;
    let api = TraceApi::new(
        Arc::new(StaleIndex(node.chain.clone())),
        node.interpreter.clone(),
        Arc::new(TestConsensus::default()),
        TraceConfig::default(),
    );

    let err = api.trace_replay_transaction(hash, types(&["trace"])).await.unwrap_err();
    assert!(matches!(err, TraceError::TransactionNotFound(h) if h == hash));
    let err = api.trace_transaction(hash).await.unwrap_err();
    assert!(matches!(err, TraceError::TransactionNotFound(_)));
}
