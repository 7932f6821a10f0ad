//! Merges builder outputs into wire results.

use crate::{backend::Reward, tracer::TracerOutput};
use alloy_primitives::B256;
use oetrace_core::{
    Action, LocalizedTransactionTrace, RewardAction, StateDiff, TraceResults, TraceTypes,
    TransactionTrace,
};

/// Identity of the block and transaction a trace belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceLocation {
    pub block_hash: B256,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    pub transaction_position: Option<u64>,
}

impl TraceLocation {
    /// A block-level location, used for reward frames.
    pub fn block(block_hash: B256, block_number: u64) -> Self {
        Self { block_hash, block_number, ..Default::default() }
    }

    pub fn transaction(block_hash: B256, block_number: u64, hash: B256, position: usize) -> Self {
        Self {
            block_hash,
            block_number,
            transaction_hash: Some(hash),
            transaction_position: Some(position as u64),
        }
    }

    /// Stamps `trace` with this location.
    pub fn localize(&self, trace: TransactionTrace) -> LocalizedTransactionTrace {
        LocalizedTransactionTrace {
            trace,
            block_hash: Some(self.block_hash),
            block_number: Some(self.block_number),
            transaction_hash: self.transaction_hash,
            transaction_position: self.transaction_position,
        }
    }
}

/// Builds the result of one message, keeping only the requested output kinds.
pub fn assemble(
    types: TraceTypes,
    output: TracerOutput,
    state_diff: Option<StateDiff>,
) -> TraceResults {
    TraceResults {
        output: output.output,
        trace: types.trace.then_some(output.trace),
        vm_trace: if types.vm_trace { output.vm_trace } else { None },
        state_diff: if types.state_diff { state_diff } else { None },
        transaction_hash: None,
    }
}

/// Stamps every frame of a transaction with its location.
pub fn localize(
    traces: Vec<TransactionTrace>,
    location: TraceLocation,
) -> Vec<LocalizedTransactionTrace> {
    traces.into_iter().map(|trace| location.localize(trace)).collect()
}

/// Synthetic frames for the end-of-block rewards.
pub fn reward_traces(rewards: Vec<Reward>, location: TraceLocation) -> Vec<LocalizedTransactionTrace> {
    rewards
        .into_iter()
        .map(|reward| {
            let action = Action::Reward(RewardAction {
                author: reward.beneficiary,
                reward_type: reward.kind,
                value: reward.amount,
            });
            location.localize(TransactionTrace::new(action, Vec::new()))
        })
        .collect()
}
