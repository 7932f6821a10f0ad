//! Call frame types of the parity trace format.

use crate::{state_diff::StateDiff, vm::VmTrace};
use alloy_primitives::{Address, B256, Bytes, U64, U256};
use serde::{Deserialize, Serialize};

/// Error string recorded on frames that ended with `REVERT`.
pub const REVERTED: &str = "Reverted";

/// The flavour of a message call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// Action of a message call frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAction {
    pub from: Address,
    pub call_type: CallType,
    pub gas: U64,
    pub input: Bytes,
    pub to: Address,
    pub value: U256,
}

/// Action of a contract creation frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAction {
    pub from: Address,
    pub gas: U64,
    pub init: Bytes,
    pub value: U256,
}

/// Action of a self-destruct frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuicideAction {
    /// The contract that destroyed itself.
    pub address: Address,
    /// Receiver of the remaining balance.
    pub refund_address: Address,
    pub balance: U256,
}

/// Kind of a synthetic reward frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewardType {
    Block,
    Uncle,
    EmptyStep,
    External,
}

/// Action of a synthetic end-of-block reward frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardAction {
    pub author: Address,
    pub reward_type: RewardType,
    pub value: U256,
}

/// The action payload of a frame, tagged by the frame's `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "action", rename_all = "lowercase")]
pub enum Action {
    Call(CallAction),
    Create(CreateAction),
    Suicide(SuicideAction),
    Reward(RewardAction),
}

impl Action {
    /// Returns the value transferred by this action.
    pub fn value(&self) -> U256 {
        match self {
            Self::Call(call) => call.value,
            Self::Create(create) => create.value,
            Self::Suicide(suicide) => suicide.balance,
            Self::Reward(reward) => reward.value,
        }
    }

    /// Returns `true` if this is a contract creation.
    pub fn is_create(&self) -> bool {
        matches!(self, Self::Create(_))
    }

    /// Returns `true` if this is a self-destruct.
    pub fn is_suicide(&self) -> bool {
        matches!(self, Self::Suicide(_))
    }
}

/// Result of a message call frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutput {
    pub gas_used: U64,
    pub output: Bytes,
}

/// Result of a contract creation frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutput {
    pub address: Address,
    pub code: Bytes,
    pub gas_used: U64,
}

/// Result payload of a frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceOutput {
    Create(CreateOutput),
    Call(CallOutput),
}

impl TraceOutput {
    pub fn set_gas_used(&mut self, gas_used: u64) {
        match self {
            Self::Create(create) => create.gas_used = U64::from(gas_used),
            Self::Call(call) => call.gas_used = U64::from(gas_used),
        }
    }

    /// Sets the returned bytes: `output` for calls, `code` for creations.
    pub fn set_output(&mut self, output: Bytes) {
        match self {
            Self::Create(create) => create.code = output,
            Self::Call(call) => call.output = output,
        }
    }
}

/// A single frame of a transaction's call tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTrace {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: Option<TraceOutput>,
    pub subtraces: usize,
    pub trace_address: Vec<usize>,
}

impl TransactionTrace {
    /// Creates a frame without result at the given address.
    pub fn new(action: Action, trace_address: Vec<usize>) -> Self {
        Self { action, error: None, result: None, subtraces: 0, trace_address }
    }

    /// Returns `true` if the frame ended with a revert.
    pub fn is_reverted(&self) -> bool {
        self.error.as_deref() == Some(REVERTED)
    }

    /// Returns `true` if the frame recorded any error, including reverts.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A frame stamped with the block and transaction it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedTransactionTrace {
    #[serde(flatten)]
    pub trace: TransactionTrace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_position: Option<u64>,
}

/// The assembled result of tracing one message.
///
/// Kinds that were not requested are left out of the JSON entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResults {
    pub output: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<StateDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TransactionTrace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_trace: Option<VmTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
}

/// One slot of a multi-message response.
///
/// A message that could not be applied keeps its slot with the error message instead of
/// discarding its siblings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchTraceResult {
    Success(TraceResults),
    Failure { error: String },
}

impl BatchTraceResult {
    /// Returns the trace results if the message was applied.
    pub fn as_success(&self) -> Option<&TraceResults> {
        match self {
            Self::Success(res) => Some(res),
            Self::Failure { .. } => None,
        }
    }
}
