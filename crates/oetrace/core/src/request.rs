//! `trace_*` request types.

use crate::serde_helpers::sequence;
use alloy_eips::{BlockId, eip2930::AccessList};
use alloy_primitives::{Address, B256, Bytes, U64, U256};
use serde::{Deserialize, Serialize};

/// Parameters of an ad-hoc message, as accepted by `trace_call` and `trace_callMany`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TraceCallParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Recipient, `None` for contract creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_blob_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(alias = "input", skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_list: Option<AccessList>,
}

/// A parsed `trace_*` method call.
///
/// Trace types are kept as raw strings so an unknown kind is reported with its own error rather
/// than as a generic deserialization failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TraceRequest {
    #[serde(rename = "trace_call")]
    Call(TraceCallParams, Vec<String>, #[serde(default)] Option<BlockId>),

    #[serde(rename = "trace_callMany")]
    CallMany(Vec<(TraceCallParams, Vec<String>)>, #[serde(default)] Option<BlockId>),

    #[serde(rename = "trace_replayTransaction")]
    ReplayTransaction(B256, Vec<String>),

    #[serde(rename = "trace_replayBlockTransactions")]
    ReplayBlockTransactions(BlockId, Vec<String>),

    #[serde(rename = "trace_block", with = "sequence")]
    Block(BlockId),

    #[serde(rename = "trace_transaction", with = "sequence")]
    Transaction(B256),
}

impl TraceRequest {
    /// The JSON-RPC method name of this request.
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Call(..) => "trace_call",
            Self::CallMany(..) => "trace_callMany",
            Self::ReplayTransaction(..) => "trace_replayTransaction",
            Self::ReplayBlockTransactions(..) => "trace_replayBlockTransactions",
            Self::Block(_) => "trace_block",
            Self::Transaction(_) => "trace_transaction",
        }
    }
}
