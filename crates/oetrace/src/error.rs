//! Aggregated error type of the trace engine

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use oetrace_core::UnknownTraceType;
use oetrace_rpc::{error::RpcError, response::ResponseResult};
use serde::Serialize;

pub type Result<T, E = TraceError> = std::result::Result<T, E>;

/// Failure reported by a chain backend or state provider.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn msg(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A message the interpreter refused to apply, e.g. `nonce too low` or `intrinsic gas too low`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidMessage(pub String);

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    UnrecognizedTraceType(#[from] UnknownTraceType),
    #[error("tracing on top of pending is not supported")]
    PendingBlock,
    #[error("genesis is not traceable")]
    GenesisNotTraceable,
    #[error("block #{0} not found")]
    BlockNumberNotFound(u64),
    #[error("block {0} not found")]
    BlockHashNotFound(B256),
    #[error("block {0} not found")]
    BlockTagNotFound(BlockNumberOrTag),
    #[error("transaction not found")]
    TransactionNotFound(B256),
    #[error("tracing failed: {0}")]
    Execution(#[from] InvalidMessage),
    #[error("execution timeout")]
    Timeout,
    #[error("trace stack underflow: exit without a matching enter")]
    StackUnderflow,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Helper trait to easily convert results to rpc results
pub(crate) trait ToRpcResponseResult {
    fn to_rpc_result(self) -> ResponseResult;
}

/// Converts a serializable value into a `ResponseResult`
pub fn to_rpc_result<T: Serialize>(val: T) -> ResponseResult {
    match serde_json::to_value(val) {
        Ok(success) => ResponseResult::Success(success),
        Err(err) => {
            error!(target: "rpc::trace", "failed to serialize rpc response: {:?}", err);
            ResponseResult::error(RpcError::internal_error())
        }
    }
}

impl From<TraceError> for RpcError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::InvalidParams(_) |
            TraceError::UnrecognizedTraceType(_) |
            TraceError::PendingBlock |
            TraceError::GenesisNotTraceable => Self::invalid_params(err.to_string()),
            TraceError::BlockNumberNotFound(_) |
            TraceError::BlockHashNotFound(_) |
            TraceError::BlockTagNotFound(_) |
            TraceError::TransactionNotFound(_) => Self::not_found(err.to_string()),
            TraceError::Execution(_) | TraceError::Timeout => Self::server_error(err.to_string()),
            TraceError::StackUnderflow | TraceError::Internal(_) => {
                error!(target: "rpc::trace", %err, "internal trace error");
                Self::internal_error_with(err.to_string())
            }
            TraceError::Backend(err) => {
                warn!(target: "rpc::trace", %err, "backend failure");
                Self::internal_error_with(err.to_string())
            }
        }
    }
}

impl<T: Serialize> ToRpcResponseResult for Result<T> {
    fn to_rpc_result(self) -> ResponseResult {
        match self {
            Ok(val) => to_rpc_result(val),
            Err(err) => RpcError::from(err).into(),
        }
    }
}
