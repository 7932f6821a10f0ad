//! # oetrace-core
//!
//! Wire types of the OpenEthereum-style `trace_*` namespace: call frames, VM traces, state diffs
//! and the request enum the RPC layer deserializes into.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod request;
pub mod serde_helpers;
pub mod state_diff;
pub mod trace;
pub mod trace_type;
pub mod vm;

pub use request::{TraceCallParams, TraceRequest};
pub use state_diff::{AccountDiff, ChangedType, Delta, StateDiff};
pub use trace::{
    Action, BatchTraceResult, CallAction, CallOutput, CallType, CreateAction, CreateOutput,
    LocalizedTransactionTrace, RewardAction, RewardType, SuicideAction, TraceOutput, TraceResults,
    TransactionTrace,
};
pub use trace_type::{TraceType, TraceTypes, UnknownTraceType};
pub use vm::{MemoryDelta, StorageDelta, VmExecutedOperation, VmInstruction, VmTrace};
