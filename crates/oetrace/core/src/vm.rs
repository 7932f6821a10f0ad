//! Per-instruction VM trace types.

use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};

/// The instructions executed by one frame, with nested traces for its sub-calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmTrace {
    /// The code executed by the frame: init code for creations, callee code otherwise.
    pub code: Bytes,
    pub ops: Vec<VmInstruction>,
}

/// A single executed instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInstruction {
    pub cost: u64,
    /// Effects of the instruction, `None` if they could not be determined.
    pub ex: Option<VmExecutedOperation>,
    pub pc: usize,
    /// Trace of the frame spawned by a call-type instruction.
    pub sub: Option<VmTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Hierarchical position, e.g. `3-0-12`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<String>,
}

/// Observable effects of an instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmExecutedOperation {
    pub mem: Option<MemoryDelta>,
    pub push: Vec<U256>,
    pub store: Option<StorageDelta>,
    /// Gas remaining after the instruction.
    pub used: u64,
}

/// Memory written by an instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDelta {
    pub data: Bytes,
    pub off: usize,
}

/// Storage slot written by `SSTORE`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDelta {
    pub key: U256,
    pub val: U256,
}
