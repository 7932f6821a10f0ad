//! Builds the per-instruction [`VmTrace`] from step events.
//!
//! The effects of an instruction (pushed values, written memory) are only observable once it has
//! executed, so every record is kept pending until the next step of the same frame finalizes it.
//! A call-type instruction is finalized at the first step of its frame after the callee returns.

use crate::hooks::{CallEnter, CallExit, Step};
use alloy_primitives::U256;
use oetrace_core::{MemoryDelta, StorageDelta, VmExecutedOperation, VmInstruction, VmTrace};
use revm::bytecode::opcode::{self, OpCode};

/// A `(offset, len)` region of memory.
type MemRegion = (usize, usize);

/// Number of stack items an instruction leaves behind that are reported as `push`.
fn pushed_items(op: u8) -> usize {
    match op {
        opcode::PUSH0..=opcode::PUSH32 => 1,
        opcode::SWAP1..=opcode::SWAP16 => (op - opcode::SWAP1) as usize + 2,
        opcode::DUP1..=opcode::DUP16 => (op - opcode::DUP1) as usize + 2,
        opcode::CALLDATALOAD |
        opcode::SLOAD |
        opcode::MLOAD |
        opcode::CALLDATASIZE |
        opcode::LT |
        opcode::GT |
        opcode::DIV |
        opcode::SDIV |
        opcode::SAR |
        opcode::AND |
        opcode::EQ |
        opcode::CALLVALUE |
        opcode::ISZERO |
        opcode::ADD |
        opcode::EXP |
        opcode::CALLER |
        opcode::KECCAK256 |
        opcode::SUB |
        opcode::ADDRESS |
        opcode::GAS |
        opcode::MUL |
        opcode::RETURNDATASIZE |
        opcode::NOT |
        opcode::SHR |
        opcode::SHL |
        opcode::EXTCODESIZE |
        opcode::SLT |
        opcode::OR |
        opcode::NUMBER |
        opcode::PC |
        opcode::TIMESTAMP |
        opcode::BALANCE |
        opcode::SELFBALANCE |
        opcode::MULMOD |
        opcode::ADDMOD |
        opcode::BASEFEE |
        opcode::BLOCKHASH |
        opcode::BYTE |
        opcode::XOR |
        opcode::ORIGIN |
        opcode::CODESIZE |
        opcode::MOD |
        opcode::SIGNEXTEND |
        opcode::GASLIMIT |
        opcode::DIFFICULTY |
        opcode::SGT |
        opcode::GASPRICE |
        opcode::MSIZE |
        opcode::EXTCODEHASH |
        opcode::SMOD |
        opcode::CHAINID |
        opcode::COINBASE => 1,
        _ => 0,
    }
}

fn to_usize(value: U256) -> usize {
    value.saturating_to()
}

/// Memory region written or read by `step`, captured before it executes.
fn memory_region(step: &Step<'_>) -> Option<MemRegion> {
    let region = |off: usize, len: usize| {
        Some((to_usize(step.peek(off)?), to_usize(step.peek(len)?)))
    };
    match step.op {
        opcode::MSTORE | opcode::MLOAD => Some((to_usize(step.peek(0)?), 32)),
        opcode::MSTORE8 => Some((to_usize(step.peek(0)?), 1)),
        opcode::RETURNDATACOPY | opcode::CALLDATACOPY | opcode::CODECOPY => region(0, 2),
        opcode::EXTCODECOPY => region(1, 3),
        _ => None,
    }
}

/// Output region of a call-type instruction, filled when the callee returns.
fn return_region(step: &Step<'_>) -> Option<MemRegion> {
    match step.op {
        opcode::STATICCALL | opcode::DELEGATECALL => {
            Some((to_usize(step.peek(4)?), to_usize(step.peek(5)?)))
        }
        opcode::CALL | opcode::CALLCODE => Some((to_usize(step.peek(5)?), to_usize(step.peek(6)?))),
        _ => None,
    }
}

/// An open [`VmTrace`] node.
#[derive(Debug)]
struct OpenTrace {
    trace: VmTrace,
    /// Prefix of the `idx` of every instruction in this node, e.g. `3-0-`.
    prefix: String,
    /// Index of the instruction in the parent node that opened this one.
    parent_op: Option<usize>,
    /// Output region of that instruction.
    ret: Option<MemRegion>,
    /// Zero-value precompile call, never attached to its parent.
    filtered: bool,
}

/// The most recently emitted instruction, awaiting its effects.
#[derive(Debug)]
struct PendingOp {
    /// Number of open nodes when the instruction was emitted.
    level: usize,
    index: usize,
    op: u8,
    mem: Option<MemRegion>,
    ret: Option<MemRegion>,
}

/// A call-type instruction whose callee has returned.
#[derive(Debug)]
struct ReturnedCall {
    index: usize,
    ret: Option<MemRegion>,
}

#[derive(Debug, Default)]
pub struct VmTraceBuilder {
    /// Bug-for-bug mode: omit `op` and `idx`.
    compat: bool,
    stack: Vec<OpenTrace>,
    root: Option<VmTrace>,
    pending: Option<PendingOp>,
    returned: Option<ReturnedCall>,
    last_op: Option<u8>,
}

impl VmTraceBuilder {
    pub fn new(compat: bool) -> Self {
        Self { compat, ..Default::default() }
    }

    pub fn enter(&mut self, enter: &CallEnter) {
        let code = if enter.kind.is_create() { enter.input.clone() } else { enter.code.clone() };
        let ret = self.pending.take().and_then(|pending| pending.ret);
        self.returned = None;

        let Some(parent) = self.stack.last_mut() else {
            self.stack.push(OpenTrace {
                trace: VmTrace { code, ops: Vec::new() },
                prefix: String::new(),
                parent_op: None,
                ret: None,
                filtered: false,
            });
            return
        };

        let parent_op = parent.trace.ops.len().checked_sub(1);
        if enter.kind.is_create() {
            if let Some(op) = parent_op.and_then(|idx| parent.trace.ops.get_mut(idx)) {
                op.cost += enter.gas;
            }
        }
        let prefix = match (self.compat, parent_op) {
            (false, Some(idx)) => format!("{}{idx}-", parent.prefix),
            _ => parent.prefix.clone(),
        };

        self.stack.push(OpenTrace {
            trace: VmTrace { code, ops: Vec::new() },
            prefix,
            parent_op,
            ret,
            filtered: enter.is_filtered_precompile(),
        });
    }

    pub fn exit(&mut self, _exit: &CallExit) {
        // the last instruction of a frame is never finalized
        self.pending = None;
        self.returned = None;

        let Some(node) = self.stack.pop() else { return };
        let Some(parent) = self.stack.last_mut() else {
            self.root = Some(node.trace);
            return
        };
        let Some(index) = node.parent_op else { return };
        if !node.filtered {
            if let Some(op) = parent.trace.ops.get_mut(index) {
                op.sub = Some(node.trace);
            }
        }
        self.returned = Some(ReturnedCall { index, ret: node.ret });
    }

    pub fn step(&mut self, step: &Step<'_>) {
        let level = self.stack.len();
        let Some(node) = self.stack.last_mut() else { return };

        if let Some(pending) = self.pending.take() {
            if pending.level == level {
                if let Some(ex) = node.trace.ops.get_mut(pending.index).and_then(|op| op.ex.as_mut())
                {
                    for i in (0..pushed_items(pending.op)).rev() {
                        ex.push.extend(step.peek(i));
                    }
                    if let Some((off, len)) = pending.mem.filter(|(_, len)| *len > 0) {
                        ex.mem = Some(MemoryDelta { data: step.memory_slice(off, len), off });
                    }
                }
            }
        }

        if let Some(returned) = self.returned.take() {
            if let Some(ex) = node.trace.ops.get_mut(returned.index).and_then(|op| op.ex.as_mut()) {
                ex.used = step.gas;
                ex.push = step.peek(0).into_iter().collect();
                if let Some((off, len)) = returned.ret.filter(|(_, len)| *len > 0) {
                    ex.mem = Some(MemoryDelta { data: step.memory_slice(off, len), off });
                }
            }
        }

        if self.last_op == Some(opcode::STOP) && step.op == opcode::STOP && level == 1 {
            trace!(target: "tracer", pc = step.pc, "dropping repeated STOP");
            return
        }

        let store = if step.op == opcode::SSTORE {
            step.peek(0).zip(step.peek(1)).map(|(key, val)| StorageDelta { key, val })
        } else {
            None
        };
        let ex = step.gas.checked_sub(step.cost).map(|used| VmExecutedOperation {
            mem: None,
            push: Vec::new(),
            store,
            used,
        });

        let index = node.trace.ops.len();
        let (op, idx) = if self.compat {
            (None, None)
        } else {
            let name = OpCode::new(step.op).map_or("INVALID", |op| op.as_str());
            (Some(name.to_string()), Some(format!("{}{index}", node.prefix)))
        };
        node.trace.ops.push(VmInstruction {
            cost: step.cost,
            ex,
            pc: step.pc,
            sub: None,
            op,
            idx,
        });

        self.pending = Some(PendingOp {
            level,
            index,
            op: step.op,
            mem: memory_region(step),
            ret: return_region(step),
        });
        self.last_op = Some(step.op);
    }

    /// Consumes the builder, returning the root trace.
    ///
    /// Nodes left open by an interrupted execution are closed in place.
    pub fn finish(mut self) -> VmTrace {
        while let Some(node) = self.stack.pop() {
            match (self.stack.last_mut(), node.parent_op) {
                (Some(parent), Some(index)) if !node.filtered => {
                    if let Some(op) = parent.trace.ops.get_mut(index) {
                        op.sub = Some(node.trace);
                    }
                }
                (None, _) => self.root = Some(node.trace),
                _ => {}
            }
        }
        self.root.unwrap_or_default()
    }
}
