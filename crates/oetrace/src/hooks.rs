//! The event contract between the interpreter and the trace builders.

use alloy_primitives::{Address, Bytes, U256};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// The instruction or transition that opened a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
    SelfDestruct,
}

impl CallKind {
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// A new frame being entered.
#[derive(Clone, Debug)]
pub struct CallEnter {
    pub kind: CallKind,
    /// Caller, or the destroyed contract for [`CallKind::SelfDestruct`].
    pub from: Address,
    /// Callee, the created address, or the refund target for [`CallKind::SelfDestruct`].
    pub to: Address,
    /// Call data, or init code for creations.
    pub input: Bytes,
    pub gas: u64,
    pub value: U256,
    /// Code executed by the new frame.
    pub code: Bytes,
    /// Whether `to` is a precompiled contract.
    pub precompile: bool,
    /// Nesting depth, `0` for the transaction's root frame.
    pub depth: usize,
}

impl CallEnter {
    /// Zero-value calls into precompiles below the root are not traced.
    pub fn is_filtered_precompile(&self) -> bool {
        self.precompile && self.depth > 0 && self.value.is_zero()
    }
}

/// Reason a frame did not complete successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Execution ended with `REVERT`.
    Revert,
    /// Any other halt, e.g. `out of gas` or `invalid opcode`.
    Halt(String),
}

/// The innermost open frame being left.
#[derive(Clone, Debug)]
pub struct CallExit {
    pub output: Bytes,
    pub gas_used: u64,
    pub error: Option<FrameError>,
    pub depth: usize,
}

/// One executed instruction, observed before it runs.
#[derive(Clone, Copy, Debug)]
pub struct Step<'a> {
    pub pc: usize,
    pub op: u8,
    /// Gas available before the instruction.
    pub gas: u64,
    pub cost: u64,
    pub depth: usize,
    /// The operand stack, top of stack last.
    pub stack: &'a [U256],
    pub memory: &'a [u8],
}

impl Step<'_> {
    /// Returns the `n`-th item from the top of the stack.
    pub fn peek(&self, n: usize) -> Option<U256> {
        self.stack.len().checked_sub(n + 1).map(|i| self.stack[i])
    }

    /// Copies `len` bytes of memory at `offset`, zero-filled past the end of memory.
    pub fn memory_slice(&self, offset: usize, len: usize) -> Bytes {
        let mut data = vec![0u8; len];
        if offset < self.memory.len() {
            let end = offset.saturating_add(len).min(self.memory.len());
            data[..end - offset].copy_from_slice(&self.memory[offset..end]);
        }
        data.into()
    }
}

/// Consumer of the interpreter's event stream.
///
/// The interpreter calls these in depth-first order: `on_enter` when a frame opens, `on_step`
/// before each instruction of the innermost open frame and `on_exit` when it closes.
pub trait ExecutionHooks {
    fn on_enter(&mut self, enter: &CallEnter);

    fn on_exit(&mut self, exit: &CallExit);

    fn on_step(&mut self, step: &Step<'_>);
}

/// Hooks that ignore every event, used for untraced replay.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl ExecutionHooks for NoopHooks {
    fn on_enter(&mut self, _enter: &CallEnter) {}

    fn on_exit(&mut self, _exit: &CallExit) {}

    fn on_step(&mut self, _step: &Step<'_>) {}
}

/// Shared stop flag, set by the deadline watcher and polled by the interpreter.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
