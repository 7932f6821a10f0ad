//! Builds the flattened parity call tree from enter/exit events.

use crate::{
    error::TraceError,
    hooks::{CallEnter, CallExit, CallKind, FrameError},
};
use alloy_primitives::{Bytes, U64, U256};
use oetrace_core::{
    Action, CallAction, CallOutput, CallType, CreateAction, CreateOutput, SuicideAction,
    TraceOutput, TransactionTrace, trace::REVERTED,
};

/// Gas values above this are assumed to have wrapped and are renormalized.
const GAS_CLAMP_THRESHOLD: u64 = 500_000_000;

/// Renormalizes an implausibly large gas value the way OpenEthereum reports it.
pub fn clamp_gas(gas: u64) -> u64 {
    if gas > GAS_CLAMP_THRESHOLD {
        (GAS_CLAMP_THRESHOLD + 1).wrapping_sub((1u64 << 63).wrapping_sub(gas))
    } else {
        gas
    }
}

/// Accumulates [`TransactionTrace`] frames in pre-order.
#[derive(Debug, Default)]
pub struct CallTraceBuilder {
    /// Bug-for-bug mode: ignore errors of a root-level create.
    compat: bool,
    frames: Vec<TransactionTrace>,
    /// Open frames, innermost last. `None` marks a filtered precompile call.
    stack: Vec<Option<usize>>,
    output: Bytes,
    underflow: bool,
}

impl CallTraceBuilder {
    pub fn new(compat: bool) -> Self {
        Self { compat, ..Default::default() }
    }

    /// Returns the recorded frames in pre-order.
    pub fn frames(&self) -> &[TransactionTrace] {
        &self.frames
    }

    /// Returns the bytes returned by the root frame.
    pub fn output(&self) -> &Bytes {
        &self.output
    }

    fn parent(&self) -> Option<usize> {
        self.stack.iter().rev().flatten().next().copied()
    }

    pub fn enter(&mut self, enter: &CallEnter) {
        let deep = enter.depth > 0;
        if deep && enter.is_filtered_precompile() {
            trace!(target: "tracer", to=?enter.to, "skipping precompile call");
            self.stack.push(None);
            return
        }

        let gas = U64::from(clamp_gas(enter.gas));
        let mut value = enter.value;
        let mut trace_address = Vec::new();

        if deep {
            if let Some(parent_idx) = self.parent() {
                let parent = &mut self.frames[parent_idx];
                trace_address = parent.trace_address.clone();
                trace_address.push(parent.subtraces);
                parent.subtraces += 1;

                match (enter.kind, &parent.action) {
                    (CallKind::DelegateCall, Action::Call(call)) => value = call.value,
                    (CallKind::DelegateCall, Action::Create(create)) => value = create.value,
                    (CallKind::StaticCall, _) => value = U256::ZERO,
                    _ => {}
                }
            } else {
                warn!(target: "tracer", depth = enter.depth, "nested frame without an open parent");
            }
        }

        let (action, result) = match enter.kind {
            CallKind::Create | CallKind::Create2 => (
                Action::Create(CreateAction {
                    from: enter.from,
                    gas,
                    init: enter.input.clone(),
                    value,
                }),
                Some(TraceOutput::Create(CreateOutput { address: enter.to, ..Default::default() })),
            ),
            CallKind::SelfDestruct => (
                Action::Suicide(SuicideAction {
                    address: enter.from,
                    refund_address: enter.to,
                    balance: value,
                }),
                None,
            ),
            kind => {
                let call_type = match kind {
                    CallKind::CallCode => CallType::CallCode,
                    CallKind::DelegateCall => CallType::DelegateCall,
                    CallKind::StaticCall => CallType::StaticCall,
                    _ => CallType::Call,
                };
                (
                    Action::Call(CallAction {
                        from: enter.from,
                        call_type,
                        gas,
                        input: enter.input.clone(),
                        to: enter.to,
                        value,
                    }),
                    Some(TraceOutput::Call(CallOutput::default())),
                )
            }
        };

        let mut frame = TransactionTrace::new(action, trace_address);
        frame.result = result;
        self.stack.push(Some(self.frames.len()));
        self.frames.push(frame);
    }

    pub fn exit(&mut self, exit: &CallExit) {
        let Some(open) = self.stack.pop() else {
            error!(target: "tracer", depth = exit.depth, "exit without a matching enter");
            self.underflow = true;
            return
        };
        let Some(idx) = open else { return };

        if exit.depth == 0 {
            self.output = exit.output.clone();
        }

        let frame = &mut self.frames[idx];
        let ignore_error = self.compat && exit.depth == 0 && frame.action.is_create();

        match &exit.error {
            Some(FrameError::Revert) if !ignore_error => {
                frame.error = Some(REVERTED.to_string());
                if let Some(result) = &mut frame.result {
                    result.set_gas_used(exit.gas_used);
                    result.set_output(exit.output.clone());
                }
            }
            Some(FrameError::Halt(msg)) if !ignore_error => {
                frame.result = None;
                frame.error = Some(msg.clone());
            }
            _ => {
                if let Some(result) = &mut frame.result {
                    if !exit.output.is_empty() {
                        result.set_output(exit.output.clone());
                    }
                    result.set_gas_used(exit.gas_used);
                }
            }
        }
    }

    /// Consumes the builder, returning the frames and the root output.
    pub fn finish(self) -> Result<(Vec<TransactionTrace>, Bytes), TraceError> {
        if self.underflow {
            return Err(TraceError::StackUnderflow);
        }
        if !self.stack.is_empty() {
            debug!(target: "tracer", open = self.stack.len(), "finished with open frames");
        }
        Ok((self.frames, self.output))
    }
}
