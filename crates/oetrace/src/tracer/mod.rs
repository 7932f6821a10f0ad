//! Trace builders driven by the interpreter's event stream.

mod call;
mod vm;

pub use call::{CallTraceBuilder, clamp_gas};
pub use vm::VmTraceBuilder;

use crate::{
    error::TraceError,
    hooks::{CallEnter, CallExit, CancellationFlag, ExecutionHooks, Step},
};
use alloy_primitives::Bytes;
use oetrace_core::{TraceTypes, TransactionTrace, VmTrace};

/// Everything recorded while executing one message.
#[derive(Clone, Debug, Default)]
pub struct TracerOutput {
    pub output: Bytes,
    pub trace: Vec<TransactionTrace>,
    pub vm_trace: Option<VmTrace>,
}

/// Feeds interpreter events into the builders selected by the requested [`TraceTypes`].
///
/// Once `cancel` is set, all further events are dropped.
#[derive(Debug)]
pub struct OeTracer {
    calls: CallTraceBuilder,
    vm: Option<VmTraceBuilder>,
    cancel: CancellationFlag,
}

impl OeTracer {
    pub fn new(types: TraceTypes, compat: bool, cancel: CancellationFlag) -> Self {
        Self {
            calls: CallTraceBuilder::new(compat),
            vm: types.vm_trace.then(|| VmTraceBuilder::new(compat)),
            cancel,
        }
    }

    pub fn finish(self) -> Result<TracerOutput, TraceError> {
        let (trace, output) = self.calls.finish()?;
        Ok(TracerOutput { output, trace, vm_trace: self.vm.map(VmTraceBuilder::finish) })
    }
}

impl ExecutionHooks for OeTracer {
    fn on_enter(&mut self, enter: &CallEnter) {
        if self.cancel.is_cancelled() {
            return
        }
        self.calls.enter(enter);
        if let Some(vm) = &mut self.vm {
            vm.enter(enter);
        }
    }

    fn on_exit(&mut self, exit: &CallExit) {
        if self.cancel.is_cancelled() {
            return
        }
        self.calls.exit(exit);
        if let Some(vm) = &mut self.vm {
            vm.exit(exit);
        }
    }

    fn on_step(&mut self, step: &Step<'_>) {
        if self.cancel.is_cancelled() {
            return
        }
        if let Some(vm) = &mut self.vm {
            vm.step(step);
        }
    }
}
