//! Drives the interpreter for one request and assembles its results.

use crate::{
    assembler::{TraceLocation, assemble, localize},
    backend::{Consensus, ExecutionEnv, Interpreter, Message, StateView, Transaction},
    config::ChainConfig,
    error::{Result, TraceError},
    hooks::{CancellationFlag, NoopHooks},
    state_diff::{NoopSink, StateDiffCollector},
    tracer::OeTracer,
};
use oetrace_core::{BatchTraceResult, LocalizedTransactionTrace, TraceResults, TraceTypes};
use std::{sync::Arc, time::Duration};

/// Runs `f` on the blocking pool with a cancellation flag that is set once `timeout` elapses.
pub async fn run_with_deadline<T, F>(timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce(CancellationFlag) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationFlag::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(timeout).await;
            debug!(target: "session", ?timeout, "trace deadline reached, cancelling");
            cancel.cancel();
        }
    });

    let res = tokio::task::spawn_blocking(move || f(cancel)).await;
    watcher.abort();
    res.map_err(|err| TraceError::Internal(format!("trace task failed: {err}")))?
}

/// Executes the messages of one request.
#[derive(Clone)]
pub struct TraceSession {
    interpreter: Arc<dyn Interpreter>,
    consensus: Arc<dyn Consensus>,
    chain: ChainConfig,
    compat: bool,
    cancel: CancellationFlag,
}

impl TraceSession {
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        consensus: Arc<dyn Consensus>,
        chain: ChainConfig,
        compat: bool,
        cancel: CancellationFlag,
    ) -> Self {
        Self { interpreter, consensus, chain, compat, cancel }
    }

    fn check_deadline(&self) -> Result<()> {
        if self.cancel.is_cancelled() { Err(TraceError::Timeout) } else { Ok(()) }
    }

    /// Traces `message` on top of `state`, leaving `state` with its effects applied.
    pub fn trace_message(
        &self,
        env: &ExecutionEnv,
        message: &Message,
        state: &mut dyn StateView,
        types: TraceTypes,
    ) -> Result<TraceResults> {
        self.check_deadline()?;
        self.consensus.prepare_system_call(env, message, state);
        let before = types.state_diff.then(|| state.snapshot());

        let mut tracer = OeTracer::new(types, self.compat, self.cancel.clone());
        let outcome = self.interpreter.transact(env, message, state, &mut tracer, &self.cancel);
        self.check_deadline()?;
        let outcome = outcome?;
        trace!(target: "session", gas_used = outcome.gas_used, error = ?outcome.error, "message executed");

        let mut collector = StateDiffCollector::new(self.chain);
        state.finalize(self.chain.is_eip158(), &mut collector);
        let state_diff = before.map(|before| collector.compare(before.as_ref(), &*state));

        Ok(assemble(types, tracer.finish()?, state_diff))
    }

    /// Applies `transactions` without tracing.
    ///
    /// Transactions that cannot be applied leave the state untouched, as they do in block replay.
    pub fn replay(
        &self,
        env: &ExecutionEnv,
        transactions: &[Transaction],
        state: &mut dyn StateView,
    ) -> Result<()> {
        for tx in transactions {
            self.check_deadline()?;
            self.consensus.prepare_system_call(env, &tx.message, state);
            let res = self.interpreter.transact(env, &tx.message, state, &mut NoopHooks, &self.cancel);
            self.check_deadline()?;
            match res {
                Ok(_) => state.finalize(self.chain.is_eip158(), &mut NoopSink),
                Err(err) => warn!(target: "session", tx = %tx.hash, %err, "skipping transaction"),
            }
        }
        Ok(())
    }

    /// Traces every transaction of a block in order.
    ///
    /// A transaction that cannot be applied is reported in its slot, later transactions still run.
    pub fn trace_block(
        &self,
        env: &ExecutionEnv,
        transactions: &[Transaction],
        state: &mut dyn StateView,
        types: TraceTypes,
    ) -> Result<Vec<BatchTraceResult>> {
        let mut results = Vec::with_capacity(transactions.len());
        for tx in transactions {
            match self.trace_message(env, &tx.message, state, types) {
                Ok(mut res) => {
                    res.transaction_hash = Some(tx.hash);
                    results.push(BatchTraceResult::Success(res));
                }
                Err(err @ TraceError::Execution(_)) => {
                    warn!(target: "session", tx = %tx.hash, %err, "failed to trace transaction");
                    results.push(BatchTraceResult::Failure { error: err.to_string() });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }

    /// Traces every transaction of a block into one flat list of located call frames.
    ///
    /// `rewards` are inserted after the frames of the transaction at `rewards_after`, or first
    /// if that is `None`.
    pub fn trace_block_frames(
        &self,
        env: &ExecutionEnv,
        block: TraceLocation,
        transactions: &[Transaction],
        state: &mut dyn StateView,
        rewards: Vec<LocalizedTransactionTrace>,
        rewards_after: Option<usize>,
    ) -> Result<Vec<LocalizedTransactionTrace>> {
        let mut rewards = Some(rewards);
        let mut frames = Vec::new();
        if rewards_after.is_none() {
            frames.extend(rewards.take().into_iter().flatten());
        }

        let results = self.trace_block(env, transactions, state, TraceTypes::trace_only())?;
        for (index, (tx, res)) in transactions.iter().zip(results).enumerate() {
            if let BatchTraceResult::Success(res) = res {
                let location = TraceLocation::transaction(
                    block.block_hash,
                    block.block_number,
                    tx.hash,
                    index,
                );
                frames.extend(localize(res.trace.unwrap_or_default(), location));
            }
            if rewards_after == Some(index) {
                frames.extend(rewards.take().into_iter().flatten());
            }
        }
        Ok(frames)
    }
}

impl std::fmt::Debug for TraceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSession")
            .field("chain", &self.chain)
            .field("compat", &self.compat)
            .finish_non_exhaustive()
    }
}
