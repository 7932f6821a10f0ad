//! The `trace_*` RPC namespace.

use crate::{
    assembler::{TraceLocation, reward_traces},
    backend::{
        Block, ChainBackend, Consensus, ExecutionEnv, Interpreter, StateView, TransactionLocation,
    },
    config::{ChainConfig, TraceConfig},
    error::{Result, ToRpcResponseResult, TraceError},
    macros::node_info,
    message::call_to_message,
    session::{TraceSession, run_with_deadline},
};
use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_primitives::B256;
use oetrace_core::{
    BatchTraceResult, LocalizedTransactionTrace, TraceCallParams, TraceRequest, TraceResults,
    TraceTypes,
};
use oetrace_rpc::{
    error::RpcError,
    request::RpcMethodCall,
    response::{ResponseResult, RpcResponse},
};
use std::sync::Arc;

/// Serves `trace_*` requests on top of the chain backend, interpreter and consensus engine.
#[derive(Clone)]
pub struct TraceApi {
    backend: Arc<dyn ChainBackend>,
    interpreter: Arc<dyn Interpreter>,
    consensus: Arc<dyn Consensus>,
    config: TraceConfig,
}

impl TraceApi {
    pub fn new(
        backend: Arc<dyn ChainBackend>,
        interpreter: Arc<dyn Interpreter>,
        consensus: Arc<dyn Consensus>,
        config: TraceConfig,
    ) -> Self {
        Self { backend, interpreter, consensus, config }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Parses a raw `{"method", "params"}` call and executes it.
    pub async fn handle_call(&self, call: RpcMethodCall) -> RpcResponse {
        trace!(target: "rpc", "received method call {:?}", call);
        let RpcMethodCall { method, params, id, .. } = call;

        let params: serde_json::Value = params.into();
        let call = serde_json::json!({
            "method": method,
            "params": params
        });

        match serde_json::from_value::<TraceRequest>(call) {
            Ok(req) => {
                let result = self.execute(req).await;
                trace!(target: "rpc", "sending rpc result {:?}", result);
                RpcResponse::new(id, result)
            }
            Err(err) => {
                let msg = err.to_string();
                warn!(target: "rpc", "failed to deserialize method `{}`: {}", method, msg);
                if msg.contains("unknown variant") {
                    RpcResponse::new(id, RpcError::method_not_found())
                } else {
                    RpcResponse::new(id, RpcError::invalid_params(msg))
                }
            }
        }
    }

    /// Executes a parsed trace request.
    pub async fn execute(&self, request: TraceRequest) -> ResponseResult {
        trace!(target: "rpc::trace", method = request.method(), "executing trace request");
        let response = match request.clone() {
            TraceRequest::Call(params, types, block) => {
                self.trace_call(params, types, block).await.to_rpc_result()
            }
            TraceRequest::CallMany(calls, block) => {
                self.trace_call_many(calls, block).await.to_rpc_result()
            }
            TraceRequest::ReplayTransaction(hash, types) => {
                self.trace_replay_transaction(hash, types).await.to_rpc_result()
            }
            TraceRequest::ReplayBlockTransactions(block, types) => {
                self.trace_replay_block_transactions(block, types).await.to_rpc_result()
            }
            TraceRequest::Block(block) => self.trace_block(block).await.to_rpc_result(),
            TraceRequest::Transaction(hash) => self.trace_transaction(hash).await.to_rpc_result(),
        };

        if let ResponseResult::Error(err) = &response {
            node_info!("\nRPC request failed:");
            node_info!("    Request: {:?}", request);
            node_info!("    Error: {}\n", err);
        }

        response
    }

    /// Handler for RPC call: `trace_call`
    pub async fn trace_call(
        &self,
        params: TraceCallParams,
        types: Vec<String>,
        block: Option<BlockId>,
    ) -> Result<TraceResults> {
        node_info!("trace_call");
        let types = TraceTypes::from_names(&types)?;
        let block = self.resolve_block(block)?;
        let mut state = self.backend.state_at_block(&block, self.config.reexec)?;
        let env = ExecutionEnv::new(self.chain(), &block.header);
        let gas_cap = self.config.rpc_gas_cap;

        self.run(move |session| {
            let message = call_to_message(&params, gas_cap, env.base_fee, &*state);
            session.trace_message(&env, &message, state.as_mut(), types)
        })
        .await
    }

    /// Handler for RPC call: `trace_callMany`
    ///
    /// Every trace type is validated before the first message runs.
    pub async fn trace_call_many(
        &self,
        calls: Vec<(TraceCallParams, Vec<String>)>,
        block: Option<BlockId>,
    ) -> Result<Vec<BatchTraceResult>> {
        node_info!("trace_callMany");
        let calls = calls
            .into_iter()
            .map(|(params, types)| -> Result<_> { Ok((params, TraceTypes::from_names(&types)?)) })
            .collect::<Result<Vec<_>>>()?;
        let block = self.resolve_block(block)?;
        let mut state = self.backend.state_at_block(&block, self.config.reexec)?;
        let env = ExecutionEnv::new(self.chain(), &block.header);
        let gas_cap = self.config.rpc_gas_cap;

        self.run(move |session| {
            let mut results = Vec::with_capacity(calls.len());
            for (params, types) in calls {
                let message = call_to_message(&params, gas_cap, env.base_fee, &*state);
                match session.trace_message(&env, &message, state.as_mut(), types) {
                    Ok(res) => results.push(BatchTraceResult::Success(res)),
                    Err(err @ TraceError::Execution(_)) => {
                        results.push(BatchTraceResult::Failure { error: err.to_string() })
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(results)
        })
        .await
    }

    /// Handler for RPC call: `trace_replayTransaction`
    pub async fn trace_replay_transaction(
        &self,
        hash: B256,
        types: Vec<String>,
    ) -> Result<TraceResults> {
        node_info!("trace_replayTransaction");
        let types = TraceTypes::from_names(&types)?;
        self.replay_transaction(hash, types).await.map(|(res, _, _)| res)
    }

    /// Handler for RPC call: `trace_replayBlockTransactions`
    pub async fn trace_replay_block_transactions(
        &self,
        block: BlockId,
        types: Vec<String>,
    ) -> Result<Vec<BatchTraceResult>> {
        node_info!("trace_replayBlockTransactions");
        let types = TraceTypes::from_names(&types)?;
        let block = self.resolve_block(Some(block))?;
        let mut state = self.parent_state(&block)?;
        let env = ExecutionEnv::new(self.chain(), &block.header);

        self.run(move |session| {
            session.trace_block(&env, &block.transactions, state.as_mut(), types)
        })
        .await
    }

    /// Handler for RPC call: `trace_block`
    pub async fn trace_block(&self, block: BlockId) -> Result<Vec<LocalizedTransactionTrace>> {
        node_info!("trace_block");
        let block = self.resolve_block(Some(block))?;
        let mut state = self.parent_state(&block)?;
        let env = ExecutionEnv::new(self.chain(), &block.header);

        let location = TraceLocation::block(block.hash(), block.number());
        let rewards = reward_traces(self.consensus.block_rewards(&block), location);
        let rewards_after = block
            .transactions
            .iter()
            .rposition(|tx| !self.consensus.is_system_transaction(tx, &block.header));

        self.run(move |session| {
            session.trace_block_frames(
                &env,
                location,
                &block.transactions,
                state.as_mut(),
                rewards,
                rewards_after,
            )
        })
        .await
    }

    /// Handler for RPC call: `trace_transaction`
    pub async fn trace_transaction(&self, hash: B256) -> Result<Vec<LocalizedTransactionTrace>> {
        node_info!("trace_transaction");
        let (res, block, location) = self.replay_transaction(hash, TraceTypes::trace_only()).await?;
        let location =
            TraceLocation::transaction(block.hash(), block.number(), hash, location.index);
        Ok(res.trace.unwrap_or_default().into_iter().map(|trace| location.localize(trace)).collect())
    }

    /// Re-executes the block of transaction `hash` up to and including it, tracing only the
    /// transaction itself.
    async fn replay_transaction(
        &self,
        hash: B256,
        types: TraceTypes,
    ) -> Result<(TraceResults, Block, TransactionLocation)> {
        let location = self
            .backend
            .transaction_location(hash)?
            .ok_or(TraceError::TransactionNotFound(hash))?;
        let block = self
            .backend
            .block_by_hash(location.block_hash)?
            .ok_or(TraceError::BlockHashNotFound(location.block_hash))?;
        let mut state = self.parent_state(&block)?;
        let env = ExecutionEnv::new(self.chain(), &block.header);

        let replayed = block.clone();
        let res = self
            .run(move |session| {
                let (tx, before) = replayed
                    .transactions
                    .get(..=location.index)
                    .and_then(<[_]>::split_last)
                    .ok_or(TraceError::TransactionNotFound(hash))?;
                session.replay(&env, before, state.as_mut())?;
                session.trace_message(&env, &tx.message, state.as_mut(), types)
            })
            .await?;
        Ok((res, block, location))
    }

    /// Runs `f` on the blocking pool with a fresh session bound to the trace deadline.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TraceSession) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let interpreter = self.interpreter.clone();
        let consensus = self.consensus.clone();
        let chain = self.chain();
        let compat = self.config.compat;
        run_with_deadline(self.config.timeout(), move |cancel| {
            f(&TraceSession::new(interpreter, consensus, chain, compat, cancel))
        })
        .await
    }

    fn chain(&self) -> ChainConfig {
        self.backend.chain_config()
    }

    /// Resolves the block a request targets, `latest` if none is given.
    fn resolve_block(&self, block: Option<BlockId>) -> Result<Block> {
        match block.unwrap_or_default() {
            BlockId::Hash(hash) => {
                let hash = hash.block_hash;
                self.backend.block_by_hash(hash)?.ok_or(TraceError::BlockHashNotFound(hash))
            }
            BlockId::Number(BlockNumberOrTag::Pending) => Err(TraceError::PendingBlock),
            BlockId::Number(tag) => self.backend.block_by_number(tag)?.ok_or(match tag {
                BlockNumberOrTag::Number(number) => TraceError::BlockNumberNotFound(number),
                tag => TraceError::BlockTagNotFound(tag),
            }),
        }
    }

    /// The state a block's transactions execute on.
    fn parent_state(&self, block: &Block) -> Result<Box<dyn StateView>> {
        if block.number() == 0 {
            return Err(TraceError::GenesisNotTraceable)
        }
        let parent_hash = block.header.parent_hash;
        let parent = self
            .backend
            .block_by_hash(parent_hash)?
            .ok_or(TraceError::BlockHashNotFound(parent_hash))?;
        Ok(self.backend.state_at_block(&parent, self.config.reexec)?)
    }
}

impl std::fmt::Debug for TraceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceApi").field("config", &self.config).finish_non_exhaustive()
    }
}
