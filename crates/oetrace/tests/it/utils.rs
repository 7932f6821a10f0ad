//! In-memory collaborators for driving the trace API.

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, B256, Bytes, U256, address, keccak256, map::HashMap};
use oetrace::{
    CallEnter, CallExit, CallKind, CancellationFlag, ChainConfig, ExecutionHooks, FrameError,
    Hardfork, Step, TraceApi, TraceConfig,
    backend::{
        Block, ChainBackend, Consensus, ExecutionEnv, ExecutionOutcome, Header, Interpreter,
        MemoryState, Message, Reward, StateView, Transaction, TransactionLocation,
    },
    error::{BackendError, InvalidMessage},
    hooks::NoopHooks,
    state_diff::NoopSink,
};
use oetrace_core::RewardType;
use parking_lot::Mutex;
use revm::bytecode::opcode;
use std::{sync::Arc, time::Duration};

pub const ALICE: Address = Address::with_last_byte(0xa1);
pub const BOB: Address = Address::with_last_byte(0xb0);
pub const CONTRACT: Address = Address::with_last_byte(0xc0);
pub const LIBRARY: Address = Address::with_last_byte(0xc1);
pub const MINER: Address = Address::with_last_byte(0xcb);
/// A system contract the block producer pays its collected fees into.
pub const VALIDATORS: Address = address!("0x0000000000000000000000000000000000001000");

/// Block reward paid by [`TestConsensus`].
pub const BLOCK_REWARD: u128 = 2_000_000_000_000_000_000;

/// Gas charged for a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// Gas charged for a contract creation.
pub const CREATE_GAS: u64 = 53_000;

/// Gas charged per scripted instruction.
pub const OP_GAS: u64 = 100;

/// Gas charged by a precompile.
pub const PRECOMPILE_GAS: u64 = 3_000;

pub fn chain_config() -> ChainConfig {
    ChainConfig::new(1, Hardfork::London)
}

/// One instruction of a scripted contract.
#[derive(Clone, Debug)]
pub enum Op {
    Store(B256, B256),
    Call { kind: CallKind, to: Address, value: U256 },
    Return(Bytes),
    Revert(Bytes),
    SelfDestruct(Address),
    /// Loops until the execution is cancelled.
    Spin,
}

/// An interpreter that runs scripted contracts instead of bytecode.
///
/// Accounts without a script behave like externally owned accounts.
#[derive(Debug, Default)]
pub struct ScriptedInterpreter {
    scripts: HashMap<Address, Vec<Op>>,
    executed: Mutex<usize>,
}

impl ScriptedInterpreter {
    pub fn with_script(mut self, address: Address, script: Vec<Op>) -> Self {
        self.scripts.insert(address, script);
        self
    }

    /// Number of messages executed so far.
    pub fn executed(&self) -> usize {
        *self.executed.lock()
    }
}

impl Interpreter for ScriptedInterpreter {
    fn transact(
        &self,
        env: &ExecutionEnv,
        message: &Message,
        state: &mut dyn StateView,
        hooks: &mut dyn ExecutionHooks,
        cancel: &CancellationFlag,
    ) -> Result<ExecutionOutcome, InvalidMessage> {
        *self.executed.lock() += 1;

        let nonce = state.nonce(message.from);
        if message.nonce != nonce {
            return Err(InvalidMessage(format!(
                "nonce too low: address {}, tx: {} state: {}",
                message.from, message.nonce, nonce
            )));
        }
        let balance = state.balance(message.from);
        if balance < message.value {
            return Err(InvalidMessage(format!(
                "insufficient funds for gas * price + value: address {} have {} want {}",
                message.from, balance, message.value
            )));
        }
        state.set_nonce(message.from, nonce + 1);

        let mut exec = Execution { scripts: &self.scripts, env, state, hooks, cancel };
        let exit = match message.to {
            Some(to) => exec.call(
                CallKind::Call,
                message.from,
                to,
                message.value,
                message.data.clone(),
                message.gas_limit,
                0,
            ),
            None => exec.create(message.from, nonce, message.value, message.data.clone(), message.gas_limit),
        };
        Ok(ExecutionOutcome { output: exit.output, gas_used: exit.gas_used, error: exit.error })
    }
}

struct Execution<'a> {
    scripts: &'a HashMap<Address, Vec<Op>>,
    env: &'a ExecutionEnv,
    state: &'a mut dyn StateView,
    hooks: &'a mut dyn ExecutionHooks,
    cancel: &'a CancellationFlag,
}

impl Execution<'_> {
    fn transfer(&mut self, from: Address, to: Address, value: U256) {
        if value.is_zero() {
            return
        }
        let from_balance = self.state.balance(from);
        self.state.set_balance(from, from_balance.saturating_sub(value));
        let to_balance = self.state.balance(to);
        self.state.set_balance(to, to_balance + value);
    }

    fn step(&mut self, pc: usize, op: u8, gas: u64, stack: &[U256]) {
        self.hooks.on_step(&Step { pc, op, gas, cost: OP_GAS, depth: 0, stack, memory: &[] });
    }

    #[allow(clippy::too_many_arguments)]
    fn call(
        &mut self,
        kind: CallKind,
        from: Address,
        to: Address,
        value: U256,
        input: Bytes,
        gas: u64,
        depth: usize,
    ) -> CallExit {
        let scripts = self.scripts;
        let precompile = self.env.chain.is_precompile(&to);
        let code = self.state.code(to);
        self.hooks.on_enter(&CallEnter {
            kind,
            from,
            to,
            input,
            gas,
            value,
            code,
            precompile,
            depth,
        });
        if matches!(kind, CallKind::Call) {
            self.transfer(from, to, value);
        }

        let exit = if precompile {
            CallExit { output: Bytes::new(), gas_used: PRECOMPILE_GAS, error: None, depth }
        } else if let Some(script) = scripts.get(&to) {
            self.run(to, script, gas, depth)
        } else {
            let gas_used = if depth == 0 { TRANSFER_GAS } else { 0 };
            CallExit { output: Bytes::new(), gas_used, error: None, depth }
        };
        self.hooks.on_exit(&exit);
        exit
    }

    fn create(
        &mut self,
        from: Address,
        nonce: u64,
        value: U256,
        init: Bytes,
        gas: u64,
    ) -> CallExit {
        let created = from.create(nonce);
        self.hooks.on_enter(&CallEnter {
            kind: CallKind::Create,
            from,
            to: created,
            input: init.clone(),
            gas,
            value,
            code: Bytes::new(),
            precompile: false,
            depth: 0,
        });
        self.transfer(from, created, value);
        self.state.set_nonce(created, 1);
        // init code deploys itself
        self.state.set_code(created, init.clone());

        let exit = CallExit { output: init, gas_used: CREATE_GAS, error: None, depth: 0 };
        self.hooks.on_exit(&exit);
        exit
    }

    fn run(&mut self, address: Address, script: &[Op], gas: u64, depth: usize) -> CallExit {
        let mut gas_left = gas;
        let aborted = |gas_left: u64| CallExit {
            output: Bytes::new(),
            gas_used: gas - gas_left,
            error: Some(FrameError::Halt("execution aborted".to_string())),
            depth,
        };

        for (pc, op) in script.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return aborted(gas_left)
            }
            match op {
                Op::Store(key, val) => {
                    let stack = [U256::from_be_bytes(val.0), U256::from_be_bytes(key.0)];
                    self.step(pc, opcode::SSTORE, gas_left, &stack);
                    self.state.set_storage(address, *key, *val);
                    gas_left -= OP_GAS;
                }
                Op::Call { kind, to, value } => {
                    let op = match kind {
                        CallKind::DelegateCall => opcode::DELEGATECALL,
                        CallKind::StaticCall => opcode::STATICCALL,
                        CallKind::CallCode => opcode::CALLCODE,
                        _ => opcode::CALL,
                    };
                    let child_gas = gas_left / 2;
                    let target = U256::from_be_slice(to.as_slice());
                    let stack = match kind {
                        CallKind::DelegateCall | CallKind::StaticCall => {
                            vec![U256::ZERO, U256::ZERO, U256::ZERO, U256::ZERO, target, U256::from(child_gas)]
                        }
                        _ => vec![
                            U256::ZERO,
                            U256::ZERO,
                            U256::ZERO,
                            U256::ZERO,
                            *value,
                            target,
                            U256::from(child_gas),
                        ],
                    };
                    self.step(pc, op, gas_left, &stack);
                    let child =
                        self.call(*kind, address, *to, *value, Bytes::new(), child_gas, depth + 1);
                    gas_left -= OP_GAS + child.gas_used;
                }
                Op::Return(data) => {
                    self.step(pc, opcode::RETURN, gas_left, &[]);
                    gas_left -= OP_GAS;
                    return CallExit {
                        output: data.clone(),
                        gas_used: gas - gas_left,
                        error: None,
                        depth,
                    }
                }
                Op::Revert(data) => {
                    self.step(pc, opcode::REVERT, gas_left, &[]);
                    gas_left -= OP_GAS;
                    return CallExit {
                        output: data.clone(),
                        gas_used: gas - gas_left,
                        error: Some(FrameError::Revert),
                        depth,
                    }
                }
                Op::SelfDestruct(beneficiary) => {
                    self.step(pc, opcode::SELFDESTRUCT, gas_left, &[]);
                    let balance = self.state.balance(address);
                    self.hooks.on_enter(&CallEnter {
                        kind: CallKind::SelfDestruct,
                        from: address,
                        to: *beneficiary,
                        input: Bytes::new(),
                        gas: 0,
                        value: balance,
                        code: Bytes::new(),
                        precompile: false,
                        depth: depth + 1,
                    });
                    self.transfer(address, *beneficiary, balance);
                    self.state.destroy(address);
                    self.hooks.on_exit(&CallExit {
                        output: Bytes::new(),
                        gas_used: 0,
                        error: None,
                        depth: depth + 1,
                    });
                    gas_left -= OP_GAS;
                    return CallExit { output: Bytes::new(), gas_used: gas - gas_left, error: None, depth }
                }
                Op::Spin => loop {
                    if self.cancel.is_cancelled() {
                        return aborted(gas_left)
                    }
                    self.step(pc, opcode::JUMP, gas_left, &[U256::from(pc)]);
                    std::thread::sleep(Duration::from_millis(1));
                },
            }
        }

        self.step(script.len(), opcode::STOP, gas_left, &[]);
        CallExit { output: Bytes::new(), gas_used: gas - gas_left, error: None, depth }
    }
}

/// A chain kept in memory, with the state after every block.
#[derive(Debug)]
pub struct MemoryChain {
    chain: ChainConfig,
    blocks: Vec<Block>,
    states: Vec<MemoryState>,
}

impl MemoryChain {
    /// Builds a chain from `genesis`, applying `blocks` of messages with `interpreter`.
    ///
    /// Messages the interpreter rejects are still included in their block.
    pub fn build(
        interpreter: &dyn Interpreter,
        consensus: &dyn Consensus,
        genesis: MemoryState,
        blocks: Vec<Vec<Message>>,
    ) -> Self {
        let chain = chain_config();
        let genesis_block = Block { header: header(0, B256::ZERO), transactions: Vec::new() };
        let mut this = Self { chain, blocks: vec![genesis_block], states: vec![genesis] };

        for messages in blocks {
            let number = this.blocks.len() as u64;
            let parent_hash = this.blocks[this.blocks.len() - 1].hash();
            let header = header(number, parent_hash);
            let env = ExecutionEnv::new(chain, &header);

            let mut state = this.states[this.states.len() - 1].clone();
            let mut transactions = Vec::new();
            for (index, message) in messages.into_iter().enumerate() {
                consensus.prepare_system_call(&env, &message, &mut state);
                let res = interpreter.transact(
                    &env,
                    &message,
                    &mut state,
                    &mut NoopHooks,
                    &CancellationFlag::new(),
                );
                if res.is_ok() {
                    state.finalize(chain.is_eip158(), &mut NoopSink);
                }
                let hash = keccak256([number.to_be_bytes(), (index as u64).to_be_bytes()].concat());
                transactions.push(Transaction { hash, message });
            }
            this.blocks.push(Block { header, transactions });
            this.states.push(state);
        }
        this
    }

    pub fn block(&self, number: u64) -> &Block {
        &self.blocks[number as usize]
    }
}

fn header(number: u64, parent_hash: B256) -> Header {
    Header {
        number,
        hash: keccak256(number.to_be_bytes()),
        parent_hash,
        beneficiary: MINER,
        timestamp: 1_700_000_000 + number * 12,
        gas_limit: 30_000_000,
        difficulty: U256::ZERO,
        base_fee_per_gas: None,
    }
}

impl ChainBackend for MemoryChain {
    fn chain_config(&self) -> ChainConfig {
        self.chain
    }

    fn block_by_number(&self, number: BlockNumberOrTag) -> Result<Option<Block>, BackendError> {
        let block = match number {
            BlockNumberOrTag::Number(number) => self.blocks.get(number as usize),
            BlockNumberOrTag::Earliest => self.blocks.first(),
            BlockNumberOrTag::Pending => {
                return Err(BackendError::msg("pending block is not available"))
            }
            _ => self.blocks.last(),
        };
        Ok(block.cloned())
    }

    fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, BackendError> {
        Ok(self.blocks.iter().find(|block| block.hash() == hash).cloned())
    }

    fn transaction_location(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionLocation>, BackendError> {
        Ok(self.blocks.iter().find_map(|block| {
            block.transaction_index(hash).map(|index| TransactionLocation {
                block_hash: block.hash(),
                block_number: block.number(),
                index,
            })
        }))
    }

    fn state_at_block(
        &self,
        block: &Block,
        _reexec: u64,
    ) -> Result<Box<dyn StateView>, BackendError> {
        self.states
            .get(block.number() as usize)
            .filter(|_| self.blocks.get(block.number() as usize).is_some_and(|b| b.hash() == block.hash()))
            .map(|state| state.snapshot())
            .ok_or_else(|| BackendError::msg(format!("missing state for block {}", block.hash())))
    }
}

/// Pays a fixed block reward to the block's beneficiary.
///
/// Free calls from the beneficiary into one of `system_contracts` are system transactions.
#[derive(Clone, Debug)]
pub struct TestConsensus {
    pub reward: U256,
    pub system_contracts: Vec<Address>,
}

impl Default for TestConsensus {
    fn default() -> Self {
        Self { reward: U256::from(BLOCK_REWARD), system_contracts: Vec::new() }
    }
}

impl TestConsensus {
    pub fn with_system_contract(mut self, address: Address) -> Self {
        self.system_contracts.push(address);
        self
    }
}

impl Consensus for TestConsensus {
    fn is_system_transaction(&self, tx: &Transaction, header: &Header) -> bool {
        let message = &tx.message;
        message.from == header.beneficiary &&
            message.gas_price.is_zero() &&
            message.to.is_some_and(|to| self.is_system_contract(&to))
    }

    fn block_rewards(&self, block: &Block) -> Vec<Reward> {
        vec![Reward {
            beneficiary: block.header.beneficiary,
            kind: RewardType::Block,
            amount: self.reward,
        }]
    }

    fn is_system_contract(&self, address: &Address) -> bool {
        self.system_contracts.contains(address)
    }
}

pub fn transfer(from: Address, to: Address, value: u64, nonce: u64) -> Message {
    Message {
        from,
        to: Some(to),
        nonce,
        value: U256::from(value),
        gas_limit: 100_000,
        ..Default::default()
    }
}

pub fn genesis() -> MemoryState {
    let mut state = MemoryState::default();
    state.insert_account(ALICE, U256::from(1_000_000), 0, Bytes::new());
    state.insert_account(CONTRACT, U256::ZERO, 1, Bytes::from_static(&[0x60, 0x00]));
    state.insert_account(LIBRARY, U256::ZERO, 1, Bytes::from_static(&[0x60, 0x01]));
    state
}

/// A test node: the trace API over an in-memory chain and a scripted interpreter.
pub struct TestNode {
    pub api: TraceApi,
    pub chain: Arc<MemoryChain>,
    pub interpreter: Arc<ScriptedInterpreter>,
}

impl TestNode {
    pub fn new(interpreter: ScriptedInterpreter, blocks: Vec<Vec<Message>>) -> Self {
        Self::with_config(interpreter, blocks, TraceConfig::default())
    }

    pub fn with_config(
        interpreter: ScriptedInterpreter,
        blocks: Vec<Vec<Message>>,
        config: TraceConfig,
    ) -> Self {
        Self::build(interpreter, TestConsensus::default(), genesis(), blocks, config)
    }

    pub fn build(
        interpreter: ScriptedInterpreter,
        consensus: TestConsensus,
        genesis: MemoryState,
        blocks: Vec<Vec<Message>>,
        config: TraceConfig,
    ) -> Self {
        crate::init_tracing();
        let interpreter = Arc::new(interpreter);
        let consensus = Arc::new(consensus);
        let chain = Arc::new(MemoryChain::build(
            interpreter.as_ref(),
            consensus.as_ref(),
            genesis,
            blocks,
        ));
        let api = TraceApi::new(chain.clone(), interpreter.clone(), consensus, config);
        Self { api, chain, interpreter }
    }
}
