//! Boundary to the collaborators the trace engine drives: chain data, account state, the
//! interpreter and the consensus engine.

use crate::{
    config::ChainConfig,
    error::{BackendError, InvalidMessage},
    hooks::{CancellationFlag, ExecutionHooks, FrameError},
    state_diff::DiffSink,
};
use alloy_eips::{BlockNumberOrTag, eip2930::AccessList};
use alloy_primitives::{Address, B256, Bytes, U256, address};
use oetrace_core::RewardType;
use std::fmt;

mod memory;
pub use memory::{MemoryAccount, MemoryState};

/// The fields of a block header the engine needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub beneficiary: Address,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub difficulty: U256,
    pub base_fee_per_gas: Option<u64>,
}

/// An executable message, either decoded from a transaction or built from call parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub from: Address,
    /// Recipient, `None` for contract creation.
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_blob_gas: U256,
    pub data: Bytes,
    pub access_list: AccessList,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub hash: B256,
    pub message: Message,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> B256 {
        self.header.hash
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Returns the position of the transaction with the given hash.
    pub fn transaction_index(&self, hash: B256) -> Option<usize> {
        self.transactions.iter().position(|tx| tx.hash == hash)
    }
}

/// Where a mined transaction is included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionLocation {
    pub block_hash: B256,
    pub block_number: u64,
    pub index: usize,
}

/// The block context a message executes in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionEnv {
    pub chain: ChainConfig,
    pub number: u64,
    pub beneficiary: Address,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub difficulty: U256,
    pub base_fee: Option<u64>,
}

impl ExecutionEnv {
    pub fn new(chain: ChainConfig, header: &Header) -> Self {
        Self {
            chain,
            number: header.number,
            beneficiary: header.beneficiary,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            difficulty: header.difficulty,
            base_fee: header.base_fee_per_gas,
        }
    }
}

/// Mutable account state a message executes against.
pub trait StateView: Send + fmt::Debug {
    fn balance(&self, address: Address) -> U256;

    fn nonce(&self, address: Address) -> u64;

    fn code(&self, address: Address) -> Bytes;

    fn storage(&self, address: Address, key: B256) -> B256;

    fn exists(&self, address: Address) -> bool;

    fn set_balance(&mut self, address: Address, balance: U256);

    fn set_nonce(&mut self, address: Address, nonce: u64);

    fn set_code(&mut self, address: Address, code: Bytes);

    fn set_storage(&mut self, address: Address, key: B256, value: B256);

    /// Removes the account, e.g. after `SELFDESTRUCT`.
    fn destroy(&mut self, address: Address);

    /// Returns an independent copy of the current state.
    fn snapshot(&self) -> Box<dyn StateView>;

    /// Ends the current message: reports every account and slot modified since the last call to
    /// `sink` and, if `delete_empty` is set, removes touched empty accounts.
    fn finalize(&mut self, delete_empty: bool, sink: &mut dyn DiffSink);
}

/// Result of a message that was applied, whether or not its root frame succeeded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub output: Bytes,
    pub gas_used: u64,
    pub error: Option<FrameError>,
}

/// The bytecode interpreter.
///
/// Implementations report every frame transition and executed instruction to `hooks`, and stop at
/// the next safe point once `cancel` is set.
#[auto_impl::auto_impl(&, Arc)]
pub trait Interpreter: Send + Sync {
    fn transact(
        &self,
        env: &ExecutionEnv,
        message: &Message,
        state: &mut dyn StateView,
        hooks: &mut dyn ExecutionHooks,
        cancel: &CancellationFlag,
    ) -> Result<ExecutionOutcome, InvalidMessage>;
}

/// Historical chain data.
#[auto_impl::auto_impl(&, Arc)]
pub trait ChainBackend: Send + Sync {
    fn chain_config(&self) -> ChainConfig;

    /// Resolves a block by number or tag. `pending` is never passed.
    fn block_by_number(&self, number: BlockNumberOrTag) -> Result<Option<Block>, BackendError>;

    fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, BackendError>;

    fn transaction_location(&self, hash: B256)
    -> Result<Option<TransactionLocation>, BackendError>;

    /// Returns the state after `block` was applied, re-executing at most `reexec` blocks to
    /// rebuild it if it is no longer available.
    fn state_at_block(&self, block: &Block, reexec: u64) -> Result<Box<dyn StateView>, BackendError>;
}

/// A reward paid at the end of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reward {
    pub beneficiary: Address,
    pub kind: RewardType,
    pub amount: U256,
}

/// Account that collects the fees a proof-of-staked-authority chain pays out through its system
/// contracts.
pub const SYSTEM_ADDRESS: Address = address!("0xfffffffffffffffffffffffffffffffffffffffe");

/// The consensus engine.
#[auto_impl::auto_impl(&, Arc)]
pub trait Consensus: Send + Sync {
    /// Whether `tx` is injected by the protocol rather than sent by a user.
    fn is_system_transaction(&self, tx: &Transaction, header: &Header) -> bool;

    /// The end-of-block rewards of `block`, empty if the protocol pays none.
    fn block_rewards(&self, block: &Block) -> Vec<Reward>;

    /// Whether `address` is one of the protocol's system contracts.
    fn is_system_contract(&self, _address: &Address) -> bool {
        false
    }

    /// The account whose balance is handed to the block producer before a system call.
    fn system_address(&self) -> Address {
        SYSTEM_ADDRESS
    }

    /// Whether `message` is a system call: sent by the block producer to a system contract for
    /// free.
    fn is_system_call(&self, env: &ExecutionEnv, message: &Message) -> bool {
        message.from == env.beneficiary &&
            message.gas_price.is_zero() &&
            message.to.is_some_and(|to| self.is_system_contract(&to))
    }

    /// Hands the system account's balance to the block producer if `message` is a system call.
    fn prepare_system_call(&self, env: &ExecutionEnv, message: &Message, state: &mut dyn StateView) {
        if !self.is_system_call(env, message) {
            return
        }
        let system = self.system_address();
        let balance = state.balance(system);
        if balance.is_zero() {
            return
        }
        trace!(target: "session", %balance, beneficiary = %env.beneficiary, "moving system balance");
        state.set_balance(system, U256::ZERO);
        let beneficiary = state.balance(env.beneficiary);
        state.set_balance(env.beneficiary, beneficiary + balance);
    }
}

/// A consensus engine without rewards or system transactions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRewards;

impl Consensus for NoRewards {
    fn is_system_transaction(&self, _tx: &Transaction, _header: &Header) -> bool {
        false
    }

    fn block_rewards(&self, _block: &Block) -> Vec<Reward> {
        Vec::new()
    }
}
