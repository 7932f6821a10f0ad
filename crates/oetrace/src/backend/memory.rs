use super::StateView;
use crate::state_diff::DiffSink;
use alloy_primitives::{Address, B256, Bytes, U256};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryAccount {
    pub balance: U256,
    pub nonce: u64,
    pub code: Bytes,
    pub storage: BTreeMap<B256, B256>,
}

impl MemoryAccount {
    /// Empty as defined by EIP-161.
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.code.is_empty()
    }
}

/// A [`StateView`] held entirely in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryState {
    accounts: BTreeMap<Address, MemoryAccount>,
    /// Accounts modified since the last finalize.
    dirty: BTreeSet<Address>,
    /// Original values of slots modified since the last finalize.
    originals: BTreeMap<(Address, B256), B256>,
}

impl MemoryState {
    /// Inserts or replaces an account without tracking the change.
    pub fn insert_account(&mut self, address: Address, balance: U256, nonce: u64, code: Bytes) {
        let account = self.accounts.entry(address).or_default();
        account.balance = balance;
        account.nonce = nonce;
        account.code = code;
    }

    /// Writes a storage slot without tracking the change.
    pub fn set_slot(&mut self, address: Address, key: B256, value: B256) {
        self.accounts.entry(address).or_default().storage.insert(key, value);
    }

    pub fn account(&self, address: Address) -> Option<&MemoryAccount> {
        self.accounts.get(&address)
    }

    fn account_mut(&mut self, address: Address) -> &mut MemoryAccount {
        self.dirty.insert(address);
        self.accounts.entry(address).or_default()
    }
}

impl StateView for MemoryState {
    fn balance(&self, address: Address) -> U256 {
        self.accounts.get(&address).map(|acc| acc.balance).unwrap_or_default()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.accounts.get(&address).map(|acc| acc.nonce).unwrap_or_default()
    }

    fn code(&self, address: Address) -> Bytes {
        self.accounts.get(&address).map(|acc| acc.code.clone()).unwrap_or_default()
    }

    fn storage(&self, address: Address, key: B256) -> B256 {
        self.accounts
            .get(&address)
            .and_then(|acc| acc.storage.get(&key).copied())
            .unwrap_or_default()
    }

    fn exists(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.account_mut(address).balance = balance;
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.account_mut(address).nonce = nonce;
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.account_mut(address).code = code;
    }

    fn set_storage(&mut self, address: Address, key: B256, value: B256) {
        let original = self.storage(address, key);
        self.originals.entry((address, key)).or_insert(original);
        self.account_mut(address).storage.insert(key, value);
    }

    fn destroy(&mut self, address: Address) {
        self.dirty.insert(address);
        self.accounts.remove(&address);
    }

    fn snapshot(&self) -> Box<dyn StateView> {
        Box::new(self.clone())
    }

    fn finalize(&mut self, delete_empty: bool, sink: &mut dyn DiffSink) {
        for address in std::mem::take(&mut self.dirty) {
            sink.touch(address);
            if delete_empty && self.accounts.get(&address).is_some_and(MemoryAccount::is_empty) {
                self.accounts.remove(&address);
            }
        }
        for ((address, key), original) in std::mem::take(&mut self.originals) {
            let new = self.storage(address, key);
            sink.touch_storage(address, key, original, new);
        }
    }
}
