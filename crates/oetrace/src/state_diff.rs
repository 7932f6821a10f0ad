//! Collects touched accounts during execution and diffs them across snapshots.

use crate::{backend::StateView, config::ChainConfig};
use alloy_primitives::{Address, B256, U64, map::HashMap};
use oetrace_core::{AccountDiff, Delta, StateDiff};
use std::collections::BTreeMap;

/// Receives the accounts and storage slots a transaction modified.
///
/// Called by [`StateView::finalize`] once per executed message.
pub trait DiffSink {
    fn touch(&mut self, address: Address);

    fn touch_storage(&mut self, address: Address, key: B256, original: B256, new: B256);
}

/// A [`DiffSink`] discarding every notification, for messages replayed without a diff.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl DiffSink for NoopSink {
    fn touch(&mut self, _address: Address) {}

    fn touch_storage(&mut self, _address: Address, _key: B256, _original: B256, _new: B256) {}
}

/// Storage slots written by a transaction, keyed by slot, as `(original, new)`.
type SlotChanges = BTreeMap<B256, (B256, B256)>;

/// Accumulates touched accounts, then classifies them with [`StateDiffCollector::compare`].
#[derive(Debug)]
pub struct StateDiffCollector {
    chain: ChainConfig,
    touched: HashMap<Address, SlotChanges>,
}

impl StateDiffCollector {
    pub fn new(chain: ChainConfig) -> Self {
        Self { chain, touched: HashMap::default() }
    }

    /// Returns `true` if no account was touched.
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Compares every touched account between `before` and `after`.
    ///
    /// Accounts whose fields and storage are all unchanged are left out.
    pub fn compare(&self, before: &dyn StateView, after: &dyn StateView) -> StateDiff {
        let mut diff = StateDiff::default();
        for (address, slots) in &self.touched {
            let address = *address;
            // a slot written back to its original value is not a change
            let changed = || slots.iter().filter(|(_, (original, new))| original != new);
            let account = match (before.exists(address), after.exists(address)) {
                (true, true) => AccountDiff {
                    balance: Delta::from_values(before.balance(address), after.balance(address)),
                    code: Delta::from_values(before.code(address), after.code(address)),
                    nonce: Delta::from_values(
                        U64::from(before.nonce(address)),
                        U64::from(after.nonce(address)),
                    ),
                    storage: changed()
                        .map(|(key, (original, new))| (*key, Delta::changed(*original, *new)))
                        .collect(),
                },
                (true, false) => AccountDiff {
                    balance: Delta::Removed(before.balance(address)),
                    code: Delta::Removed(before.code(address)),
                    nonce: Delta::Removed(U64::from(before.nonce(address))),
                    storage: changed()
                        .map(|(key, (original, _))| (*key, Delta::Removed(*original)))
                        .collect(),
                },
                (false, true) => AccountDiff {
                    balance: Delta::Added(after.balance(address)),
                    code: Delta::Added(after.code(address)),
                    nonce: Delta::Added(U64::from(after.nonce(address))),
                    storage: changed().map(|(key, (_, new))| (*key, Delta::Added(*new))).collect(),
                },
                (false, false) => continue,
            };
            if account.is_unchanged() {
                continue
            }
            diff.insert(address, account);
        }
        diff
    }
}

impl DiffSink for StateDiffCollector {
    fn touch(&mut self, address: Address) {
        if self.chain.is_precompile(&address) {
            return
        }
        self.touched.entry(address).or_default();
    }

    fn touch_storage(&mut self, address: Address, key: B256, original: B256, new: B256) {
        if original == new || self.chain.is_precompile(&address) {
            return
        }
        self.touched
            .entry(address)
            .or_default()
            .entry(key)
            .and_modify(|(_, last)| *last = new)
            .or_insert((original, new));
    }
}
