//! Account state diff types.

use alloy_primitives::{Address, B256, Bytes, U64, U256};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
};

/// The `from`/`to` pair of a changed value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedType<T> {
    pub from: T,
    pub to: T,
}

/// Classification of a single value across execution.
///
/// Serialized as `"="`, `{"+": v}`, `{"-": v}` or `{"*": {"from": a, "to": b}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta<T> {
    #[serde(rename = "=")]
    Unchanged,
    #[serde(rename = "+")]
    Added(T),
    #[serde(rename = "-")]
    Removed(T),
    #[serde(rename = "*")]
    Changed(ChangedType<T>),
}

impl<T: PartialEq> Delta<T> {
    /// Compares two values of an account that exists before and after execution.
    pub fn from_values(from: T, to: T) -> Self {
        if from == to { Self::Unchanged } else { Self::changed(from, to) }
    }

    pub fn changed(from: T, to: T) -> Self {
        Self::Changed(ChangedType { from, to })
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Changes of a single account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDiff {
    pub balance: Delta<U256>,
    pub code: Delta<Bytes>,
    pub nonce: Delta<U64>,
    pub storage: BTreeMap<B256, Delta<B256>>,
}

impl AccountDiff {
    /// An account diff with every field unchanged and no storage entries.
    pub fn unchanged() -> Self {
        Self {
            balance: Delta::Unchanged,
            code: Delta::Unchanged,
            nonce: Delta::Unchanged,
            storage: BTreeMap::new(),
        }
    }

    /// Returns `true` if nothing about this account changed.
    pub fn is_unchanged(&self) -> bool {
        self.balance.is_unchanged() &&
            self.code.is_unchanged() &&
            self.nonce.is_unchanged() &&
            self.storage.values().all(Delta::is_unchanged)
    }
}

/// Account diffs keyed by address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDiff(pub BTreeMap<Address, AccountDiff>);

impl Deref for StateDiff {
    type Target = BTreeMap<Address, AccountDiff>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StateDiff {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
