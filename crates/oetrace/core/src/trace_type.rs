//! The `traceTypes` parameter.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A kind of output that can be requested from the `trace_*` namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceType {
    /// The flattened call tree.
    Trace,
    /// Per-instruction VM trace.
    VmTrace,
    /// Account state diff.
    StateDiff,
}

impl TraceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::VmTrace => "vmTrace",
            Self::StateDiff => "stateDiff",
        }
    }
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a `traceTypes` entry that is none of `trace`, `vmTrace`, `stateDiff`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized trace type: {0}")]
pub struct UnknownTraceType(pub String);

impl FromStr for TraceType {
    type Err = UnknownTraceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Self::Trace),
            "vmTrace" => Ok(Self::VmTrace),
            "stateDiff" => Ok(Self::StateDiff),
            _ => Err(UnknownTraceType(s.to_string())),
        }
    }
}

/// The set of requested output kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceTypes {
    pub trace: bool,
    pub vm_trace: bool,
    pub state_diff: bool,
}

impl TraceTypes {
    /// Only the call tree, as used by `trace_block` and `trace_transaction`.
    pub const fn trace_only() -> Self {
        Self { trace: true, vm_trace: false, state_diff: false }
    }

    /// Parses the raw `traceTypes` parameter, failing on the first unknown entry.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownTraceType> {
        let mut types = Self::default();
        for name in names {
            types.insert(name.as_ref().parse()?);
        }
        Ok(types)
    }

    pub fn insert(&mut self, ty: TraceType) {
        match ty {
            TraceType::Trace => self.trace = true,
            TraceType::VmTrace => self.vm_trace = true,
            TraceType::StateDiff => self.state_diff = true,
        }
    }

    pub fn contains(&self, ty: TraceType) -> bool {
        match ty {
            TraceType::Trace => self.trace,
            TraceType::VmTrace => self.vm_trace,
            TraceType::StateDiff => self.state_diff,
        }
    }
}

impl FromIterator<TraceType> for TraceTypes {
    fn from_iter<I: IntoIterator<Item = TraceType>>(iter: I) -> Self {
        let mut types = Self::default();
        for ty in iter {
            types.insert(ty);
        }
        types
    }
}
