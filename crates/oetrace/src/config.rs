//! Engine and chain configuration.

use alloy_primitives::Address;
use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use revm::{
    precompile::{PrecompileSpecId, Precompiles},
    primitives::hardfork::SpecId,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration};

/// Settings of the trace engine.
///
/// Loaded from defaults, an optional `oetrace.toml` and `OETRACE_` prefixed environment variables,
/// in increasing priority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Execution budget of a single request, in seconds.
    pub trace_timeout: u64,
    /// How many blocks the backend may re-execute to rebuild a missing historical state.
    pub reexec: u64,
    /// Upper bound for the gas of ad-hoc calls, `0` for no bound.
    pub rpc_gas_cap: u64,
    /// Bug-for-bug output mode.
    pub compat: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            trace_timeout: Self::DEFAULT_TRACE_TIMEOUT,
            reexec: Self::DEFAULT_REEXEC,
            rpc_gas_cap: Self::DEFAULT_RPC_GAS_CAP,
            compat: false,
        }
    }
}

impl TraceConfig {
    /// The name of the config file.
    pub const FILE_NAME: &'static str = "oetrace.toml";

    /// Prefix of the environment variables overriding file values.
    pub const ENV_PREFIX: &'static str = "OETRACE_";

    pub const DEFAULT_TRACE_TIMEOUT: u64 = 5;

    pub const DEFAULT_REEXEC: u64 = 128;

    pub const DEFAULT_RPC_GAS_CAP: u64 = 50_000_000;

    /// Loads the config from the current working directory.
    pub fn load() -> Result<Self, figment::Error> {
        Self::try_from(Self::figment())
    }

    /// Loads the config with `root` as the directory containing `oetrace.toml`.
    pub fn load_with_root(root: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::try_from(Self::figment_with_root(root))
    }

    /// Extracts a `TraceConfig` from `provider`.
    pub fn try_from<T: Provider>(provider: T) -> Result<Self, figment::Error> {
        Figment::from(provider).extract()
    }

    /// The default [`Figment`], rooted at the current working directory.
    pub fn figment() -> Figment {
        Self::figment_with_root(".")
    }

    pub fn figment_with_root(root: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(root.as_ref().join(Self::FILE_NAME)))
            .merge(Env::prefixed(Self::ENV_PREFIX))
    }

    pub fn with_trace_timeout(mut self, secs: u64) -> Self {
        self.trace_timeout = secs;
        self
    }

    pub fn with_reexec(mut self, reexec: u64) -> Self {
        self.reexec = reexec;
        self
    }

    pub fn with_rpc_gas_cap(mut self, cap: u64) -> Self {
        self.rpc_gas_cap = cap;
        self
    }

    pub fn with_compat(mut self, compat: bool) -> Self {
        self.compat = compat;
        self
    }

    /// The execution budget of a single request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.trace_timeout)
    }
}

/// Protocol upgrades relevant to tracing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Hardfork {
    Frontier,
    Homestead,
    Tangerine,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
    Cancun,
    #[default]
    Prague,
}

impl Hardfork {
    /// The revm spec this hardfork executes with.
    pub const fn spec_id(&self) -> SpecId {
        match self {
            Self::Frontier => SpecId::FRONTIER,
            Self::Homestead => SpecId::HOMESTEAD,
            Self::Tangerine => SpecId::TANGERINE,
            Self::SpuriousDragon => SpecId::SPURIOUS_DRAGON,
            Self::Byzantium => SpecId::BYZANTIUM,
            Self::Constantinople => SpecId::CONSTANTINOPLE,
            Self::Petersburg => SpecId::PETERSBURG,
            Self::Istanbul => SpecId::ISTANBUL,
            Self::Berlin => SpecId::BERLIN,
            Self::London => SpecId::LONDON,
            Self::Paris => SpecId::MERGE,
            Self::Shanghai => SpecId::SHANGHAI,
            Self::Cancun => SpecId::CANCUN,
            Self::Prague => SpecId::PRAGUE,
        }
    }
}

impl FromStr for Hardfork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        let hardfork = match s.as_str() {
            "frontier" | "1" => Self::Frontier,
            "homestead" | "2" => Self::Homestead,
            "tangerine" | "tangerinewhistle" | "3" => Self::Tangerine,
            "spuriousdragon" | "spurious" | "4" => Self::SpuriousDragon,
            "byzantium" | "5" => Self::Byzantium,
            "constantinople" | "6" => Self::Constantinople,
            "petersburg" | "7" => Self::Petersburg,
            "istanbul" | "8" => Self::Istanbul,
            "berlin" | "9" => Self::Berlin,
            "london" | "10" => Self::London,
            "paris" | "merge" | "11" => Self::Paris,
            "shanghai" | "12" => Self::Shanghai,
            "cancun" | "13" => Self::Cancun,
            "prague" | "14" | "latest" => Self::Prague,
            _ => return Err(format!("Unknown hardfork {s}")),
        };
        Ok(hardfork)
    }
}

impl fmt::Display for Hardfork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Chain parameters the trace engine depends on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    pub hardfork: Hardfork,
}

impl ChainConfig {
    pub const fn new(chain_id: u64, hardfork: Hardfork) -> Self {
        Self { chain_id, hardfork }
    }

    pub const fn spec_id(&self) -> SpecId {
        self.hardfork.spec_id()
    }

    /// The precompiles active at the configured hardfork.
    pub fn precompiles(&self) -> &'static Precompiles {
        Precompiles::new(PrecompileSpecId::from_spec_id(self.spec_id()))
    }

    pub fn is_precompile(&self, address: &Address) -> bool {
        self.precompiles().contains(address)
    }

    /// Whether empty accounts are deleted at the end of a transaction.
    pub fn is_eip158(&self) -> bool {
        self.hardfork >= Hardfork::SpuriousDragon
    }
}
