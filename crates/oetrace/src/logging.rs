//! Log targets and subscriber setup.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Target of the per-method RPC log lines.
pub const RPC_LOG_TARGET: &str = "rpc::trace";

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    FmtSubscriber::builder().with_env_filter(env_filter()).try_init().is_ok()
}
