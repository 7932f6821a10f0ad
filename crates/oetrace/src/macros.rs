/// An `info!` helper that emits to the `rpc::trace` target, used to log every handled method.
macro_rules! node_info {
    ($($arg:tt)*) => {
        tracing::info!(target: $crate::logging::RPC_LOG_TARGET, $($arg)*);
    };
}

pub(crate) use node_info;
