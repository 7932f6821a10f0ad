//! # oetrace
//!
//! OpenEthereum-style execution tracing: reconstructs call trees, per-instruction VM traces and
//! state diffs from the event stream of an interpreter replaying historical or ad-hoc messages.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub(crate) mod macros;

pub mod api;
pub mod assembler;
pub mod backend;
pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod message;
pub mod session;
pub mod state_diff;
pub mod tracer;

pub use api::TraceApi;
pub use config::{ChainConfig, Hardfork, TraceConfig};
pub use error::{Result, TraceError};
pub use hooks::{CallEnter, CallExit, CallKind, CancellationFlag, ExecutionHooks, FrameError, Step};
pub use logging::init_tracing;
pub use tracer::OeTracer;
