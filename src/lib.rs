#![deny(unsafe_op_in_unsafe_fn)]

//! Ultra-low-latency ingress packet interception and response engine: an
//! Ethernet/IPv4/TCP/UDP fast path that matches a single configured
//! endpoint, runs a small pluggable application handler on the payload, and
//! synthesises and transmits a response frame directly, bypassing the
//! normal stack for everything that doesn't match.

pub mod app_logic;
pub mod buffer_pool;
pub mod checksum;
pub mod config;
pub mod conn_tracker;
pub mod control;
pub mod debug_surface;
pub mod error;
pub mod jhash;
pub mod parser;
pub mod pipeline;
pub mod raw_send;
pub mod response_builder;
pub mod status;
pub mod stats;
pub mod telemetry;
pub mod validator;

pub use config::{Config, Protocol, SharedConfig};
pub use error::{EngineError, Result};
pub use pipeline::{Decision, Pipeline};
pub use stats::StatsSnapshot;

use tracing_subscriber::EnvFilter;

/// Initializes the process-wide `tracing` subscriber from `RUST_LOG`,
/// defaulting to `info`. Safe to call once at process start.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}
