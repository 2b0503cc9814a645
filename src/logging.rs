//! Structured logging setup.
//!
//! The substrate emits `tracing` spans/events around gate state transitions,
//! rebalance and merge passes, and GC sweeps, in place of counters serialised
//! to JSON for an external collector. This module only wires up a subscriber
//! for embedders that don't already have one; it does not itself define any
//! ambient logging policy.

use tracing_subscriber::EnvFilter;

/// Install a process-global `tracing` subscriber driven by `RUST_LOG`
/// (defaulting to `info`). Safe to call more than once; subsequent calls are
/// no-ops.
pub fn init_default() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
