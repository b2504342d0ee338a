#![forbid(unsafe_code)]

//! Deterministic host-tree harness for exercising rootward.
//!
//! The engine itself never owns a tree; it expects a host framework to
//! hold providers and consumers at positions and to re-evaluate them when
//! something is dirty. [`TreeHost`] is that framework shrunk to a test
//! double: an id-addressed tree, an explicit [`flush`](TreeHost::flush)
//! pass, and per-position evaluation/notification counters that make
//! propagation behavior directly assertable.

pub mod host;

pub use host::{NodeId, TreeHost};

/// Route `tracing` output from the crates under test to the test writer.
///
/// Controlled by `RUST_LOG`; safe to call from every test, only the first
/// call installs anything.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
