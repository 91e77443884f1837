//! Shared helpers for in-crate tests.

use crate::runtime::{Builder, Runtime};

/// Install a test-friendly tracing subscriber, once per process.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}

/// A private runtime with an explicit worker cap, independent of the
/// process-wide one and of `COMAXPROCS`.
pub(crate) fn test_runtime(workers: usize) -> Runtime {
    init_tracing();
    Builder::new()
        .worker_threads(workers)
        .try_build()
        .expect("failed to build test runtime")
}
