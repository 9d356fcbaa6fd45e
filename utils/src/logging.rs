//! Minimal `tracing` initialization.

use tracing_subscriber::EnvFilter;

/// Install a `RUST_LOG`-filtered subscriber for tests. Output goes through
/// the test writer; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
