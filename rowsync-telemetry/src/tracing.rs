//! Tracing subscriber setup shared by binaries and tests.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber for a service process.
///
/// The filter is taken from `RUST_LOG` and falls back to `info` for the
/// rowsync crates when the variable is unset.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rowsync=info")),
        )
        .init();
}

/// Initializes tracing for tests.
///
/// Uses the test writer so output is captured per test, and `try_init` since
/// multiple tests in the same binary will race to install the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rowsync=debug")),
        )
        .with_test_writer()
        .try_init();
}
