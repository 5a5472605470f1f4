//! Tracing subscriber setup.
//!
//! Compact terminal output filtered by `RUST_LOG`, falling back to the given
//! default directive. Retries and check retries log at `debug`, failed
//! iterations at `warn`, exhausted checks at `error`.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber with the default filter.
///
/// Returns `false` if a subscriber was already installed; calling this
/// twice is harmless.
pub fn init() -> bool {
    init_with(DEFAULT_FILTER)
}

/// Install the global subscriber, using `default` when `RUST_LOG` is unset.
pub fn init_with(default: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .try_init()
        .is_ok()
}

/// Install a subscriber that writes through the test harness capture.
pub fn init_for_tests() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
