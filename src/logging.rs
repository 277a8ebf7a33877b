//! Tracing setup for embedding applications and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the embedding process. These helpers install a formatted subscriber filtered
//! by `WAYMARK_LOG` (default `warn`). Both are no-ops when a global subscriber
//! is already set.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "WAYMARK_LOG";

/// Initialize the tracing subscriber from `WAYMARK_LOG`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initialize tracing with a custom filter string (for testing or embedding).
pub fn init_logging_with_filter(filter: &str) {
    let filter = EnvFilter::new(filter);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging_with_filter("waymark=debug");
        init_logging_with_filter("waymark=trace");
        init_logging();
        tracing::debug!(target: "waymark", "subscriber installed once");
    }
}
