//! Tracing configuration and initialization for evframe
//!
//! evframe logs through `tracing`: per-batch summaries at debug level, warnings for
//! padding geometry that cannot be inverted exactly. Install one of these subscribers
//! (or your own) to see them.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "warn,evframe=info";

/// Initialize tracing with default configuration
///
/// - Logs to stderr in compact format
/// - Respects RUST_LOG
/// - Default level: INFO for evframe, WARN for others
///
/// # Examples
///
/// ```rust
/// use evframe::tracing_config;
///
/// tracing_config::init();
/// // RUST_LOG=evframe=debug cargo run    # per-frame debug logging
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .init();
}

/// Initialize tracing with debug configuration
///
/// Debug level for evframe with file names and line numbers, pretty-printed.
pub fn init_debug() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,evframe=debug"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();
}

/// Initialize tracing with a custom EnvFilter directive
///
/// # Examples
///
/// ```rust
/// use evframe::tracing_config;
///
/// // Trace-level binning statistics only
/// tracing_config::init_with_filter("evframe::ev_representations=trace");
/// ```
pub fn init_with_filter(filter: &str) {
    let filter = EnvFilter::new(filter);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .init();
}

/// JSON formatted logs for structured parsing
pub fn init_json() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(filter)
        .init();
}

/// Initialize tracing for tests
///
/// Safe to call from every test: only the first call installs the subscriber.
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_test_writer())
        .with(EnvFilter::new(DEFAULT_FILTER))
        .try_init();
}
