//! Tracing setup.
//!
//! Log lines go to stderr so stdout stays clean for command output.
//! Filtering follows the `SIFT_LOG` environment variable (same syntax as
//! `RUST_LOG`), defaulting to `info`, or `debug` with `--verbose`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SIFT_LOG";

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
