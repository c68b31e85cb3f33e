//! Structured logging setup using `tracing-subscriber`.
//!
//! Console-only: the pipes run as one-shot invocations inside a host
//! process, so the library never installs a subscriber itself —
//! [`init_cli`] is for the bundled CLI runner.

use tracing_subscriber::EnvFilter;

/// Initialise console logging for the CLI runner.
///
/// Emits human-readable output to stderr, controlled by the `RUST_LOG`
/// environment variable (default: `info`).
pub fn init_cli() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
