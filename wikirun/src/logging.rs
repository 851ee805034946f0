//! Diagnostic tracing for the binaries.
//!
//! Game traces, run artifacts and reports are product output and are always
//! written; this module only controls stderr diagnostics.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` when `verbose`, `warn` otherwise.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=wikirun=debug,proctor=debug proctor run --article-list pool.json
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
