//! Logging setup using `tracing`.
//!
//! Verbosity is resolved in this order: `--verbose` (debug for the wasmserve
//! crates), `--quiet` (errors only), `RUST_LOG`, then info.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "wasmserve=debug,wasmserve_config=debug,wasmserve_cli=debug";
const QUIET_FILTER: &str = "wasmserve=error,wasmserve_config=error,wasmserve_cli=error";
const DEFAULT_FILTER: &str = "wasmserve=info,wasmserve_config=info,wasmserve_cli=info";

/// Initialize the global tracing subscriber. Call once, early in `main`.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // A second initialization (tests, embedding) is not an error worth reporting.
    let _ = tracing_subscriber::registry()
        .with(filter(verbose, quiet))
        .with(fmt_layer)
        .try_init();
}

fn filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
