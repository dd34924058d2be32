//! Error handling for the wasmserve CLI.
//!
//! Library errors convert into [`CliError`] via `#[from]`; `main` turns the
//! result into a `miette` report.

use std::path::PathBuf;
use thiserror::Error;
use wasmserve::StartupError;
use wasmserve_config::ConfigError;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The server could not be constructed or stopped serving
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("Failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory to watch does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Convert a CLI error into a miette report.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::Startup(StartupError::Config(e)) | CliError::Config(e) => {
            miette::miette!("Configuration error: {}", e)
        }
        CliError::Startup(e @ StartupError::Toolchain { .. }) => {
            miette::miette!("{}", e)
        }
        CliError::Startup(StartupError::Bind { addr, source }) => miette::miette!(
            "Failed to bind to {}: {}\n\nHint: Is another server running? Pick a port with --port",
            addr,
            source
        ),
        other => miette::miette!("{}", other),
    }
}
