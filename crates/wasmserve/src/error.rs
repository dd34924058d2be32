//! Error types for the build-and-serve engine.
//!
//! - [`StartupError`]: resource failures while constructing the server. Fatal.
//! - [`BuildError`]: the compiler failed. Recovered per request and reported as HTTP 500.
//! - [`ServeError`]: per-request failures, converted straight into plain-text responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use wasmserve_config::ConfigError;

/// Body of the artifact route when nothing has been built yet.
pub const NO_ARTIFACT_MESSAGE: &str = "no wasm content";

/// Failures that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create scratch directory: {0}")]
    WorkDir(#[source] std::io::Error),

    /// The compiler could not be queried for its installation root
    #[error("Failed to locate the {compiler} toolchain: {detail}\n\nHint: Check that {compiler} is installed and on PATH, or set runtimeScript")]
    Toolchain { compiler: String, detail: String },

    #[error("Failed to read runtime script {}: {source}", .path.display())]
    RuntimeScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read index template {}: {source}", .path.display())]
    IndexHtml {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid index template: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Failed to load prebuilt artifact {}: {source}", .path.display())]
    Prebuilt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// The compiler did not produce an artifact.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Non-zero exit. Displays as the exit status followed by the compiler output.
    #[error("{status}\n{diagnostic}")]
    Failed { status: String, diagnostic: String },

    #[error("Failed to run {compiler}: {source}")]
    Spawn {
        compiler: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove stale build output {}: {source}", .path.display())]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read build output {}: {source}", .path.display())]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Compiler output attached to a failed build, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            BuildError::Failed { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

/// Request-level failures.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{}", NO_ARTIFACT_MESSAGE)]
    NotBuilt,

    #[error("\"{path}\" path not found")]
    NotFound { path: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("{0}")]
    Stat(#[source] std::io::Error),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let mut body = self.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        (
            self.status(),
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            body,
        )
            .into_response()
    }
}

pub type Result<T, E = StartupError> = std::result::Result<T, E>;
