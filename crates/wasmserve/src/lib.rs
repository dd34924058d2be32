//! Build-and-serve engine for WebAssembly development servers.
//!
//! A [`WasmServer`] compiles a Go package for the `js/wasm` target, serves the
//! bootstrap page, the loader script and the compiled module, and implements
//! a long-poll reload protocol: browsers park a request on the wait endpoint
//! and reload once a notify releases it.
//!
//! - [`build`] - serialized compiler runs feeding the [`store`]
//! - [`signal`] - the wait/notify rendezvous
//! - [`router`] - request dispatch by path base name
//! - [`toolchain`] - the compiler as an injectable capability
//! - [`sink`] - diagnostics output for build logs and unmatched requests
//!
//! # Example
//!
//! ```no_run
//! use wasmserve::WasmServer;
//! use wasmserve_config::ServeConfig;
//!
//! # async fn run() -> wasmserve::Result<()> {
//! let server = WasmServer::new(ServeConfig::default(), None).await?;
//! server.serve(std::future::pending()).await
//! # }
//! ```

pub mod build;
pub mod error;
pub mod page;
pub mod response;
pub mod router;
pub mod server;
pub mod signal;
pub mod sink;
pub mod store;
pub mod toolchain;

pub use build::{BuildPipeline, BuildSettings, BuildStatus};
pub use error::{BuildError, Result, ServeError, StartupError, NO_ARTIFACT_MESSAGE};
pub use router::{Route, Routes, ServerState, SharedState};
pub use server::{WasmServer, WasmServerBuilder};
pub use signal::{Release, ReloadSignaler, Waiter};
pub use sink::{Diagnostics, LogSink, MemorySink, SharedSink, WriterSink};
pub use store::{Artifact, ArtifactStore};
pub use toolchain::{locate_runtime_script, Invocation, ProcessToolchain, ToolOutput, Toolchain};
