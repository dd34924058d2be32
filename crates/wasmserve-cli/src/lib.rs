//! wasmserve CLI - compile a Go package to WebAssembly and serve it with live reload.
//!
//! - [`cli`] - argument parsing
//! - [`commands`] - the serve command
//! - [`error`] - error types and miette reporting
//! - [`logger`] - tracing setup
//! - [`ui`] - terminal status output
//! - [`watcher`] - source watcher that reloads open pages

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;
pub mod watcher;
