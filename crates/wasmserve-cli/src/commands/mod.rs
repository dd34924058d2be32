//! Command implementations.
//!
//! - [`serve`] - compile, serve and live-reload a Go package

pub mod serve;

pub use serve::execute as serve_execute;
