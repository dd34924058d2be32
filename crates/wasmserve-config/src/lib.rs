//! Configuration for the wasmserve development server.
//!
//! Settings are merged from several sources, lowest priority first:
//! built-in defaults, `wasmserve.toml` (or an explicit TOML/JSON file),
//! `WASMSERVE_*` environment variables, then command-line overrides.

mod error;
mod loading;
mod settings;
mod validation;

pub use error::{ConfigError, Result};
pub use loading::{ConfigOverrides, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use settings::{ServeConfig, INDEX_HTML};
