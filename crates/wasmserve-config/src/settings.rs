//! Server settings and their defaults.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Name under which the bootstrap page is always reachable.
pub const INDEX_HTML: &str = "index.html";

/// Development server configuration.
///
/// Loaded from `wasmserve.toml`, `WASMSERVE_*` environment variables and
/// command-line overrides (see [`ServeConfig::load`](crate::ServeConfig::load)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServeConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Package directory the compiler runs in
    #[serde(default = "default_wasm_dir")]
    pub wasm_dir: PathBuf,

    /// Already compiled artifact. When set, the server never invokes the compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prebuilt: Option<PathBuf>,

    /// Compiler command (`go` or `tinygo`)
    #[serde(default = "default_compiler")]
    pub compiler: String,

    /// Extra arguments appended after `build -o <out>`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_args: Vec<String>,

    /// Target operating system override (`GOOS`)
    #[serde(default = "default_target_os")]
    pub target_os: String,

    /// Target architecture override (`GOARCH`)
    #[serde(default = "default_target_arch")]
    pub target_arch: String,

    /// Recompile on every artifact request
    #[serde(default = "default_auto_rebuild")]
    pub auto_rebuild: bool,

    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,

    #[serde(default = "default_runtime_script_name")]
    pub runtime_script_name: String,

    /// Loader script to serve instead of the toolchain's own copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_script: Option<PathBuf>,

    /// Custom bootstrap page template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_html: Option<PathBuf>,

    /// Arguments handed to the module by the built-in page
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argv: Vec<String>,

    #[serde(default = "default_wait_endpoint")]
    pub wait_endpoint: String,

    #[serde(default = "default_notify_endpoint")]
    pub notify_endpoint: String,

    /// Directory served for paths that match no built-in route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,

    /// Diagnostics file (appended to). Standard output when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Notify waiting browsers when sources under `wasm_dir` change
    #[serde(default)]
    pub watch: bool,

    #[serde(default = "default_watch_ignore")]
    pub watch_ignore: Vec<String>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            wasm_dir: default_wasm_dir(),
            prebuilt: None,
            compiler: default_compiler(),
            build_args: Vec::new(),
            target_os: default_target_os(),
            target_arch: default_target_arch(),
            auto_rebuild: default_auto_rebuild(),
            artifact_name: default_artifact_name(),
            runtime_script_name: default_runtime_script_name(),
            runtime_script: None,
            index_html: None,
            argv: Vec::new(),
            wait_endpoint: default_wait_endpoint(),
            notify_endpoint: default_notify_endpoint(),
            static_dir: None,
            log_file: None,
            watch: false,
            watch_ignore: default_watch_ignore(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl ServeConfig {
    /// Whether the server compiles the artifact itself.
    pub fn builds_enabled(&self) -> bool {
        self.prebuilt.is_none()
    }

    /// Environment overrides selecting the sandboxed target.
    pub fn target_env(&self) -> [(&'static str, String); 2] {
        [
            ("GOOS", self.target_os.clone()),
            ("GOARCH", self.target_arch.clone()),
        ]
    }

    /// Socket address to bind.
    pub fn addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            ConfigError::invalid(
                "host",
                &self.host,
                "Use an IP address such as 127.0.0.1 or 0.0.0.0",
            )
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// URL a browser should open.
    pub fn server_url(&self) -> String {
        let host = if self.host == "0.0.0.0" {
            "localhost"
        } else {
            self.host.as_str()
        };
        format!("http://{}:{}/", host, self.port)
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

fn default_wasm_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_compiler() -> String {
    "go".into()
}

fn default_target_os() -> String {
    "js".into()
}

fn default_target_arch() -> String {
    "wasm".into()
}

fn default_auto_rebuild() -> bool {
    true
}

fn default_artifact_name() -> String {
    "main.wasm".into()
}

fn default_runtime_script_name() -> String {
    "wasm_exec.js".into()
}

fn default_wait_endpoint() -> String {
    "_wait".into()
}

fn default_notify_endpoint() -> String {
    "_notify".into()
}

fn default_watch_ignore() -> Vec<String> {
    vec![".git".into(), "*.wasm".into(), "*~".into()]
}

fn default_debounce_ms() -> u64 {
    100
}
