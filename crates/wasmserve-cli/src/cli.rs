//! Command-line interface definition.
//!
//! `wasmserve [DIR] [OPTIONS] [-- ARGS...]` compiles the Go package in `DIR`
//! for the browser and serves it with live reload.

use clap::Parser;
use std::path::PathBuf;
use wasmserve_config::ConfigOverrides;

/// wasmserve - serve a Go package as WebAssembly with live reload
#[derive(Parser, Debug)]
#[command(
    name = "wasmserve",
    version,
    about = "Serve a Go package compiled to WebAssembly, with live reload",
    long_about = "wasmserve compiles a Go package with GOOS=js GOARCH=wasm and serves it\n\
                  together with a bootstrap page and the toolchain's wasm_exec.js loader.\n\
                  The module is recompiled on every page load, and pages parked on the\n\
                  wait endpoint reload when the notify endpoint is requested."
)]
pub struct Cli {
    /// Package directory to compile (defaults to the current directory)
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Compiler command (go or tinygo)
    #[arg(long, value_name = "CMD")]
    pub compiler: Option<String>,

    /// Compile once at startup instead of on every request for the module
    #[arg(long)]
    pub no_reload: bool,

    /// URL name of the compiled module
    #[arg(long, value_name = "NAME")]
    pub artifact_name: Option<String>,

    /// Custom bootstrap page template
    #[arg(long, value_name = "FILE")]
    pub index: Option<PathBuf>,

    /// Loader script to serve instead of the toolchain's wasm_exec.js
    #[arg(long, value_name = "FILE")]
    pub runtime_script: Option<PathBuf>,

    /// Directory served for every other path
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Append build output and request diagnostics to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Serve an already compiled module and never run the compiler
    #[arg(long, value_name = "FILE", conflicts_with = "dir")]
    pub prebuilt: Option<PathBuf>,

    /// Reload open pages when files in the package directory change
    #[arg(short, long)]
    pub watch: bool,

    /// Open the page in the default browser
    #[arg(long)]
    pub open: bool,

    /// Config file (TOML or JSON); defaults to ./wasmserve.toml when present
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Arguments handed to the program as os.Args[1:]
    #[arg(last = true, value_name = "ARGS")]
    pub argv: Vec<String>,
}

impl Cli {
    /// Settings given on the command line, to be layered over file and environment.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            wasm_dir: self.dir.clone(),
            prebuilt: self.prebuilt.clone(),
            compiler: self.compiler.clone(),
            auto_rebuild: self.no_reload.then_some(false),
            artifact_name: self.artifact_name.clone(),
            runtime_script: self.runtime_script.clone(),
            index_html: self.index.clone(),
            static_dir: self.static_dir.clone(),
            log_file: self.log_file.clone(),
            watch: self.watch.then_some(true),
            argv: (!self.argv.is_empty()).then(|| self.argv.clone()),
        }
    }
}
