//! Serve command implementation.
//!
//! Orchestrates the server lifecycle:
//! - Load and validate configuration
//! - Construct the server (runtime script lookup and initial build)
//! - Optional source watcher that reloads open pages
//! - HTTP server until Ctrl+C

use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::ui;
use crate::watcher::{FileChange, FileWatcher};
use axum::Router;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use wasmserve::{ReloadSignaler, SharedSink, WasmServer, WriterSink};
use wasmserve_config::ServeConfig;

/// Execute the serve command.
///
/// # Errors
///
/// Returns errors for invalid configuration, a missing toolchain or loader
/// script, an unusable log file, watcher failures, and bind failures. A
/// failing initial build is reported but does not stop the server.
pub async fn execute(args: Cli) -> Result<()> {
    let config = ServeConfig::load(&args.overrides(), args.config.as_deref())?;

    if args.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    config.validate()?;

    let sink = open_sink(&config)?;
    let mut builder = WasmServer::builder(config.clone()).sink(sink);
    if let Some(dir) = &config.static_dir {
        ui::info(&format!("Serving other paths from {}", dir.display()));
        builder = builder.fallback(Router::new().fallback_service(ServeDir::new(dir)));
    }

    let spinner = if config.builds_enabled() {
        ui::Spinner::new(&format!(
            "Compiling {} with {}...",
            config.wasm_dir.display(),
            config.compiler
        ))
    } else {
        ui::Spinner::new("Loading prebuilt module...")
    };
    let server = match builder.build().await {
        Ok(server) => server,
        Err(e) => {
            spinner.fail("Failed to start");
            return Err(e.into());
        }
    };
    report_initial_build(&server, &spinner);

    let _watcher = if config.watch {
        start_watcher(&config, server.signaler())?
    } else {
        None
    };

    let url = config.server_url();
    ui::success(&format!("Serving at {}", url));
    if !config.auto_rebuild {
        ui::info("Reload on request disabled; the module is only compiled at startup");
    }
    if args.open {
        open_browser(&url);
    }
    ui::info("Press Ctrl+C to stop");

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    ui::success("Server stopped");
    Ok(())
}

/// Diagnostics go to the log file when configured, otherwise to stdout.
fn open_sink(config: &ServeConfig) -> Result<SharedSink> {
    match &config.log_file {
        Some(path) => {
            let sink = WriterSink::append_to(path).map_err(|source| CliError::LogFile {
                path: path.clone(),
                source,
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(WriterSink::stdout())),
    }
}

fn report_initial_build(server: &WasmServer, spinner: &ui::Spinner) {
    let artifact_name = &server.config().artifact_name;
    match server.store().current() {
        Some(artifact) => {
            let timing = server
                .state()
                .pipeline()
                .and_then(|pipeline| match pipeline.status() {
                    wasmserve::BuildStatus::Success { duration_ms } => Some(format!(
                        " in {}",
                        ui::format_duration(std::time::Duration::from_millis(duration_ms))
                    )),
                    _ => None,
                })
                .unwrap_or_default();
            spinner.finish(&format!(
                "{} ready ({}){}",
                artifact_name,
                ui::format_size(artifact.len() as u64),
                timing
            ));
        }
        None => {
            spinner.fail("Initial build failed; the page will show the compiler output");
        }
    }
}

/// Watch the package directory and release parked pages on every change.
fn start_watcher(
    config: &ServeConfig,
    signaler: Arc<ReloadSignaler>,
) -> Result<Option<FileWatcher>> {
    if !config.builds_enabled() {
        ui::warning("Ignoring --watch: a prebuilt module is never recompiled");
        return Ok(None);
    }

    let (watcher, changes) = FileWatcher::new(
        &config.wasm_dir,
        config.watch_ignore.clone(),
        config.debounce_ms,
    )?;
    ui::info(&format!("Watching {}", watcher.root().display()));
    tokio::spawn(forward_changes(changes, signaler));
    Ok(Some(watcher))
}

async fn forward_changes(mut changes: mpsc::Receiver<FileChange>, signaler: Arc<ReloadSignaler>) {
    while let Some(change) = changes.recv().await {
        let released = signaler.notify_all();
        tracing::debug!("{:?}", change);
        if released > 0 {
            ui::info(&format!(
                "{} changed, reloading {} page(s)",
                change.path().display(),
                released
            ));
        }
    }
}

/// Open the server URL in the default browser.
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}
