//! Server construction and lifecycle.

use crate::build::{BuildPipeline, BuildSettings};
use crate::error::{Result, StartupError};
use crate::page::{render_page, PageContext, DEFAULT_TEMPLATE};
use crate::router::{self, Routes, ServerState, SharedState};
use crate::signal::ReloadSignaler;
use crate::sink::{Diagnostics, SharedSink};
use crate::store::ArtifactStore;
use crate::toolchain::{locate_runtime_script, ProcessToolchain, Toolchain};
use axum::Router;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wasmserve_config::ServeConfig;

/// A configured development server.
///
/// Owns the scratch directory the compiler writes into; it is removed when
/// the server is dropped.
pub struct WasmServer {
    config: ServeConfig,
    state: SharedState,
    work_dir: TempDir,
}

impl WasmServer {
    pub fn builder(config: ServeConfig) -> WasmServerBuilder {
        WasmServerBuilder {
            config,
            toolchain: None,
            sink: None,
            fallback: None,
        }
    }

    /// Construct with the system toolchain.
    pub async fn new(config: ServeConfig, sink: Option<SharedSink>) -> Result<Self> {
        let mut builder = Self::builder(config);
        builder.sink = sink;
        builder.build().await
    }

    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.state.store
    }

    /// Handle for releasing parked browsers from elsewhere in the process.
    pub fn signaler(&self) -> Arc<ReloadSignaler> {
        Arc::clone(&self.state.signaler)
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn router(&self) -> Router {
        router::router(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until `shutdown` completes.
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    ///
    /// Parked wait requests are released when shutdown begins so that they
    /// do not hold the graceful shutdown open.
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on {}", addr);
        }

        let signaler = self.signaler();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                let released = signaler.shutdown();
                tracing::info!("Shutting down ({} waiting clients released)", released);
            })
            .await
            .map_err(StartupError::Serve)
    }
}

impl std::fmt::Debug for WasmServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmServer")
            .field("state", &self.state)
            .field("work_dir", &self.work_dir.path())
            .finish()
    }
}

/// Builder for [`WasmServer`].
pub struct WasmServerBuilder {
    config: ServeConfig,
    toolchain: Option<Arc<dyn Toolchain>>,
    sink: Option<SharedSink>,
    fallback: Option<Router>,
}

impl WasmServerBuilder {
    /// Toolchain used to locate the loader script and to compile.
    pub fn toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Diagnostics sink for build output and unmatched requests.
    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Router for every path that is not one of the served resources.
    pub fn fallback(mut self, fallback: Router) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Resolve resources, create the scratch directory and run the first build.
    ///
    /// # Errors
    ///
    /// Any missing resource is fatal. A failing first build is not: it is
    /// reported to the sink and the artifact route keeps reporting it.
    pub async fn build(self) -> Result<WasmServer> {
        let config = self.config;
        config.validate()?;

        let toolchain = self
            .toolchain
            .unwrap_or_else(|| Arc::new(ProcessToolchain) as Arc<dyn Toolchain>);
        let diagnostics = Diagnostics::new(self.sink);

        let script_path = match &config.runtime_script {
            Some(path) => path.clone(),
            None => locate_runtime_script(toolchain.as_ref(), &config.compiler).await?,
        };
        let runtime_script =
            tokio::fs::read(&script_path)
                .await
                .map_err(|source| StartupError::RuntimeScript {
                    path: script_path.clone(),
                    source,
                })?;

        let template = match &config.index_html {
            Some(path) => tokio::fs::read_to_string(path).await.map_err(|source| {
                StartupError::IndexHtml {
                    path: path.clone(),
                    source,
                }
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        let page = render_page(
            &template,
            &PageContext {
                runtime_script: &config.runtime_script_name,
                artifact: &config.artifact_name,
                wait_endpoint: &config.wait_endpoint,
                notify_endpoint: &config.notify_endpoint,
                argv: &config.argv,
            },
        )?;

        let work_dir = tempfile::Builder::new()
            .prefix("wasmserve-")
            .tempdir()
            .map_err(StartupError::WorkDir)?;
        tracing::debug!("Build output goes to {}", work_dir.path().display());

        let store = Arc::new(ArtifactStore::new());
        if let Some(path) = &config.prebuilt {
            let artifact = store
                .load_prebuilt(path)
                .await
                .map_err(|source| StartupError::Prebuilt {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!("Serving {} ({} bytes)", path.display(), artifact.len());
        }

        let pipeline = if config.builds_enabled() {
            let pipeline = Arc::new(BuildPipeline::new(
                BuildSettings::from_config(&config, work_dir.path()),
                toolchain,
                Arc::clone(&store),
                diagnostics.clone(),
            ));
            if let Err(e) = pipeline.build().await {
                tracing::warn!("Initial build failed: {}", e);
            }
            Some(pipeline)
        } else {
            None
        };

        let state = Arc::new(ServerState {
            page: page.into(),
            runtime_script: runtime_script.into(),
            started_at: Utc::now(),
            store,
            pipeline,
            auto_rebuild: config.auto_rebuild,
            signaler: Arc::new(ReloadSignaler::new()),
            routes: Routes::from_config(&config),
            dir_roots: std::iter::once(PathBuf::new())
                .chain(config.static_dir.clone())
                .collect(),
            fallback: self.fallback,
            diagnostics,
        });

        Ok(WasmServer {
            config,
            state,
            work_dir,
        })
    }
}
