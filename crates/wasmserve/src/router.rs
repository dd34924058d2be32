//! Request routing.
//!
//! Every request is dispatched on the last segment of its path, so the page,
//! loader, artifact and reload endpoints answer under any directory prefix.
//! Anything else goes to the fallback router, or gets a 404.

use crate::build::BuildPipeline;
use crate::error::ServeError;
use crate::response;
use crate::signal::{Release, ReloadSignaler};
use crate::sink::Diagnostics;
use crate::store::ArtifactStore;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use wasmserve_config::{ServeConfig, INDEX_HTML};

/// What a request path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Page,
    RuntimeScript,
    Artifact,
    Wait,
    Notify,
    Other,
}

/// The configured names of the served resources.
#[derive(Debug, Clone)]
pub struct Routes {
    pub artifact: String,
    pub runtime_script: String,
    pub wait: String,
    pub notify: String,
}

impl Routes {
    pub fn from_config(config: &ServeConfig) -> Self {
        Self {
            artifact: config.artifact_name.clone(),
            runtime_script: config.runtime_script_name.clone(),
            wait: config.wait_endpoint.clone(),
            notify: config.notify_endpoint.clone(),
        }
    }

    /// Resolve a base name (see [`basename`]).
    pub fn resolve(&self, base: &str) -> Route {
        match base {
            "." | INDEX_HTML => Route::Page,
            _ if base == self.runtime_script => Route::RuntimeScript,
            _ if base == self.artifact => Route::Artifact,
            _ if base == self.wait => Route::Wait,
            _ if base == self.notify => Route::Notify,
            _ => Route::Other,
        }
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::from_config(&ServeConfig::default())
    }
}

/// Last element of a URL path. Trailing slashes are ignored and the root is `"."`.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some("") | None => ".",
        Some(base) => base,
    }
}

/// State shared by every request.
pub struct ServerState {
    pub(crate) page: Bytes,
    pub(crate) runtime_script: Bytes,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) store: Arc<ArtifactStore>,
    pub(crate) pipeline: Option<Arc<BuildPipeline>>,
    pub(crate) auto_rebuild: bool,
    pub(crate) signaler: Arc<ReloadSignaler>,
    pub(crate) routes: Routes,
    /// Directories a base name is looked up in for the trailing-slash redirect.
    /// The first entry is empty, i.e. the process working directory.
    pub(crate) dir_roots: Vec<PathBuf>,
    pub(crate) fallback: Option<Router>,
    pub(crate) diagnostics: Diagnostics,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn pipeline(&self) -> Option<&Arc<BuildPipeline>> {
        self.pipeline.as_ref()
    }

    pub fn signaler(&self) -> &Arc<ReloadSignaler> {
        &self.signaler
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("routes", &self.routes)
            .field("auto_rebuild", &self.auto_rebuild)
            .field("dir_roots", &self.dir_roots)
            .field("built", &self.store.is_built())
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

/// Build the axum router. All paths, under every method, go through one handler.
pub fn router(state: SharedState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(State(state): State<SharedState>, request: Request) -> Response {
    let uri = request.uri().clone();
    let path = decode_path(uri.path());
    let base = basename(&path);

    if !path.ends_with('/') {
        match is_directory(&state.dir_roots, base).await {
            Ok(true) => {
                tracing::debug!("{} is a directory, redirecting", path);
                return response::redirect_to_dir(&uri);
            }
            Ok(false) => {}
            Err(e) => return ServeError::Stat(e).into_response(),
        }
    }

    let route = state.routes.resolve(base);
    tracing::debug!("{} {} -> {:?}", request.method(), path, route);

    match route {
        Route::Page => response::fresh("text/html; charset=utf-8", state.page.clone()),
        Route::RuntimeScript => response::content(
            request.headers(),
            "application/javascript",
            state.started_at,
            state.runtime_script.clone(),
        ),
        Route::Artifact => match serve_artifact(&state, request.headers()).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        },
        Route::Wait => match state.signaler.wait().await {
            Release::Notified => response::empty_ok(),
            Release::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        },
        Route::Notify => {
            let released = state.signaler.notify();
            tracing::debug!("Notify released a waiter: {}", released);
            response::empty_ok()
        }
        Route::Other => match &state.fallback {
            Some(fallback) => match fallback.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            None => {
                let err = ServeError::NotFound {
                    path: base.to_string(),
                };
                state.diagnostics.log(err.to_string());
                err.into_response()
            }
        },
    }
}

/// Percent-decoded request path. Undecodable input is matched as sent.
fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

async fn is_directory(roots: &[PathBuf], base: &str) -> std::io::Result<bool> {
    for root in roots {
        match tokio::fs::metadata(root.join(base)).await {
            Ok(meta) if meta.is_dir() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

async fn serve_artifact(state: &ServerState, headers: &HeaderMap) -> Result<Response, ServeError> {
    if state.auto_rebuild {
        if let Some(pipeline) = &state.pipeline {
            if let Err(e) = pipeline.build().await {
                tracing::warn!("Serving build failure for {}", state.routes.artifact);
                return Err(e.into());
            }
        }
    }

    let artifact = state
        .store
        .current()
        .filter(|artifact| !artifact.is_empty())
        .ok_or(ServeError::NotBuilt)?;

    Ok(response::content(
        headers,
        "application/wasm",
        artifact.built_at(),
        artifact.bytes().clone(),
    ))
}
