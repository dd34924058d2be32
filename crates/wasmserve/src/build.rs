//! Compiles the artifact by running the configured toolchain.
//!
//! At most one compiler process runs per pipeline. A build requested while
//! another is running waits for it to finish and then runs its own, so every
//! request that asked for a rebuild is served bytes compiled after it arrived.

use crate::error::BuildError;
use crate::sink::Diagnostics;
use crate::store::{Artifact, ArtifactStore};
use crate::toolchain::{Invocation, Toolchain};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use wasmserve_config::ServeConfig;

/// Build status tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// No build has been performed yet
    NotStarted,
    /// Build is currently in progress
    InProgress { started_at: Instant },
    /// Build completed successfully
    Success { duration_ms: u64 },
    /// Build failed with error
    Failed { error: String },
    /// The build was abandoned before the compiler finished
    Cancelled,
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BuildStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// What to compile and where the output goes.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub compiler: String,
    /// Package directory, used as the compiler's working directory
    pub package_dir: PathBuf,
    /// Output path, reused by every build
    pub output: PathBuf,
    pub extra_args: Vec<String>,
    pub target_env: Vec<(String, String)>,
}

impl BuildSettings {
    /// Derive settings from the server configuration, writing into `work_dir`.
    pub fn from_config(config: &ServeConfig, work_dir: &Path) -> Self {
        Self {
            compiler: config.compiler.clone(),
            package_dir: config.wasm_dir.clone(),
            output: work_dir.join(&config.artifact_name),
            extra_args: config.build_args.clone(),
            target_env: config
                .target_env()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// Serialized compile-and-store pipeline.
pub struct BuildPipeline {
    settings: BuildSettings,
    toolchain: Arc<dyn Toolchain>,
    store: Arc<ArtifactStore>,
    diagnostics: Diagnostics,
    gate: Mutex<()>,
    status: RwLock<BuildStatus>,
}

impl BuildPipeline {
    pub fn new(
        settings: BuildSettings,
        toolchain: Arc<dyn Toolchain>,
        store: Arc<ArtifactStore>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            settings,
            toolchain,
            store,
            diagnostics,
            gate: Mutex::new(()),
            status: RwLock::new(BuildStatus::NotStarted),
        }
    }

    /// The command this pipeline runs.
    pub fn invocation(&self) -> Invocation {
        Invocation::new(&self.settings.compiler)
            .arg("build")
            .arg("-o")
            .arg(&self.settings.output)
            .args(&self.settings.extra_args)
            .cwd(&self.settings.package_dir)
            .envs(self.settings.target_env.iter().map(|(k, v)| (k, v)))
    }

    pub fn output_path(&self) -> &Path {
        &self.settings.output
    }

    pub fn status(&self) -> BuildStatus {
        self.status.read().clone()
    }

    /// Compile and, on success, replace the stored artifact.
    ///
    /// On failure the store is left untouched and the compiler output is
    /// returned in the error (and written to the diagnostics sink).
    pub async fn build(&self) -> Result<Arc<Artifact>, BuildError> {
        let _admitted = self.gate.lock().await;

        let invocation = self.invocation();
        self.diagnostics.log(invocation.to_string());

        let started_at = Instant::now();
        *self.status.write() = BuildStatus::InProgress { started_at };
        let in_progress = InProgressGuard {
            status: &self.status,
        };

        let result = self.compile(&invocation).await;
        in_progress.disarm();
        let duration_ms = started_at.elapsed().as_millis() as u64;

        match &result {
            Ok(artifact) => {
                tracing::info!(
                    "Built {} ({} bytes) in {}ms",
                    self.settings.output.display(),
                    artifact.len(),
                    duration_ms
                );
                *self.status.write() = BuildStatus::Success { duration_ms };
            }
            Err(e) => {
                tracing::warn!("Build failed after {}ms", duration_ms);
                self.diagnostics.log(e.to_string());
                *self.status.write() = BuildStatus::Failed {
                    error: e.to_string(),
                };
            }
        }

        result
    }

    async fn compile(&self, invocation: &Invocation) -> Result<Arc<Artifact>, BuildError> {
        // A stale file from the previous build must never be picked up.
        match tokio::fs::remove_file(&self.settings.output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BuildError::RemoveStale {
                    path: self.settings.output.clone(),
                    source: e,
                });
            }
        }

        let output = self
            .toolchain
            .run(invocation)
            .await
            .map_err(|source| BuildError::Spawn {
                compiler: self.settings.compiler.clone(),
                source,
            })?;

        if !output.success {
            return Err(BuildError::Failed {
                status: output.status_text(),
                diagnostic: output.output_lossy(),
            });
        }

        // Warnings from a successful build.
        self.diagnostics.log(&output.output);

        let bytes = tokio::fs::read(&self.settings.output)
            .await
            .map_err(|source| BuildError::ReadArtifact {
                path: self.settings.output.clone(),
                source,
            })?;

        Ok(self.store.replace(bytes, Utc::now()))
    }
}

/// Marks the status cancelled if the build future is dropped mid-run.
struct InProgressGuard<'a> {
    status: &'a RwLock<BuildStatus>,
}

impl InProgressGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        *self.status.write() = BuildStatus::Cancelled;
    }
}

impl std::fmt::Debug for BuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPipeline")
            .field("settings", &self.settings)
            .field("status", &self.status())
            .finish()
    }
}
