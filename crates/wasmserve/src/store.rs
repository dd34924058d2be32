//! Holder of the last successfully built artifact.
//!
//! The bytes and their build timestamp live in one [`Artifact`] value behind a
//! single lock, so readers always see a pair that came from the same build.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// A compiled artifact together with the moment it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Bytes,
    built_at: DateTime<Utc>,
}

impl Artifact {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Thread-safe store for the current artifact.
///
/// `replace` is the only mutator. Timestamps never go backwards: a build that
/// reports an earlier time than the stored one (wall clock stepped back) keeps
/// the stored timestamp.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    current: RwLock<Option<Arc<Artifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest artifact, or `None` if nothing was ever built.
    pub fn current(&self) -> Option<Arc<Artifact>> {
        self.current.read().clone()
    }

    pub fn is_built(&self) -> bool {
        self.current.read().is_some()
    }

    /// Swap in a new artifact and return it.
    pub fn replace(&self, bytes: impl Into<Bytes>, built_at: DateTime<Utc>) -> Arc<Artifact> {
        let mut slot = self.current.write();
        let built_at = match slot.as_deref() {
            Some(previous) if previous.built_at > built_at => previous.built_at,
            _ => built_at,
        };
        let artifact = Arc::new(Artifact {
            bytes: bytes.into(),
            built_at,
        });
        *slot = Some(Arc::clone(&artifact));
        artifact
    }

    /// Load an already compiled artifact, stamped with the file's modification time.
    pub async fn load_prebuilt(&self, path: &Path) -> std::io::Result<Arc<Artifact>> {
        let bytes = tokio::fs::read(path).await?;
        let modified = tokio::fs::metadata(path)
            .await?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(self.replace(bytes, modified))
    }
}
