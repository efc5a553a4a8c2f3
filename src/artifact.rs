//! Per-request artifact tracking.
//!
//! Every request gets an [`ArtifactStore`]: a private directory (a
//! [`tempfile::TempDir`]) plus a list of the files and directories created
//! inside it. Stages register what they create and may release items early
//! (the page scratch directory after extraction) or hand them off (the PDF
//! moved into the job registry).
//!
//! Removal is guaranteed on every path:
//!
//! - [`ArtifactStore::cleanup`] deletes everything still tracked and then the
//!   request directory, logging and swallowing failures.
//! - If the store is dropped without `cleanup` (early return, panic, a
//!   cancelled request future), the `TempDir` removes the request directory
//!   recursively.

use crate::error::Doc2TextError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Where a request's PDF came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfOrigin {
    /// The upload already was a PDF.
    Uploaded,
    /// The external converter produced it.
    Converted,
}

/// A PDF belonging to one request.
///
/// Either deleted with the request's [`ArtifactStore`] or handed to the
/// [`crate::jobs::JobRegistry`], which moves it out of the request directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfArtifact {
    pub path: PathBuf,
    pub origin: PdfOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    File,
    Dir,
}

#[derive(Debug)]
struct Artifact {
    path: PathBuf,
    kind: ArtifactKind,
}

/// Tracks temporary files created while serving one request.
#[derive(Debug)]
pub struct ArtifactStore {
    root: Option<TempDir>,
    root_path: PathBuf,
    tracked: Vec<Artifact>,
}

impl ArtifactStore {
    /// Create a fresh request directory under `base`.
    pub fn create(base: &Path) -> Result<Self, Doc2TextError> {
        std::fs::create_dir_all(base)
            .map_err(|e| Doc2TextError::io(format!("creating {}", base.display()), e))?;
        let root = tempfile::Builder::new()
            .prefix("req-")
            .tempdir_in(base)
            .map_err(|e| Doc2TextError::io("creating request directory", e))?;
        let root_path = root.path().to_path_buf();
        debug!("Request directory: {}", root_path.display());
        Ok(Self {
            root: Some(root),
            root_path,
            tracked: Vec::new(),
        })
    }

    /// The request directory.
    pub fn path(&self) -> &Path {
        &self.root_path
    }

    /// Write `bytes` to `name` inside the request directory and track the file.
    pub async fn write_file(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, Doc2TextError> {
        let path = self.root_path.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Doc2TextError::io(format!("writing {}", path.display()), e))?;
        self.track_file(path.clone());
        Ok(path)
    }

    /// Create a sub-directory inside the request directory and track it.
    pub async fn create_dir(&mut self, name: &str) -> Result<PathBuf, Doc2TextError> {
        let path = self.root_path.join(name);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| Doc2TextError::io(format!("creating {}", path.display()), e))?;
        self.tracked.push(Artifact {
            path: path.clone(),
            kind: ArtifactKind::Dir,
        });
        Ok(path)
    }

    /// Track a file some collaborator created on our behalf.
    pub fn track_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.is_tracked(&path) {
            self.tracked.push(Artifact {
                path,
                kind: ArtifactKind::File,
            });
        }
    }

    /// Stop tracking `path` because its ownership moved elsewhere.
    ///
    /// Returns `false` when the path was not tracked.
    pub fn release(&mut self, path: &Path) -> bool {
        let before = self.tracked.len();
        self.tracked.retain(|a| a.path != path);
        before != self.tracked.len()
    }

    /// Delete a tracked artifact now.
    pub async fn remove(&mut self, path: &Path) {
        if let Some(pos) = self.tracked.iter().position(|a| a.path == path) {
            let artifact = self.tracked.remove(pos);
            remove_artifact(&artifact).await;
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.iter().any(|a| a.path == path)
    }

    /// Paths currently tracked, oldest first.
    pub fn tracked(&self) -> impl Iterator<Item = &Path> {
        self.tracked.iter().map(|a| a.path.as_path())
    }

    /// Delete every tracked artifact, then the request directory.
    ///
    /// Never fails: problems are logged so they cannot replace the result the
    /// request is about to report.
    pub async fn cleanup(mut self) {
        while let Some(artifact) = self.tracked.pop() {
            remove_artifact(&artifact).await;
        }
        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            match tokio::task::spawn_blocking(move || root.close()).await {
                Ok(Ok(())) => debug!("Removed request directory {}", path.display()),
                Ok(Err(e)) => warn!("Failed to remove {}: {}", path.display(), e),
                Err(e) => warn!("Cleanup task for {} panicked: {}", path.display(), e),
            }
        }
    }
}

async fn remove_artifact(artifact: &Artifact) {
    let result = match artifact.kind {
        ArtifactKind::File => tokio::fs::remove_file(&artifact.path).await,
        ArtifactKind::Dir => tokio::fs::remove_dir_all(&artifact.path).await,
    };
    match result {
        Ok(()) => debug!("Removed {}", artifact.path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", artifact.path.display(), e),
    }
}
