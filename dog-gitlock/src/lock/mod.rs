//! Access to the external lock artifact and its orphan recovery.
//!
//! The artifact (git's `index.lock`) is created and removed by git itself;
//! this crate only reads its modification time and deletes it once stale.

pub mod detector;
pub mod sweeper;

pub use detector::{OrphanLockDetector, SweepOutcome};
pub use sweeper::OrphanLockSweeper;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;

/// Filesystem seam for the lock artifact
#[async_trait]
pub trait LockArtifact: Send + Sync {
    /// Location of the artifact, for logging
    fn path(&self) -> &Path;

    /// Modification time, or `None` if the artifact does not exist
    async fn modified(&self) -> io::Result<Option<SystemTime>>;

    /// Delete the artifact. Returns false if it was already gone.
    async fn remove(&self) -> io::Result<bool>;
}

/// Lock artifact on the local filesystem
#[derive(Debug, Clone)]
pub struct FsLockArtifact {
    path: PathBuf,
}

impl FsLockArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LockArtifact for FsLockArtifact {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn modified(&self) -> io::Result<Option<SystemTime>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.modified().map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self) -> io::Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_artifact_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = FsLockArtifact::new(dir.path().join("index.lock"));

        assert!(artifact.modified().await.unwrap().is_none());
        assert!(!artifact.remove().await.unwrap());
    }

    #[tokio::test]
    async fn existing_artifact_is_stat_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.lock");
        std::fs::write(&path, b"").unwrap();
        let artifact = FsLockArtifact::new(&path);

        assert!(artifact.modified().await.unwrap().is_some());
        assert!(artifact.remove().await.unwrap());
        assert!(!path.exists());
    }
}
