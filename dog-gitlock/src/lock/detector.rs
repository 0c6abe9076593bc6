use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::LockArtifact;
use crate::{LockEvent, MetricsRecorder};

/// Result of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No lock artifact present (the normal state)
    Absent,
    /// Artifact present but younger than the threshold; left alone
    Fresh { age: Duration },
    /// Stale artifact deleted
    Removed { age: Duration },
    /// Filesystem error other than "not found"; logged and absorbed
    Failed(String),
}

/// Detects and removes lock artifacts left behind by crashed git processes.
///
/// Deleting is only safe once the artifact is older than `threshold`: a live
/// git command may legitimately hold it for a short while.
pub struct OrphanLockDetector {
    artifact: Arc<dyn LockArtifact>,
    threshold: Duration,
    metrics: Arc<MetricsRecorder>,
    events: broadcast::Sender<LockEvent>,
}

impl OrphanLockDetector {
    pub fn new(
        artifact: Arc<dyn LockArtifact>,
        threshold: Duration,
        metrics: Arc<MetricsRecorder>,
        events: broadcast::Sender<LockEvent>,
    ) -> Self {
        Self {
            artifact,
            threshold,
            metrics,
            events,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Check the artifact once and delete it if stale. Never fails.
    pub async fn sweep(&self) -> SweepOutcome {
        let modified = match self.artifact.modified().await {
            Ok(Some(modified)) => modified,
            Ok(None) => return SweepOutcome::Absent,
            Err(e) => {
                debug!(path = %self.artifact.path().display(), error = %e, "Error checking lock file");
                return SweepOutcome::Failed(e.to_string());
            }
        };

        // mtime in the future (clock skew) counts as brand new
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age <= self.threshold {
            return SweepOutcome::Fresh { age };
        }

        warn!(
            path = %self.artifact.path().display(),
            lock_age_secs = age.as_secs(),
            threshold_secs = self.threshold.as_secs(),
            "Orphan lock detected, removing"
        );

        match self.artifact.remove().await {
            Ok(true) => {
                self.metrics.record_orphan_removed();
                let _ = self.events.send(LockEvent::OrphanLockRemoved {
                    lock_age: age,
                    at: Utc::now(),
                });
                info!(path = %self.artifact.path().display(), "Orphan lock removed");
                SweepOutcome::Removed { age }
            }
            // someone else (git or a concurrent sweep) got there first
            Ok(false) => SweepOutcome::Absent,
            Err(e) => {
                warn!(path = %self.artifact.path().display(), error = %e, "Failed to remove orphan lock");
                SweepOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::FsLockArtifact;
    use async_trait::async_trait;
    use std::io;
    use std::path::{Path, PathBuf};
    use tracing_test::traced_test;

    fn detector_for(path: &Path, threshold: Duration) -> (OrphanLockDetector, Arc<MetricsRecorder>) {
        let metrics = Arc::new(MetricsRecorder::new());
        let (events, _) = broadcast::channel(16);
        let detector = OrphanLockDetector::new(
            Arc::new(FsLockArtifact::new(path)),
            threshold,
            metrics.clone(),
            events,
        );
        (detector, metrics)
    }

    fn write_lock(path: &Path, age: Duration) {
        std::fs::write(path, b"").unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn stale_lock_is_removed_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.lock");
        write_lock(&path, Duration::from_secs(600));
        let (detector, metrics) = detector_for(&path, Duration::from_secs(300));

        let first = detector.sweep().await;
        assert!(matches!(first, SweepOutcome::Removed { age } if age >= Duration::from_secs(600)));
        assert!(!path.exists());

        assert_eq!(detector.sweep().await, SweepOutcome::Absent);
        assert_eq!(metrics.counters().orphan_locks_removed, 1);
        assert!(logs_contain("Orphan lock removed"));
    }

    #[tokio::test]
    async fn fresh_lock_is_never_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.lock");
        write_lock(&path, Duration::from_secs(10));
        let (detector, metrics) = detector_for(&path, Duration::from_secs(300));

        for _ in 0..5 {
            assert!(matches!(detector.sweep().await, SweepOutcome::Fresh { .. }));
        }
        assert!(path.exists());
        assert_eq!(metrics.counters().orphan_locks_removed, 0);
    }

    #[tokio::test]
    async fn removal_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.lock");
        write_lock(&path, Duration::from_secs(120));

        let metrics = Arc::new(MetricsRecorder::new());
        let (events, mut rx) = broadcast::channel(16);
        let detector = OrphanLockDetector::new(
            Arc::new(FsLockArtifact::new(&path)),
            Duration::from_secs(60),
            metrics,
            events,
        );

        detector.sweep().await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "orphan_lock_removed");
    }

    struct BrokenArtifact(PathBuf);

    #[async_trait]
    impl LockArtifact for BrokenArtifact {
        fn path(&self) -> &Path {
            &self.0
        }

        async fn modified(&self) -> io::Result<Option<SystemTime>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"))
        }

        async fn remove(&self) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"))
        }
    }

    #[tokio::test]
    async fn filesystem_errors_are_absorbed() {
        let (events, _) = broadcast::channel(16);
        let detector = OrphanLockDetector::new(
            Arc::new(BrokenArtifact(PathBuf::from("/config/.git/index.lock"))),
            Duration::from_secs(300),
            Arc::new(MetricsRecorder::new()),
            events,
        );

        assert!(matches!(detector.sweep().await, SweepOutcome::Failed(msg) if msg.contains("permission")));
    }
}
