use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{OrphanLockDetector, SweepOutcome};
use crate::MetricsRecorder;

/// Periodic orphan lock sweep, independent of the drive worker.
///
/// Runs until the stop signal flips to `true` or its sender is dropped;
/// it never holds the process open on its own.
pub struct OrphanLockSweeper {
    detector: Arc<OrphanLockDetector>,
    metrics: Arc<MetricsRecorder>,
    interval: Duration,
}

impl OrphanLockSweeper {
    pub fn new(
        detector: Arc<OrphanLockDetector>,
        metrics: Arc<MetricsRecorder>,
        interval: Duration,
    ) -> Self {
        Self {
            detector,
            metrics,
            interval,
        }
    }

    /// Start the sweeper background task
    pub fn spawn(self, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        // first sweep one full interval after start
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(interval_ms = self.interval.as_millis() as u64, "Starting orphan lock sweeper");

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        debug!("Orphan lock sweeper stopped");
    }

    /// Run one sweep cycle and stamp `last_cleanup`
    pub async fn sweep_once(&self) -> SweepOutcome {
        let outcome = self.detector.sweep().await;
        self.metrics.record_cleanup();

        match &outcome {
            SweepOutcome::Removed { age } => {
                info!(lock_age_secs = age.as_secs(), "Periodic sweep reclaimed orphan lock");
            }
            SweepOutcome::Failed(error) => {
                warn!(error = %error, "Periodic sweep could not inspect lock file");
            }
            SweepOutcome::Absent | SweepOutcome::Fresh { .. } => {
                debug!("No orphan lock found");
            }
        }

        outcome
    }
}
