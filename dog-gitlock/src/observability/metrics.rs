use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::{LifecycleState, OperationId, OperationPriority};

/// Exponential moving average over durations.
///
/// The first ten samples are weighted equally; afterwards each new sample
/// contributes 10%.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningAverage {
    millis: f64,
    samples: u64,
}

impl RunningAverage {
    pub fn record(&mut self, value: Duration) {
        let count = self.samples as f64;
        let alpha = if count < 10.0 { 1.0 / (count + 1.0) } else { 0.1 };
        let sample = value.as_secs_f64() * 1000.0;

        self.millis = (1.0 - alpha) * self.millis + alpha * sample;
        self.samples += 1;
    }

    pub fn value(&self) -> Duration {
        Duration::from_secs_f64(self.millis.max(0.0) / 1000.0)
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Accumulated counters, copied out under a single read lock
#[derive(Debug, Clone)]
pub struct MetricsCounters {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub retried_operations: u64,
    pub orphan_locks_removed: u64,
    pub queued_operations: u64,
    pub average_wait_time: RunningAverage,
    pub average_execution_time: RunningAverage,
    pub last_cleanup: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl MetricsCounters {
    fn new() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            retried_operations: 0,
            orphan_locks_removed: 0,
            queued_operations: 0,
            average_wait_time: RunningAverage::default(),
            average_execution_time: RunningAverage::default(),
            last_cleanup: None,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Success rate as percentage (0 before anything ran)
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.successful_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Running statistics for one lock manager.
///
/// Written by the drive worker and the sweepers; every update takes the
/// write lock once so `successful + failed == total` holds in any snapshot.
#[derive(Debug)]
pub struct MetricsRecorder {
    counters: RwLock<MetricsCounters>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(MetricsCounters::new()),
        }
    }

    pub fn record_queued(&self) {
        self.counters.write().queued_operations += 1;
    }

    /// Time between submission and the first attempt
    pub fn record_wait(&self, wait: Duration) {
        self.counters.write().average_wait_time.record(wait);
    }

    pub fn record_success(&self, execution_time: Duration, attempts: u32) {
        let mut counters = self.counters.write();
        counters.total_operations += 1;
        counters.successful_operations += 1;
        if attempts > 1 {
            counters.retried_operations += 1;
        }
        counters.average_execution_time.record(execution_time);
    }

    pub fn record_failure(&self, attempts: u32) {
        let mut counters = self.counters.write();
        counters.total_operations += 1;
        counters.failed_operations += 1;
        if attempts > 1 {
            counters.retried_operations += 1;
        }
    }

    pub fn record_orphan_removed(&self) {
        self.counters.write().orphan_locks_removed += 1;
    }

    /// A periodic sweep finished
    pub fn record_cleanup(&self) {
        self.counters.write().last_cleanup = Some(Utc::now());
    }

    /// Zero every counter and restart the uptime clock
    pub fn reset(&self) {
        *self.counters.write() = MetricsCounters::new();
    }

    pub fn counters(&self) -> MetricsCounters {
        self.counters.read().clone()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// The operation currently held by the drive worker
#[derive(Debug, Clone, Serialize)]
pub struct CurrentOperation {
    pub id: OperationId,
    pub name: String,
    pub attempts: u32,
    #[serde(with = "duration_ms")]
    pub queued_for: Duration,
}

/// Immutable point-in-time view of a lock manager
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub retried_operations: u64,
    pub orphan_locks_removed: u64,
    pub queued_operations: u64,
    /// Percentage of finished operations that succeeded
    pub success_rate: f64,
    pub current_queue_size: usize,
    pub is_processing: bool,
    pub current_operation: Option<CurrentOperation>,
    #[serde(with = "duration_ms")]
    pub average_wait_time: Duration,
    #[serde(with = "duration_ms")]
    pub average_execution_time: Duration,
    pub last_cleanup: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub uptime: Duration,
    pub state: LifecycleState,
}

impl MetricsSnapshot {
    pub fn new(
        counters: MetricsCounters,
        current_queue_size: usize,
        current_operation: Option<CurrentOperation>,
        state: LifecycleState,
    ) -> Self {
        Self {
            success_rate: counters.success_rate(),
            uptime: counters.uptime(),
            total_operations: counters.total_operations,
            successful_operations: counters.successful_operations,
            failed_operations: counters.failed_operations,
            retried_operations: counters.retried_operations,
            orphan_locks_removed: counters.orphan_locks_removed,
            queued_operations: counters.queued_operations,
            current_queue_size,
            is_processing: current_operation.is_some(),
            current_operation,
            average_wait_time: counters.average_wait_time.value(),
            average_execution_time: counters.average_execution_time.value(),
            last_cleanup: counters.last_cleanup,
            started_at: counters.started_at,
            state,
        }
    }

    /// Render for health endpoints
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A queued operation as seen from outside
#[derive(Debug, Clone, Serialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub name: String,
    pub priority: OperationPriority,
    #[serde(with = "duration_ms")]
    pub queued_for: Duration,
    pub attempts: u32,
}

/// Queue contents in execution order
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub processing: bool,
    pub operations: Vec<PendingOperation>,
}

/// Serialize durations as whole milliseconds
mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }
}
