pub mod metrics;
pub mod tracing;

pub use metrics::{
    CurrentOperation, MetricsCounters, MetricsRecorder, MetricsSnapshot, PendingOperation,
    QueueStatus, RunningAverage,
};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
