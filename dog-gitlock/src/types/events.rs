use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LifecycleState, OperationId, OperationPriority};

/// Structured events emitted by a lock manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LockEvent {
    /// Operation accepted into the queue
    Queued {
        operation_id: OperationId,
        name: String,
        priority: OperationPriority,
        queue_size: usize,
        at: DateTime<Utc>,
    },

    /// An attempt is about to run
    Started {
        operation_id: OperationId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Attempt hit lock contention, sleeping before the next one
    Retrying {
        operation_id: OperationId,
        attempt: u32,
        backoff: Duration,
        error: String,
        at: DateTime<Utc>,
    },

    /// Operation succeeded
    Completed {
        operation_id: OperationId,
        attempts: u32,
        execution_time: Duration,
        at: DateTime<Utc>,
    },

    /// Operation failed terminally
    Failed {
        operation_id: OperationId,
        attempts: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Queued operation rejected by shutdown without running
    Rejected {
        operation_id: OperationId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// A stale lock artifact was deleted
    OrphanLockRemoved {
        lock_age: Duration,
        at: DateTime<Utc>,
    },

    ShutdownStarted {
        force: bool,
        queue_size: usize,
        at: DateTime<Utc>,
    },

    ShutdownCompleted {
        state: LifecycleState,
        rejected: usize,
        at: DateTime<Utc>,
    },
}

impl LockEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Started { .. } => "started",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Rejected { .. } => "rejected",
            Self::OrphanLockRemoved { .. } => "orphan_lock_removed",
            Self::ShutdownStarted { .. } => "shutdown_started",
            Self::ShutdownCompleted { .. } => "shutdown_completed",
        }
    }

    /// Get the operation ID, for operation-scoped events
    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            Self::Queued { operation_id, .. }
            | Self::Started { operation_id, .. }
            | Self::Retrying { operation_id, .. }
            | Self::Completed { operation_id, .. }
            | Self::Failed { operation_id, .. }
            | Self::Rejected { operation_id, .. } => Some(operation_id),
            Self::OrphanLockRemoved { .. }
            | Self::ShutdownStarted { .. }
            | Self::ShutdownCompleted { .. } => None,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Queued { at, .. }
            | Self::Started { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Rejected { at, .. }
            | Self::OrphanLockRemoved { at, .. }
            | Self::ShutdownStarted { at, .. }
            | Self::ShutdownCompleted { at, .. } => at,
        }
    }
}
