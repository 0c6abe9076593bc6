//! # dog-gitlock: Serialized Git Operations for Backup Services
//!
//! **One writer per repository, with orphan lock recovery**
//!
//! A backup service mutates a single git repository from many places at once:
//! the scheduler, the file watcher, the HTTP API. Git protects itself with
//! `.git/index.lock` and fails any command that finds the file present.
//! dog-gitlock funnels every mutation through one queue so only one git
//! command runs at a time, and cleans up after git processes that crashed
//! while holding the lock.
//!
//! ## Features
//!
//! - **Strict Serialization**: A single drive worker owns the repository
//! - **Priority Ordering**: Higher priority first, FIFO within a priority
//! - **Orphan Lock Recovery**: Stale `index.lock` files are removed before each attempt and periodically
//! - **Backoff Retries**: Lock contention is retried with capped, jittered exponential backoff
//! - **Graceful Shutdown**: Drain with a deadline, or reject everything at once
//! - **Structured Observability**: Metrics snapshots and an event stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_gitlock::prelude::*;
//!
//! # async fn run() -> LockResult<()> {
//! let manager = GitLockManager::for_repository("/config")?;
//!
//! let summary = manager
//!     .submit(
//!         || async { Ok::<_, OperationError>("committed 3 files") },
//!         SubmitOptions::named("commit").with_priority(OperationPriority::HIGH),
//!     )
//!     .await?;
//!
//! println!("{summary}");
//! manager.shutdown(ShutdownOptions::default()).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod lock;
pub mod manager;
pub mod observability;
pub mod queue;
pub mod types;

use std::pin::Pin;

use futures_core::Stream;

// Core API exports
pub use config::{LockManagerConfig, ENV_PREFIX};
pub use error::{LockError, LockResult, OperationError};
pub use manager::{GitLockManager, ShutdownOptions, ShutdownReport};
pub use types::{
    LifecycleState, LockEvent, OperationId, OperationPriority, OperationRequest, Payload,
    SubmitOptions,
};

// Building blocks
pub use execution::{classify_failure, FailureClass, RetryExecutor, RetryPolicy};
pub use lock::{FsLockArtifact, LockArtifact, OrphanLockDetector, OrphanLockSweeper, SweepOutcome};
pub use queue::OperationQueue;

// Observability exports
pub use observability::{
    CurrentOperation, MetricsRecorder, MetricsSnapshot, PendingOperation, QueueStatus,
};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Boxed stream of lock events
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Everything needed to submit git operations
pub mod prelude {
    pub use crate::{
        GitLockManager, LockManagerConfig, ShutdownOptions, ShutdownReport, SubmitOptions,
    };

    pub use crate::{LockError, LockResult, OperationError, OperationPriority};

    pub use crate::{LifecycleState, LockEvent, MetricsSnapshot, QueueStatus};
}
