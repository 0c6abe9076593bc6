use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{
    execution::{RetryExecutor, RetryPolicy},
    lock::{FsLockArtifact, LockArtifact, OrphanLockDetector, OrphanLockSweeper, SweepOutcome},
    observability::{CurrentOperation, MetricsRecorder, MetricsSnapshot, PendingOperation, QueueStatus},
    queue::OperationQueue,
    BoxStream, LifecycleState, LockError, LockEvent, LockManagerConfig, LockResult, OperationError,
    OperationId, OperationRequest, SubmitOptions,
};

/// Options for [`GitLockManager::shutdown`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownOptions {
    /// Drain deadline; `None` uses the configured `shutdown_timeout`
    pub timeout: Option<Duration>,
    /// Reject the queue immediately instead of draining it
    pub force: bool,
}

impl ShutdownOptions {
    pub fn graceful(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            force: false,
        }
    }

    pub fn force() -> Self {
        Self {
            timeout: None,
            force: true,
        }
    }
}

/// What a shutdown call did
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// State after the call returned
    pub state: LifecycleState,
    /// Queued operations rejected without running
    pub rejected: usize,
    pub elapsed: Duration,
}

/// The attempt currently owned by the drive worker
struct InFlight {
    id: OperationId,
    name: String,
    submitted_at: Instant,
    attempts: Arc<AtomicU32>,
}

impl InFlight {
    fn of(request: &OperationRequest) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            submitted_at: request.submitted_at,
            attempts: request.attempts_handle(),
        }
    }

    fn view(&self) -> CurrentOperation {
        CurrentOperation {
            id: self.id.clone(),
            name: self.name.clone(),
            attempts: self.attempts.load(Ordering::Acquire),
            queued_for: self.submitted_at.elapsed(),
        }
    }
}

/// Mutable state guarded by one lock; never held across an await
struct QueueState {
    lifecycle: LifecycleState,
    queue: OperationQueue<OperationRequest>,
    current: Option<InFlight>,
}

struct Shared {
    config: LockManagerConfig,
    state: Mutex<QueueState>,
    wakeup: Notify,
    metrics: Arc<MetricsRecorder>,
    detector: Arc<OrphanLockDetector>,
    events: broadcast::Sender<LockEvent>,
}

impl Shared {
    fn emit(&self, event: LockEvent) {
        let _ = self.events.send(event);
    }

    /// Resolve never-started requests with a shutdown error
    fn reject_all(&self, requests: Vec<OperationRequest>, reason: LockError) -> usize {
        let count = requests.len();
        for request in requests {
            self.emit(LockEvent::Rejected {
                operation_id: request.id.clone(),
                reason: reason.to_string(),
                at: Utc::now(),
            });
            debug!(operation_id = %request.id, name = %request.name, reason = %reason, "Rejecting queued operation");
            request.complete(Err(reason.clone()));
        }
        count
    }
}

/// Stops the background tasks when the last manager handle goes away
struct TaskGuard {
    worker_stop: watch::Sender<bool>,
    sweeper_stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl TaskGuard {
    fn stop_sweeper(&self) {
        let _ = self.sweeper_stop.send(true);
    }

    fn stop_worker(&self) {
        let _ = self.worker_stop.send(true);
    }

    /// Whether both background tasks have exited
    fn is_finished(&self) -> bool {
        self.worker.is_finished() && self.sweeper.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.stop_sweeper();
        self.stop_worker();
    }
}

/// Serializes every mutation of one git repository.
///
/// Callers submit operations concurrently; a single drive worker runs them
/// one at a time in priority order, cleaning orphaned `index.lock` files and
/// retrying lock contention with backoff. Cheap to clone; construct one per
/// repository at startup and hand it to the scheduler, file watcher and
/// HTTP handlers.
#[derive(Clone)]
pub struct GitLockManager {
    shared: Arc<Shared>,
    tasks: Arc<TaskGuard>,
}

impl GitLockManager {
    /// Start a manager guarding `<repo>/.git/index.lock` with default settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn for_repository(repo_path: impl AsRef<Path>) -> LockResult<Self> {
        Self::start(LockManagerConfig::for_repository(repo_path))
    }

    /// Start a manager watching `config.lock_path` on the local filesystem
    pub fn start(config: LockManagerConfig) -> LockResult<Self> {
        let artifact = Arc::new(FsLockArtifact::new(config.lock_path.clone()));
        Self::with_artifact(config, artifact)
    }

    /// Start a manager over a custom lock artifact implementation
    pub fn with_artifact(config: LockManagerConfig, artifact: Arc<dyn LockArtifact>) -> LockResult<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(1024);
        let metrics = Arc::new(MetricsRecorder::new());
        let detector = Arc::new(OrphanLockDetector::new(
            artifact,
            config.orphan_lock_age,
            metrics.clone(),
            events.clone(),
        ));
        let executor = RetryExecutor::new(
            RetryPolicy::from_config(&config),
            config.operation_timeout,
            detector.clone(),
            metrics.clone(),
            events.clone(),
        );

        let (worker_stop, worker_rx) = watch::channel(false);
        let (sweeper_stop, sweeper_rx) = watch::channel(false);

        let sweeper = OrphanLockSweeper::new(detector.clone(), metrics.clone(), config.sweep_interval);

        info!(
            lock_path = %config.lock_path.display(),
            operation_timeout_ms = config.operation_timeout.as_millis() as u64,
            max_attempts = config.max_attempts,
            orphan_lock_age_secs = config.orphan_lock_age.as_secs(),
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "Lock manager initialized"
        );

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(QueueState {
                lifecycle: LifecycleState::Running,
                queue: OperationQueue::new(),
                current: None,
            }),
            wakeup: Notify::new(),
            metrics,
            detector,
            events,
        });

        let worker = tokio::spawn(drive(shared.clone(), executor, worker_rx));
        let sweeper = sweeper.spawn(sweeper_rx);

        Ok(Self {
            shared,
            tasks: Arc::new(TaskGuard {
                worker_stop,
                sweeper_stop,
                worker,
                sweeper,
            }),
        })
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.shared.config
    }

    /// Queue `work` and wait for its terminal outcome.
    ///
    /// `work` is invoked once per attempt. Fails fast with
    /// [`LockError::ShuttingDown`] once shutdown has begun.
    #[instrument(skip(self, work, options), fields(name = %options.name, priority = %options.priority))]
    pub async fn submit<F, Fut, T>(&self, work: F, options: SubmitOptions) -> LockResult<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
        T: Send + 'static,
    {
        let (request, completion) = OperationRequest::from_fn(options, work);
        self.enqueue(request)?;

        let payload = completion
            .await
            .map_err(|_| LockError::Internal("operation dropped before completion".to_string()))??;

        payload
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| LockError::Internal("operation produced an unexpected result type".to_string()))
    }

    fn enqueue(&self, request: OperationRequest) -> LockResult<OperationId> {
        let operation_id = request.id.clone();
        let name = request.name.clone();
        let priority = request.priority;

        let queue_size = {
            let mut state = self.shared.state.lock();
            if !state.lifecycle.accepts_submissions() {
                warn!(name = %name, state = %state.lifecycle, "Rejecting operation, manager is shutting down");
                return Err(LockError::ShuttingDown);
            }
            state.queue.push(priority, request);
            let queue_size = state.queue.len();
            // published before the worker can observe the request
            self.shared.emit(LockEvent::Queued {
                operation_id: operation_id.clone(),
                name: name.clone(),
                priority,
                queue_size,
                at: Utc::now(),
            });
            queue_size
        };

        self.shared.metrics.record_queued();
        self.shared.wakeup.notify_one();

        debug!(operation_id = %operation_id, name = %name, queue_size, "Operation queued");
        Ok(operation_id)
    }

    /// Point-in-time metrics. Never waits on running operations.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (queue_size, current, lifecycle) = {
            let state = self.shared.state.lock();
            (
                state.queue.len(),
                state.current.as_ref().map(InFlight::view),
                state.lifecycle,
            )
        };
        MetricsSnapshot::new(self.shared.metrics.counters(), queue_size, current, lifecycle)
    }

    /// Pending operations in execution order
    pub fn queue_status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        let operations = state
            .queue
            .iter()
            .map(|request| PendingOperation {
                id: request.id.clone(),
                name: request.name.clone(),
                priority: request.priority,
                queued_for: request.submitted_at.elapsed(),
                attempts: request.attempts(),
            })
            .collect::<Vec<_>>();

        QueueStatus {
            size: operations.len(),
            processing: state.current.is_some(),
            operations,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state.lock().lifecycle
    }

    /// Whether the drive worker and the periodic sweeper have both exited
    pub fn tasks_finished(&self) -> bool {
        self.tasks.is_finished()
    }

    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
        info!("Lock manager metrics reset");
    }

    /// Run an orphan lock sweep right now
    pub async fn sweep_orphan_lock(&self) -> SweepOutcome {
        self.shared.detector.sweep().await
    }

    /// Subscribe to lock events
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.shared.events.subscribe()
    }

    /// Event stream for observability; lagged events are skipped
    pub fn event_stream(&self) -> BoxStream<LockEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let stream = BroadcastStream::new(self.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }

    /// Stop accepting work and wind down.
    ///
    /// Graceful: keep executing the queue until it is empty and idle, or
    /// until the timeout, then reject what is left with
    /// [`LockError::ShutdownTimeout`]. Forced: reject the whole queue with
    /// [`LockError::ForceShutdown`] immediately. An attempt already running
    /// is never interrupted. Always returns; calls after shutdown has begun
    /// return the current state without waiting.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, options: ShutdownOptions) -> ShutdownReport {
        let started = Instant::now();
        let timeout = options.timeout.unwrap_or(self.shared.config.shutdown_timeout);
        let target = if options.force {
            LifecycleState::ForceStopped
        } else {
            LifecycleState::Draining
        };

        let (queue_size, forced) = {
            let mut state = self.shared.state.lock();
            if !state.lifecycle.can_transition_to(target) {
                debug!(state = %state.lifecycle, "Shutdown already in progress");
                return ShutdownReport {
                    state: state.lifecycle,
                    rejected: 0,
                    elapsed: started.elapsed(),
                };
            }

            info!(
                queue_size = state.queue.len(),
                processing = state.current.is_some(),
                timeout_ms = timeout.as_millis() as u64,
                force = options.force,
                "Shutdown initiated"
            );

            state.lifecycle = target;
            let queue_size = state.queue.len();
            let forced = if options.force {
                Some(state.queue.drain())
            } else {
                None
            };
            (queue_size, forced)
        };

        self.shared.emit(LockEvent::ShutdownStarted {
            force: options.force,
            queue_size,
            at: Utc::now(),
        });
        self.tasks.stop_sweeper();

        let (state, rejected) = match forced {
            Some(queued) => {
                let rejected = self.shared.reject_all(queued, LockError::ForceShutdown);
                warn!(rejected, "Force shutdown - all queued operations rejected");
                (LifecycleState::ForceStopped, rejected)
            }
            None => self.drain(started, timeout).await,
        };

        if !options.force && state == LifecycleState::ForceStopped {
            // the forced call that escalated this drain reports completion
            return ShutdownReport {
                state,
                rejected,
                elapsed: started.elapsed(),
            };
        }

        if state.is_terminal() {
            self.tasks.stop_worker();
            // wake an idle worker so it observes the terminal state
            self.shared.wakeup.notify_one();
        }

        self.shared.emit(LockEvent::ShutdownCompleted {
            state,
            rejected,
            at: Utc::now(),
        });

        let snapshot = self.snapshot();
        info!(
            state = %state,
            rejected,
            total_operations = snapshot.total_operations,
            successful_operations = snapshot.successful_operations,
            failed_operations = snapshot.failed_operations,
            "Shutdown complete"
        );

        ShutdownReport {
            state,
            rejected,
            elapsed: started.elapsed(),
        }
    }

    /// Wait for the queue to drain, polling at a fixed interval
    async fn drain(&self, started: Instant, timeout: Duration) -> (LifecycleState, usize) {
        let poll = self.shared.config.shutdown_poll_interval;

        loop {
            let leftover = {
                let mut state = self.shared.state.lock();
                if state.lifecycle != LifecycleState::Draining {
                    // escalated by a concurrent forced shutdown
                    return (state.lifecycle, 0);
                }
                if state.queue.is_empty() && state.current.is_none() {
                    state.lifecycle = LifecycleState::Stopped;
                    Some(Vec::new())
                } else if started.elapsed() >= timeout {
                    state.lifecycle = LifecycleState::Stopped;
                    Some(state.queue.drain())
                } else {
                    None
                }
            };

            if let Some(leftover) = leftover {
                if !leftover.is_empty() {
                    warn!(remaining_operations = leftover.len(), "Shutdown timeout - rejecting remaining operations");
                }
                let rejected = self.shared.reject_all(leftover, LockError::ShutdownTimeout);
                return (LifecycleState::Stopped, rejected);
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(poll.min(remaining).max(Duration::from_millis(1))).await;
        }
    }
}

impl std::fmt::Debug for GitLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLockManager")
            .field("lock_path", &self.shared.config.lock_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// The single drive worker: dequeues and executes one operation at a time
async fn drive(shared: Arc<Shared>, executor: RetryExecutor, mut stop: watch::Receiver<bool>) {
    debug!("Drive worker started");

    loop {
        if *stop.borrow() {
            break;
        }

        let next = {
            let mut state = shared.state.lock();
            if !state.lifecycle.executes_queue() {
                break;
            }
            let next = state.queue.pop();
            if let Some(request) = &next {
                state.current = Some(InFlight::of(request));
            }
            next
        };

        let Some(mut request) = next else {
            tokio::select! {
                _ = shared.wakeup.notified() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        let outcome = executor.execute(&mut request).await;
        let operation_id = request.id.clone();
        if !request.complete(outcome) {
            debug!(operation_id = %operation_id, "Caller went away before completion");
        }
        shared.state.lock().current = None;
    }

    debug!("Drive worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn config(dir: &tempfile::TempDir) -> LockManagerConfig {
        LockManagerConfig::for_repository(dir.path())
            .with_operation_timeout(Duration::from_millis(500))
            .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
            .with_shutdown_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn submit_returns_the_typed_result() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GitLockManager::start(config(&dir)).unwrap();

        let sha = assert_ok!(
            manager
                .submit(|| async { Ok::<_, OperationError>("abc123".to_string()) }, SubmitOptions::named("commit"))
                .await
        );

        assert_eq!(sha, "abc123");
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.total_operations, 1);
        assert_eq!(snapshot.queued_operations, 1);
        assert!(!snapshot.is_processing);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let err = assert_err!(GitLockManager::start(config(&dir).with_max_attempts(0)));
        assert!(matches!(err, LockError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn repeated_shutdown_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GitLockManager::start(config(&dir)).unwrap();

        let first = manager.shutdown(ShutdownOptions::graceful(Duration::from_millis(100))).await;
        assert_eq!(first.state, LifecycleState::Stopped);
        assert_eq!(first.rejected, 0);

        let second = manager.shutdown(ShutdownOptions::force()).await;
        assert_eq!(second.state, LifecycleState::Stopped);
        assert_eq!(manager.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_stops_background_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GitLockManager::start(config(&dir)).unwrap();
        assert!(!manager.tasks_finished());

        manager.shutdown(ShutdownOptions::graceful(Duration::from_millis(100))).await;

        assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), async {
                while !manager.tasks_finished() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
        );
    }

    #[tokio::test]
    async fn reset_metrics_clears_totals() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GitLockManager::start(config(&dir)).unwrap();
        manager
            .submit(|| async { Ok::<_, OperationError>(()) }, SubmitOptions::default())
            .await
            .unwrap();

        manager.reset_metrics();
        assert_eq!(manager.snapshot().total_operations, 0);
    }
}
