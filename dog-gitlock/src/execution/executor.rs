use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use super::classify::{classify_failure, FailureClass};
use super::retry::RetryPolicy;
use crate::{
    lock::OrphanLockDetector, LockError, LockEvent, LockResult, MetricsRecorder, OperationError,
    OperationRequest, Payload,
};

/// Why a single attempt did not succeed
#[derive(Debug)]
enum AttemptFailure {
    Timeout,
    Failed(OperationError),
}

/// Runs one operation to a terminal outcome: orphan sweep, timed attempt,
/// and backoff retries while git reports lock contention.
pub struct RetryExecutor {
    policy: RetryPolicy,
    operation_timeout: Duration,
    detector: Arc<OrphanLockDetector>,
    metrics: Arc<MetricsRecorder>,
    events: broadcast::Sender<LockEvent>,
}

impl RetryExecutor {
    pub fn new(
        policy: RetryPolicy,
        operation_timeout: Duration,
        detector: Arc<OrphanLockDetector>,
        metrics: Arc<MetricsRecorder>,
        events: broadcast::Sender<LockEvent>,
    ) -> Self {
        Self {
            policy,
            operation_timeout,
            detector,
            metrics,
            events,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `request` until it succeeds or fails terminally.
    ///
    /// The caller delivers the returned outcome through the request's
    /// completion channel.
    #[instrument(skip(self, request), fields(operation_id = %request.id, name = %request.name))]
    pub async fn execute(&self, request: &mut OperationRequest) -> LockResult<Payload> {
        self.metrics.record_wait(request.submitted_at.elapsed());

        let mut attempt = 0;
        loop {
            attempt += 1;
            request.set_attempts(attempt);

            debug!(attempt, max_attempts = self.policy.max_attempts, "Executing operation");

            if tokio::time::timeout(self.operation_timeout, self.detector.sweep()).await.is_err() {
                warn!(timeout_ms = self.operation_timeout.as_millis() as u64, "Orphan lock check timed out, attempting anyway");
            }
            self.emit(LockEvent::Started {
                operation_id: request.id.clone(),
                attempt,
                at: Utc::now(),
            });

            let started = Instant::now();
            let failure = match self.run_attempt(request).await {
                Ok(value) => {
                    let execution_time = started.elapsed();
                    self.metrics.record_success(execution_time, attempt);
                    self.emit(LockEvent::Completed {
                        operation_id: request.id.clone(),
                        attempts: attempt,
                        execution_time,
                        at: Utc::now(),
                    });
                    debug!(attempt, execution_ms = execution_time.as_millis() as u64, "Operation completed");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let terminal = match failure {
                AttemptFailure::Timeout => {
                    warn!(attempt, timeout_ms = self.operation_timeout.as_millis() as u64, "Operation timed out");
                    LockError::Timeout {
                        after: self.operation_timeout,
                    }
                }
                AttemptFailure::Failed(err) => {
                    warn!(attempt, max_attempts = self.policy.max_attempts, error = %err, "Operation failed");
                    match classify_failure(&err) {
                        FailureClass::LockContention if self.policy.has_attempts_left(attempt) => {
                            let backoff = self.policy.next_delay(attempt);
                            info!(attempt, backoff_ms = backoff.as_millis() as u64, "Retrying after backoff");
                            self.emit(LockEvent::Retrying {
                                operation_id: request.id.clone(),
                                attempt,
                                backoff,
                                error: err.to_string(),
                                at: Utc::now(),
                            });
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        FailureClass::LockContention => LockError::ExhaustedRetries {
                            attempts: attempt,
                            last_error: Box::new(LockError::LockContention(err.message().to_string())),
                        },
                        FailureClass::Terminal => LockError::Operation(err),
                    }
                }
            };

            self.metrics.record_failure(attempt);
            self.emit(LockEvent::Failed {
                operation_id: request.id.clone(),
                attempts: attempt,
                error: terminal.to_string(),
                at: Utc::now(),
            });
            error!(attempts = attempt, error = %terminal, "Operation failed terminally");
            return Err(terminal);
        }
    }

    /// One invocation under the per-attempt deadline.
    ///
    /// On timeout the attempt's future is dropped; anything it already
    /// spawned outside this task keeps running.
    async fn run_attempt(&self, request: &mut OperationRequest) -> Result<Payload, AttemptFailure> {
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| request.invoke()))
            .map_err(|panic| AttemptFailure::Failed(panicked(panic)))?;

        match tokio::time::timeout(self.operation_timeout, AssertUnwindSafe(future).catch_unwind()).await {
            Err(_) => Err(AttemptFailure::Timeout),
            Ok(Err(panic)) => Err(AttemptFailure::Failed(panicked(panic))),
            Ok(Ok(result)) => result.map_err(AttemptFailure::Failed),
        }
    }

    fn emit(&self, event: LockEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

fn panicked(panic: Box<dyn Any + Send>) -> OperationError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    OperationError::new(format!("operation panicked: {detail}"))
}
