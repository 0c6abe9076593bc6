use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{OperationId, OperationPriority};
use crate::{LockResult, OperationError};

/// Type-erased success value of an operation
pub type Payload = Box<dyn Any + Send>;

/// One invocation of an operation payload
pub type WorkFuture = BoxFuture<'static, Result<Payload, OperationError>>;

/// Operation payload, invoked once per attempt
pub type BoxedWork = Box<dyn FnMut() -> WorkFuture + Send>;

/// Completion channel back to the submitting caller
pub type Completion = oneshot::Sender<LockResult<Payload>>;

/// Caller-supplied options for a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Label for logs and metrics
    pub name: String,
    pub priority: OperationPriority,
}

impl SubmitOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: OperationPriority::default(),
        }
    }

    pub fn with_priority(mut self, priority: impl Into<OperationPriority>) -> Self {
        self.priority = priority.into();
        self
    }
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self::named("unnamed")
    }
}

/// A caller's demand to mutate the guarded repository.
///
/// Owned by the queue until dequeued, then by the executor for the duration
/// of its attempts. The completion channel is consumed exactly once.
pub struct OperationRequest {
    pub id: OperationId,
    pub name: String,
    pub priority: OperationPriority,
    pub submitted_at: Instant,
    pub queued_at: DateTime<Utc>,
    attempts: Arc<AtomicU32>,
    work: BoxedWork,
    completion: Option<Completion>,
}

impl OperationRequest {
    pub fn new(options: SubmitOptions, work: BoxedWork, completion: Completion) -> Self {
        Self {
            id: OperationId::new(),
            name: options.name,
            priority: options.priority,
            submitted_at: Instant::now(),
            queued_at: Utc::now(),
            attempts: Arc::new(AtomicU32::new(0)),
            work,
            completion: Some(completion),
        }
    }

    /// Wrap a typed closure into a type-erased request
    pub fn from_fn<F, Fut, T>(options: SubmitOptions, mut work: F) -> (Self, oneshot::Receiver<LockResult<Payload>>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed: BoxedWork = Box::new(move || {
            let fut = work();
            async move { fut.await.map(|value| Box::new(value) as Payload) }.boxed()
        });
        (Self::new(options, boxed, tx), rx)
    }

    /// Start one invocation of the payload
    pub fn invoke(&mut self) -> WorkFuture {
        (self.work)()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn set_attempts(&self, attempt: u32) {
        self.attempts.store(attempt, Ordering::Release);
    }

    /// Shared view of the attempt counter, for status reporting while in flight
    pub fn attempts_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }

    /// Deliver the terminal outcome. Returns false if the caller went away.
    pub fn complete(mut self, outcome: LockResult<Payload>) -> bool {
        match self.completion.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for OperationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRequest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_work_round_trips_through_payload() {
        let (mut request, rx) =
            OperationRequest::from_fn(SubmitOptions::named("commit"), || async { Ok::<_, OperationError>(42u32) });

        let value = request.invoke().await.unwrap();
        assert!(request.complete(Ok(value)));

        let payload = rx.await.unwrap().unwrap();
        assert_eq!(*payload.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn default_options_are_unnamed_normal() {
        let options = SubmitOptions::default();
        assert_eq!(options.name, "unnamed");
        assert_eq!(options.priority, OperationPriority::NORMAL);
    }

    #[test]
    fn completion_reports_dropped_caller() {
        let (request, rx) = OperationRequest::from_fn(SubmitOptions::default(), || async { Ok::<_, OperationError>(()) });
        drop(rx);
        assert!(!request.complete(Err(crate::LockError::ForceShutdown)));
    }
}
