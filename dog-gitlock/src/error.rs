use std::time::Duration;
use thiserror::Error;

/// Result type for lock manager operations
pub type LockResult<T> = Result<T, LockError>;

/// Errors surfaced to callers of the lock manager
#[derive(Error, Debug, Clone)]
pub enum LockError {
    /// The wrapped git command failed on git's own locking
    #[error("Lock contention: {0}")]
    LockContention(String),

    /// An attempt did not resolve before the per-attempt deadline
    #[error("Operation timeout after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Operation failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: Box<LockError>,
    },

    #[error("Lock manager is shutting down, rejecting new operations")]
    ShuttingDown,

    #[error("Lock manager shutdown timeout")]
    ShutdownTimeout,

    #[error("Lock manager force shutdown")]
    ForceShutdown,

    /// Any other failure reported by the payload, passed through unchanged
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LockError {
    /// Whether the error was produced by shutdown rather than by running the operation
    pub fn is_shutdown_rejection(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::ShutdownTimeout | Self::ForceShutdown
        )
    }

    /// Whether resubmitting the same operation later could reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockContention(_) | Self::Timeout { .. } | Self::ExhaustedRetries { .. }
        )
    }
}

/// Failure reported by an operation payload.
///
/// Git only reports failures as text, so the message is all we keep.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for OperationError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
