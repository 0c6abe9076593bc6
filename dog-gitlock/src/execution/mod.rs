pub mod classify;
pub mod retry;
pub mod executor;

pub use classify::{classify_failure, FailureClass};
pub use retry::RetryPolicy;
pub use executor::RetryExecutor;
