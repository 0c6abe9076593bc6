pub mod ids;
pub mod priority;
pub mod request;
pub mod state;
pub mod events;

pub use ids::OperationId;
pub use priority::OperationPriority;
pub use request::{BoxedWork, Completion, OperationRequest, Payload, SubmitOptions, WorkFuture};
pub use state::LifecycleState;
pub use events::LockEvent;
