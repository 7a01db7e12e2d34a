//! Collection engine
//!
//! Task-scoped orchestration of one browser session: context and events,
//! the pagination coordinator state machine, and bounded retry for
//! transient driver failures.

pub mod context;
pub mod coordinator;
pub mod events;
pub mod retry;

// Re-exports for the common wiring path
pub use context::CollectionContext;
pub use coordinator::{CollectError, PaginationCoordinator, TaskSpec};
pub use events::TaskEvent;
pub use retry::RetryPolicy;
