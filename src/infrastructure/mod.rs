// Infrastructure module - Core background services and utilities
pub mod backoff;
pub mod heartbeat;
pub mod task_manager;

pub use backoff::BackoffPolicy;
pub use heartbeat::HeartbeatManager;
pub use task_manager::{TaskKind, TaskManager};
