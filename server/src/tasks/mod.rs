//! Task tracking and orchestration

pub mod model;
pub mod tracker;

pub use model::{fold_status, HostResult, StepRecord, Task, TaskKind, TaskStatus};
pub use tracker::{TaskTracker, TaskTrackerOptions};
