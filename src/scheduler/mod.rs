//! Priority-ordered, dependency-gated ready queue feeding the orchestrator's
//! background scheduler loop.

mod core;
mod queue;

pub use self::core::SmartScheduler;
pub use queue::{QueueEntry, SchedulerStats};
