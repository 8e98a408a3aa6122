//! Domain types for the orchestrator core.
//!
//! `Task`/`TaskResult`/`Priority`/`TaskKind` are the shapes a future
//! HTTP/WebSocket façade would serialize at its boundary; this crate does
//! not implement that façade, only the types and the scheduling semantics
//! built on top of them.

mod batch;
mod capability;
mod id;
mod kind;
mod priority;
mod result;
mod status;
mod task;

pub use batch::ParallelBatch;
pub use capability::Capability;
pub use id::generate_id;
pub use kind::TaskKind;
pub use priority::Priority;
pub use result::TaskResult;
pub use status::TaskStatus;
pub use task::{Task, TaskHook, TaskHooks, TaskRequirements};
