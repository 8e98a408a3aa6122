//! Orchestrator-level completion/error observers. Fire-and-forget: a
//! missing subscriber is fine, and a hook that panics is caught and logged
//! rather than taking down the scheduler loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tracing::warn;

use crate::domain::{Task, TaskResult};

pub type OrchestratorHook = Arc<dyn Fn(&Task, &TaskResult) + Send + Sync>;

#[derive(Clone, Default)]
pub struct OrchestratorHooks {
    pub on_task_complete: Option<OrchestratorHook>,
    pub on_task_failed: Option<OrchestratorHook>,
}

impl OrchestratorHooks {
    pub fn fire(&self, task: &Task, result: &TaskResult) {
        let hook = if result.success { &self.on_task_complete } else { &self.on_task_failed };
        let Some(hook) = hook else { return };

        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| hook(task, result))) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(task_id = %task.id, %message, "task hook panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_fires_on_complete_for_success() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let hooks = OrchestratorHooks {
            on_task_complete: Some(Arc::new(move |_, _| fired2.store(true, Ordering::SeqCst))),
            on_task_failed: None,
        };
        let task = Task::new(TaskKind::ToolCall, Priority::Normal);
        hooks.fire(&task, &TaskResult::success("w", serde_json::Value::Null, 0));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panic_in_hook_is_caught() {
        let hooks = OrchestratorHooks { on_task_complete: Some(Arc::new(|_, _| panic!("boom"))), on_task_failed: None };
        let task = Task::new(TaskKind::ToolCall, Priority::Normal);
        hooks.fire(&task, &TaskResult::success("w", serde_json::Value::Null, 0));
    }

    #[test]
    fn test_missing_hook_is_a_noop() {
        let hooks = OrchestratorHooks::default();
        let task = Task::new(TaskKind::ToolCall, Priority::Normal);
        hooks.fire(&task, &TaskResult::failure("e"));
    }
}
