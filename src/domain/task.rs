//! Task: the unit of work submitted to the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capability::Capability;
use super::id::generate_id;
use super::kind::TaskKind;
use super::priority::Priority;
use super::result::TaskResult;
use super::status::TaskStatus;

/// Optional resource hints a worker may use to decide placement. The core
/// never enforces these at the OS level (see `ReservationTable`); they are
/// coarse bookkeeping only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequirements {
    pub cpu_cores: Option<f64>,
    pub memory_mb: Option<u64>,
    pub gpu: bool,
    pub max_runtime_seconds: Option<u64>,
    #[serde(default)]
    pub required_capabilities: Vec<Capability>,
}

/// Completion/error callbacks invoked exactly once, terminally. Never
/// serialized — a task loaded back from history has no hooks.
pub type TaskHook = Arc<dyn Fn(&TaskResult) + Send + Sync>;

#[derive(Clone, Default)]
pub struct TaskHooks {
    pub on_complete: Option<TaskHook>,
    pub on_error: Option<TaskHook>,
}

impl std::fmt::Debug for TaskHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHooks")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requirements: TaskRequirements,

    pub max_retries: u32,
    pub retry_count: u32,
    pub base_delay_seconds: f64,

    #[serde(default)]
    pub depends_on: Vec<String>,

    pub status: TaskStatus,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(skip)]
    pub hooks: TaskHooks,

    #[serde(skip)]
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn new(kind: TaskKind, priority: Priority) -> Self {
        let id = generate_id(&kind.to_string(), &uuid::Uuid::now_v7().to_string()[..8]);
        Self {
            id,
            kind,
            priority,
            payload: HashMap::new(),
            requirements: TaskRequirements::default(),
            max_retries: 3,
            retry_count: 0,
            base_delay_seconds: 1.0,
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
            hooks: TaskHooks::default(),
            result: None,
        }
    }

    pub fn with_payload(mut self, payload: HashMap<String, serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_requirements(mut self, requirements: TaskRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay_seconds(mut self, base_delay_seconds: f64) -> Self {
        self.base_delay_seconds = base_delay_seconds;
        self
    }

    pub fn with_dependency(mut self, dep_id: impl Into<String>) -> Self {
        self.depends_on.push(dep_id.into());
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_hooks(mut self, hooks: TaskHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// True iff every dependency id is present in `completed`.
    pub fn is_ready(&self, completed: &std::collections::HashSet<String>) -> bool {
        self.depends_on.iter().all(|dep| completed.contains(dep))
    }

    pub fn mark_queued(&mut self) {
        self.status = TaskStatus::Queued;
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a terminal success. Sets `result` and fires `on_complete`.
    pub fn mark_completed(&mut self, result: TaskResult) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        if let Some(hook) = &self.hooks.on_complete {
            hook(&result);
        }
        self.result = Some(result);
    }

    /// Record a failure. Returns `true` if a retry should be attempted
    /// (RUNNING -> QUEUED, retry_count incremented), `false` if retries are
    /// exhausted (-> FAILED, `on_error` fires, result stored).
    pub fn mark_failed(&mut self, result: TaskResult, retryable: bool) -> bool {
        if retryable && self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.status = TaskStatus::Queued;
            return true;
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        if let Some(hook) = &self.hooks.on_error {
            hook(&result);
        }
        self.result = Some(result);
        false
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.result = Some(TaskResult::failure("task cancelled"));
    }

    /// Exponential backoff delay for the *next* attempt, `base * 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        let secs = self.base_delay_seconds * 2f64.powi(attempt as i32);
        std::time::Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_set(ids: &[&str]) -> std::collections::HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(TaskKind::ToolCall, Priority::Normal);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.max_retries, 3);
        assert_eq!(task.retry_count, 0);
        assert!(task.depends_on.is_empty());
    }

    #[test]
    fn test_is_ready() {
        let task = Task::new(TaskKind::ToolCall, Priority::Normal)
            .with_dependency("a")
            .with_dependency("b");
        assert!(!task.is_ready(&completed_set(&["a"])));
        assert!(task.is_ready(&completed_set(&["a", "b"])));
    }

    #[test]
    fn test_is_ready_no_deps() {
        let task = Task::new(TaskKind::ToolCall, Priority::Normal);
        assert!(task.is_ready(&completed_set(&[])));
    }

    #[test]
    fn test_mark_completed_sets_result_and_fires_hook() {
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        let mut task = Task::new(TaskKind::ToolCall, Priority::Normal).with_hooks(TaskHooks {
            on_complete: Some(Arc::new(move |_| fired2.store(true, std::sync::atomic::Ordering::SeqCst))),
            on_error: None,
        });
        task.mark_completed(TaskResult::success("w", serde_json::Value::Null, 1));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.as_ref().unwrap().success);
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_mark_failed_retries_then_fails() {
        let mut task = Task::new(TaskKind::ToolCall, Priority::Normal).with_max_retries(2);
        assert!(task.mark_failed(TaskResult::failure("e1"), true));
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.retry_count, 1);

        assert!(task.mark_failed(TaskResult::failure("e2"), true));
        assert_eq!(task.retry_count, 2);

        assert!(!task.mark_failed(TaskResult::failure("e3"), true));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.result.as_ref().unwrap().error.as_deref(), Some("e3"));
    }

    #[test]
    fn test_mark_failed_non_retryable_fails_immediately() {
        let mut task = Task::new(TaskKind::ToolCall, Priority::Normal);
        assert!(!task.mark_failed(TaskResult::failure("routing error"), false));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let task = Task::new(TaskKind::ToolCall, Priority::Normal).with_base_delay_seconds(0.1);
        assert_eq!(task.backoff_delay(0).as_secs_f64(), 0.1);
        assert_eq!(task.backoff_delay(1).as_secs_f64(), 0.2);
        assert_eq!(task.backoff_delay(2).as_secs_f64(), 0.4);
    }

    #[test]
    fn test_mark_cancelled() {
        let mut task = Task::new(TaskKind::ToolCall, Priority::Normal);
        task.mark_cancelled();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(!task.result.as_ref().unwrap().success);
    }
}
