//! Worker abstractions: capability-typed execution backends.
//!
//! Dispatch is by matching [`Capability`] bits against a tagged union of
//! concrete variants, not by subclass polymorphism: every variant satisfies
//! the same [`Worker`] contract through `async_trait`, dispatched behind
//! `Arc<dyn Worker>`.

mod cloud_llm;
mod container;
mod local_llm;
mod remote;

pub use cloud_llm::{CloudLlmClient, CloudLlmWorker, HttpCloudLlmClient};
pub use container::{ContainerPool, ContainerRunner, ContainerWorker, ProcessRunner};
pub use local_llm::{HttpLocalLlmClient, LocalLlmClient, LocalLlmWorker};
pub use remote::RemoteWorker;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::{Capability, Task, TaskResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Draining,
    Unhealthy,
    Stopped,
}

/// Cumulative counters for a worker, updated on every `submit` completion.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub tasks_executed: AtomicU64,
    pub tasks_failed: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl WorkerMetrics {
    pub fn record(&self, success: bool, duration_ms: u64) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn average_duration_ms(&self) -> f64 {
        let executed = self.tasks_executed.load(Ordering::Relaxed);
        if executed == 0 {
            return 0.0;
        }
        self.total_duration_ms.load(Ordering::Relaxed) as f64 / executed as f64
    }
}

/// The worker contract every backend variant implements. Every call that
/// can fail translates its failure into a `TaskResult` with `success =
/// false` rather than propagating a panic across the boundary.
#[async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> &str;
    fn capabilities(&self) -> &HashSet<Capability>;
    fn status(&self) -> WorkerStatus;
    fn load(&self) -> usize;
    fn cap(&self) -> usize;
    fn cost_per_1k_tokens(&self) -> Option<f64> {
        None
    }
    fn metrics(&self) -> &WorkerMetrics;

    /// One-time handshake. Idempotent; returns `false` on failure without
    /// raising.
    async fn start(&self) -> bool;

    /// Drain in-flight tasks (best effort), release handles.
    async fn stop(&self);

    /// Lightweight liveness probe; flips status to `Unhealthy` on failure
    /// and back to `Idle` on recovery.
    async fn health_check(&self) -> bool;

    /// Suspends until completion. Implementors must increment load on
    /// entry and decrement on every exit path (see
    /// [`LoadGuard`] for the idiom used by every variant in this crate).
    async fn submit(&self, task: &Task) -> TaskResult;

    /// True iff the capability set covers the task's required capability
    /// AND current load < cap AND status == Idle.
    fn can_handle(&self, task: &Task) -> bool {
        if self.status() != WorkerStatus::Idle || self.load() >= self.cap() {
            return false;
        }
        match task.kind.required_capability() {
            Some(required) => self.capabilities().contains(&required),
            None => true,
        }
    }
}

/// RAII load-counter guard: increments on construction, decrements on drop,
/// so every `submit` exit path (success, error, early return, panic-unwind)
/// releases the slot exactly once.
pub struct LoadGuard<'a> {
    load: &'a AtomicUsize,
}

impl<'a> LoadGuard<'a> {
    pub fn acquire(load: &'a AtomicUsize) -> Self {
        load.fetch_add(1, Ordering::SeqCst);
        Self { load }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.load.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared status cell used by every worker variant: an `Idle`/`Unhealthy`
/// flip on `health_check`, and a momentary `Draining` flip used by the
/// cloud-LLM worker on quota exhaustion.
pub struct StatusCell {
    inner: AsyncMutex<WorkerStatus>,
}

impl StatusCell {
    pub fn new(initial: WorkerStatus) -> Self {
        Self { inner: AsyncMutex::new(initial) }
    }

    pub async fn get(&self) -> WorkerStatus {
        *self.inner.lock().await
    }

    pub async fn set(&self, status: WorkerStatus) {
        *self.inner.lock().await = status;
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! An in-memory worker used throughout the integration scenarios so
    //! tests never touch a real container daemon, GPU, or network.
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    pub struct MockWorker {
        id: String,
        capabilities: HashSet<Capability>,
        cap: usize,
        load: AtomicUsize,
        status: Mutex<WorkerStatus>,
        metrics: WorkerMetrics,
        /// Behavior script: each call to `submit` pops the next entry. If
        /// the script is exhausted, the worker succeeds.
        script: Mutex<Vec<Result<serde_json::Value, String>>>,
        pub call_count: AtomicUsize,
        delay: Option<std::time::Duration>,
    }

    impl MockWorker {
        pub fn new(id: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
            Self {
                id: id.into(),
                capabilities: capabilities.into_iter().collect(),
                cap: 4,
                load: AtomicUsize::new(0),
                status: Mutex::new(WorkerStatus::Idle),
                metrics: WorkerMetrics::default(),
                script: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
                delay: None,
            }
        }

        pub fn with_cap(mut self, cap: usize) -> Self {
            self.cap = cap;
            self
        }

        pub fn with_script(self, script: Vec<Result<serde_json::Value, String>>) -> Self {
            *self.script.lock().unwrap() = script;
            self
        }

        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl Worker for MockWorker {
        fn id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> &HashSet<Capability> {
            &self.capabilities
        }

        fn status(&self) -> WorkerStatus {
            *self.status.lock().unwrap()
        }

        fn load(&self) -> usize {
            self.load.load(Ordering::SeqCst)
        }

        fn cap(&self) -> usize {
            self.cap
        }

        fn metrics(&self) -> &WorkerMetrics {
            &self.metrics
        }

        async fn start(&self) -> bool {
            *self.status.lock().unwrap() = WorkerStatus::Idle;
            true
        }

        async fn stop(&self) {
            *self.status.lock().unwrap() = WorkerStatus::Stopped;
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn submit(&self, _task: &Task) -> TaskResult {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let _guard = LoadGuard::acquire(&self.load);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop();
            let started = std::time::Instant::now();
            let result = match next {
                Some(Ok(data)) => TaskResult::success(&self.id, data, 0),
                Some(Err(e)) => TaskResult::failure(e).with_worker_id(&self.id),
                None => TaskResult::success(&self.id, serde_json::Value::Null, 0),
            };
            let elapsed = started.elapsed().as_millis() as u64;
            self.metrics.record(result.success, elapsed);
            result.with_execution_time_ms(elapsed)
        }
    }

    #[tokio::test]
    async fn test_mock_worker_script_order() {
        // script is popped from the back, so push in reverse call order
        let worker = MockWorker::new("m1", [Capability::ToolCall]).with_script(vec![
            Ok(serde_json::json!("third")),
            Err("second failed".into()),
            Ok(serde_json::json!("first")),
        ]);
        let task = Task::new(crate::domain::TaskKind::ToolCall, crate::domain::Priority::Normal);
        assert_eq!(worker.submit(&task).await.data, serde_json::json!("first"));
        assert_eq!(worker.submit(&task).await.error.unwrap(), "second failed");
        assert_eq!(worker.submit(&task).await.data, serde_json::json!("third"));
        assert_eq!(worker.call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_mock_worker_can_handle() {
        let worker = MockWorker::new("m1", [Capability::ToolCall]).with_cap(1);
        let matching = Task::new(crate::domain::TaskKind::ToolCall, crate::domain::Priority::Normal);
        let mismatched = Task::new(crate::domain::TaskKind::CodeExecution, crate::domain::Priority::Normal);
        assert!(worker.can_handle(&matching));
        assert!(!worker.can_handle(&mismatched));
    }
}
