//! Container worker: executes a task inside a per-worker container's
//! embedded runner.
//!
//! Container runtime primitives (image pulling, volume mounts) are out of
//! scope; this worker only implements the lifecycle contract and the
//! minimal "send payload, collect stdout/stderr" runner boundary. The
//! runner itself is pluggable via [`ContainerRunner`] so tests never spawn
//! a real process.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;

use super::{LoadGuard, StatusCell, Worker, WorkerMetrics, WorkerStatus};
use crate::domain::{Capability, Task, TaskResult};

/// The embedded-runner boundary a container worker talks to. The default
/// [`ProcessRunner`] shells out locally, standing in for "send the payload
/// into the container and collect the structured result" — the actual
/// container daemon handshake is a non-goal.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, String>;
}

pub struct ProcessRunner;

#[async_trait]
impl ContainerRunner for ProcessRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, String> {
        let fut = Command::new("sh").arg("-c").arg(command).output();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(output)) if output.status.success() => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            Ok(Ok(output)) => Err(String::from_utf8_lossy(&output.stderr).into_owned()),
            Ok(Err(e)) => Err(format!("failed to spawn container runner: {e}")),
            Err(_) => Err("container task timed out".to_string()),
        }
    }
}

pub struct ContainerWorker {
    id: String,
    capabilities: HashSet<Capability>,
    cap: usize,
    load: AtomicUsize,
    status: StatusCell,
    metrics: WorkerMetrics,
    runner: Arc<dyn ContainerRunner>,
    default_timeout: Duration,
}

impl ContainerWorker {
    pub fn new(id: impl Into<String>, runner: Arc<dyn ContainerRunner>) -> Self {
        Self {
            id: id.into(),
            capabilities: [Capability::Container, Capability::CodeExecution, Capability::ToolCall]
                .into_iter()
                .collect(),
            cap: 4,
            load: AtomicUsize::new(0),
            status: StatusCell::new(WorkerStatus::Idle),
            metrics: WorkerMetrics::default(),
            runner,
            default_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }
}

#[async_trait]
impl Worker for ContainerWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &HashSet<Capability> {
        &self.capabilities
    }

    fn status(&self) -> WorkerStatus {
        self.cached_status()
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
        self.status.set(WorkerStatus::Idle).await;
        true
    }

    async fn stop(&self) {
        self.status.set(WorkerStatus::Draining).await;
        while self.load() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.status.set(WorkerStatus::Stopped).await;
    }

    async fn health_check(&self) -> bool {
        self.status.set(WorkerStatus::Idle).await;
        true
    }

    async fn submit(&self, task: &Task) -> TaskResult {
        let _guard = LoadGuard::acquire(&self.load);
        let started = std::time::Instant::now();

        let command = task
            .payload
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("true")
            .to_string();
        let timeout = task
            .requirements
            .max_runtime_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let result = match self.runner.run(&command, timeout).await {
            Ok(stdout) => TaskResult::success(&self.id, serde_json::json!({ "stdout": stdout }), 0),
            Err(e) => TaskResult::failure(e).with_worker_id(&self.id),
        };

        let elapsed = started.elapsed().as_millis() as u64;
        self.metrics.record(result.success, elapsed);
        result.with_execution_time_ms(elapsed)
    }
}

impl ContainerWorker {
    // Cheap synchronous status snapshot for the sync `Worker::status`
    // accessor; the registry reads this far more often than it writes it.
    fn cached_status(&self) -> WorkerStatus {
        self.status.inner.try_lock().map(|g| *g).unwrap_or(WorkerStatus::Busy)
    }
}

/// A homogeneous pool of container workers supporting live resize. New
/// workers are registered only after `start` succeeds; drained workers are
/// removed only after `stop` completes.
pub struct ContainerPool {
    runner_factory: Arc<dyn Fn(&str) -> Arc<dyn ContainerRunner> + Send + Sync>,
    workers: RwLock<Vec<Arc<ContainerWorker>>>,
    max_size: usize,
}

impl ContainerPool {
    pub fn new(max_size: usize, runner_factory: Arc<dyn Fn(&str) -> Arc<dyn ContainerRunner> + Send + Sync>) -> Self {
        Self { runner_factory, workers: RwLock::new(Vec::new()), max_size }
    }

    pub async fn workers(&self) -> Vec<Arc<ContainerWorker>> {
        self.workers.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Scale the pool by `delta` (positive grows, negative shrinks), bounded
    /// by `max_size`. Returns the ids of workers added/removed.
    pub async fn resize(&self, delta: i64) -> (Vec<String>, Vec<String>) {
        if delta > 0 {
            let mut added = Vec::new();
            let mut workers = self.workers.write().await;
            for _ in 0..delta {
                if workers.len() >= self.max_size {
                    break;
                }
                let id = format!("container-{}", uuid::Uuid::now_v7());
                let runner = (self.runner_factory)(&id);
                let worker = Arc::new(ContainerWorker::new(id.clone(), runner));
                if worker.start().await {
                    added.push(id);
                    workers.push(worker);
                }
            }
            (added, Vec::new())
        } else if delta < 0 {
            let mut removed = Vec::new();
            let mut workers = self.workers.write().await;
            for _ in 0..delta.unsigned_abs() {
                if let Some(worker) = workers.pop() {
                    worker.stop().await;
                    removed.push(worker.id().to_string());
                }
            }
            (Vec::new(), removed)
        } else {
            (Vec::new(), Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskKind};

    struct FixedRunner(Result<&'static str, &'static str>);

    #[async_trait]
    impl ContainerRunner for FixedRunner {
        async fn run(&self, _command: &str, _timeout: Duration) -> Result<String, String> {
            self.0.map(|s| s.to_string()).map_err(|s| s.to_string())
        }
    }

    #[tokio::test]
    async fn test_submit_success() {
        let worker = ContainerWorker::new("c1", Arc::new(FixedRunner(Ok("hello"))));
        worker.start().await;
        let task = Task::new(TaskKind::CodeExecution, Priority::Normal);
        let result = worker.submit(&task).await;
        assert!(result.success);
        assert_eq!(result.data["stdout"], "hello");
    }

    #[tokio::test]
    async fn test_submit_failure_translated_to_result() {
        let worker = ContainerWorker::new("c1", Arc::new(FixedRunner(Err("exit 1"))));
        worker.start().await;
        let task = Task::new(TaskKind::CodeExecution, Priority::Normal);
        let result = worker.submit(&task).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap(), "exit 1");
    }

    #[tokio::test]
    async fn test_can_handle_respects_capability_and_cap() {
        let worker = ContainerWorker::new("c1", Arc::new(FixedRunner(Ok("ok")))).with_cap(1);
        worker.start().await;
        let code_task = Task::new(TaskKind::CodeExecution, Priority::Normal);
        let llm_task = Task::new(TaskKind::LlmRequest, Priority::Normal);
        assert!(worker.can_handle(&code_task));
        assert!(!worker.can_handle(&llm_task));
    }

    #[tokio::test]
    async fn test_pool_resize_up_then_down() {
        let pool = ContainerPool::new(5, Arc::new(|_id: &str| Arc::new(FixedRunner(Ok("ok"))) as Arc<dyn ContainerRunner>));
        let (added, removed) = pool.resize(2).await;
        assert_eq!(added.len(), 2);
        assert!(removed.is_empty());
        assert_eq!(pool.len().await, 2);

        let (added, removed) = pool.resize(-1).await;
        assert!(added.is_empty());
        assert_eq!(removed.len(), 1);
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_pool_resize_bounded_by_max_size() {
        let pool = ContainerPool::new(1, Arc::new(|_id: &str| Arc::new(FixedRunner(Ok("ok"))) as Arc<dyn ContainerRunner>));
        let (added, _) = pool.resize(3).await;
        assert_eq!(added.len(), 1);
        assert_eq!(pool.len().await, 1);
    }

    /// `ProcessRunner` against a real shell command that reads a scratch
    /// file, standing in for a container daemon's "send payload, collect
    /// stdout" boundary without requiring one to be running.
    #[tokio::test]
    async fn test_process_runner_reads_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.txt");
        std::fs::write(&path, "container task payload").unwrap();

        let worker = ContainerWorker::new("c1", Arc::new(ProcessRunner));
        worker.start().await;

        let mut payload = std::collections::HashMap::new();
        payload.insert("command".to_string(), serde_json::json!(format!("cat {}", path.display())));
        let task = Task::new(TaskKind::CodeExecution, Priority::Normal).with_payload(payload);

        let result = worker.submit(&task).await;
        assert!(result.success);
        assert_eq!(result.data["stdout"], "container task payload");
    }

    #[tokio::test]
    async fn test_process_runner_times_out_on_slow_command() {
        let worker = ContainerWorker::new("c1", Arc::new(ProcessRunner));
        worker.start().await;

        let mut payload = std::collections::HashMap::new();
        payload.insert("command".to_string(), serde_json::json!("sleep 5"));
        let requirements = crate::domain::TaskRequirements { max_runtime_seconds: Some(0), ..Default::default() };
        let task = Task::new(TaskKind::CodeExecution, Priority::Normal).with_payload(payload).with_requirements(requirements);

        let result = worker.submit(&task).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }
}
