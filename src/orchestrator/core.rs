//! Core orchestrator: worker-pool bootstrap, the submit/batch surface, the
//! background scheduler and health/auto-scale loops, and lifecycle
//! management.
//!
//! The two background loops follow the teacher's `LoopManager::run` shape:
//! a `tokio::select!` over a cadence-driven `interval` and a `watch`
//! shutdown signal, spawned from `start()` and joined (with a bounded
//! graceful-drain window, then `JoinHandle::abort`) from `stop()`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::hooks::OrchestratorHooks;
use super::history::TaskHistory;
use super::metrics::{MetricsSnapshot, OrchestratorMetrics};
use crate::config::OrchestratorConfig;
use crate::domain::{Capability, ParallelBatch, Priority, Task, TaskKind, TaskResult};
use crate::error::OrchestratorError;
use crate::registry::{RegistryStatistics, WorkerRegistry};
use crate::resources::{ApiQuota, QuotaTracker, ResourceManager, ResourceStats};
use crate::router::TaskRouter;
use crate::scheduler::SmartScheduler;
use crate::worker::{
    CloudLlmClient, CloudLlmWorker, ContainerPool, ContainerRunner, HttpCloudLlmClient, HttpLocalLlmClient,
    LocalLlmWorker, ProcessRunner, RemoteWorker, Worker,
};

/// A failure string is retryable unless it carries one of the non-retryable
/// error taxonomy's prefixes. `TaskResult` only ever carries the rendered
/// error string past the worker boundary, so this is the orchestrator's
/// only way to recover the retry-worthiness `OrchestratorError::is_retryable`
/// already decided at the point the error was created.
fn is_retryable_failure(error: &str) -> bool {
    !(error.starts_with("routing error:")
        || error.starts_with("validation error:")
        || error.starts_with("dependency error:")
        || error.starts_with("cancelled:")
        || error.contains("circular dependency"))
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub metrics: MetricsSnapshot,
    pub registry: RegistryStatistics,
    pub resources: ResourceStats,
}

struct LoopHandles {
    scheduler: Option<JoinHandle<()>>,
    health: Option<JoinHandle<()>>,
}

/// Bootstraps and owns every subsystem: the worker registry, the resource
/// manager, the router, the ready-queue scheduler, task history, metrics,
/// and the optional container pool. Always held behind an `Arc` so the two
/// background loops can hold their own clone.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<WorkerRegistry>,
    resources: Arc<ResourceManager>,
    router: Arc<TaskRouter>,
    scheduler: Arc<SmartScheduler>,
    history: Arc<TaskHistory>,
    metrics: Arc<OrchestratorMetrics>,
    hooks: RwLock<OrchestratorHooks>,
    container_pool: RwLock<Option<Arc<ContainerPool>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    loops: Mutex<LoopHandles>,
    stopped: AtomicBool,
}

impl Orchestrator {
    /// Constructs every subsystem but starts no background loop and
    /// registers no worker; call [`Orchestrator::start`] to do both.
    pub fn new(config: OrchestratorConfig) -> Arc<Self> {
        let registry = Arc::new(WorkerRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            router: Arc::new(TaskRouter::new(registry.clone())),
            registry,
            resources: Arc::new(ResourceManager::new()),
            scheduler: Arc::new(SmartScheduler::new()),
            history: Arc::new(TaskHistory::new()),
            metrics: Arc::new(OrchestratorMetrics::new()),
            hooks: RwLock::new(OrchestratorHooks::default()),
            container_pool: RwLock::new(None),
            shutdown_tx,
            shutdown_rx,
            loops: Mutex::new(LoopHandles { scheduler: None, health: None }),
            stopped: AtomicBool::new(false),
            config,
        })
    }

    /// Bootstraps the configured container pool and spawns the background
    /// scheduler and health/auto-scale loops. Idempotent: calling twice is
    /// a no-op on the second call.
    pub async fn start(self: &Arc<Self>) {
        if self.loops.lock().await.scheduler.is_some() {
            warn!("start called on an already-started orchestrator");
            return;
        }

        let factory: Arc<dyn Fn(&str) -> Arc<dyn ContainerRunner> + Send + Sync> = Arc::new(|_id: &str| Arc::new(ProcessRunner) as Arc<dyn ContainerRunner>);
        let pool = Arc::new(ContainerPool::new(self.config.container.max_pool_size, factory));
        pool.resize(self.config.container.pool_size as i64).await;
        for worker in pool.workers().await {
            self.registry.register(worker as Arc<dyn Worker>).await;
        }
        *self.container_pool.write().await = Some(pool);

        info!(
            max_concurrent_tasks = self.config.concurrency.max_concurrent_tasks,
            pool_size = self.config.container.pool_size,
            "orchestrator starting"
        );

        let scheduler_loop = {
            let this = self.clone();
            let mut shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move { this.scheduler_loop(&mut shutdown).await })
        };
        let health_loop = {
            let this = self.clone();
            let mut shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move { this.health_loop(&mut shutdown).await })
        };

        let mut loops = self.loops.lock().await;
        loops.scheduler = Some(scheduler_loop);
        loops.health = Some(health_loop);
    }

    /// Submits one task onto the scheduler. When `wait` is false this
    /// returns as soon as the task is enqueued; the caller observes
    /// completion through [`Orchestrator::task_history`] or a completion
    /// hook. When `wait` is true, polls history until the task reaches a
    /// terminal status and returns its stored result.
    pub async fn submit(&self, task: Task, wait: bool) -> Option<TaskResult> {
        let task_id = task.id.clone();
        self.history.insert(task.clone()).await;
        self.metrics.record_submitted();
        self.metrics.record_active_delta(1);
        self.scheduler.enqueue(task).await;

        if !wait {
            return None;
        }
        self.wait_for_result(&task_id).await
    }

    /// Polls history until `task_id` reaches a terminal status, then
    /// returns its stored result.
    async fn wait_for_result(&self, task_id: &str) -> Option<TaskResult> {
        loop {
            let stored = self.history.get(task_id).await?;
            if stored.status.is_terminal() {
                return stored.result;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Submits a batch of tasks sharing dependencies on each other. When
    /// `wait` is true, runs the whole batch to completion immediately via
    /// the router's dependency-level parallel executor (bypassing the
    /// background scheduler entirely) and returns every result; otherwise
    /// enqueues every task onto the scheduler and returns immediately.
    pub async fn submit_batch(&self, batch: ParallelBatch, wait: bool) -> Vec<TaskResult> {
        for task in &batch.tasks {
            self.history.insert(task.clone()).await;
            self.metrics.record_submitted();
        }
        self.metrics.record_active_delta(batch.tasks.len() as i64);

        if !wait {
            self.scheduler.enqueue_batch(batch.tasks).await;
            return Vec::new();
        }

        for task in &batch.tasks {
            self.resources.reservations.allocate(&task.id, task.requirements.cpu_cores, task.requirements.memory_mb, task.requirements.gpu);
        }
        let results = self.router.run_parallel(&batch.tasks, self.config.concurrency.max_concurrent_tasks).await;
        for (task, result) in batch.tasks.into_iter().zip(results.iter()) {
            self.resources.reservations.release(&task.id);
            self.finish_task(task, result.clone()).await;
        }
        results
    }

    /// Convenience wrapper: builds an `LlmRequest` (or `LocalLlmRequest`, if
    /// `local` is set) task from a bare prompt, submits it, and blocks until
    /// it completes.
    pub async fn execute_llm_request(&self, prompt: impl Into<String>, local: bool, priority: Priority) -> TaskResult {
        let kind = if local { TaskKind::LocalLlmRequest } else { TaskKind::LlmRequest };
        let mut payload = std::collections::HashMap::new();
        payload.insert("prompt".to_string(), serde_json::Value::String(prompt.into()));
        let task = Task::new(kind, priority).with_payload(payload);
        self.submit(task, true).await.expect("submit(wait = true) always yields a result")
    }

    /// Convenience wrapper: builds a `ToolCall` task carrying a shell
    /// `command` string, submits it, and blocks until it completes.
    pub async fn execute_tool_call(&self, command: impl Into<String>, priority: Priority) -> TaskResult {
        let mut payload = std::collections::HashMap::new();
        payload.insert("command".to_string(), serde_json::Value::String(command.into()));
        let task = Task::new(TaskKind::ToolCall, priority).with_payload(payload);
        self.submit(task, true).await.expect("submit(wait = true) always yields a result")
    }

    /// Registers a cloud-LLM-API worker, wiring one shared quota tracker
    /// between the worker's own `submit` checks and the pool's
    /// quota-filtered `select`.
    pub async fn register_llm_api(
        &self,
        api_type: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        quota: ApiQuota,
        cost_per_1k_tokens: f64,
    ) -> Arc<CloudLlmWorker> {
        let api_type = api_type.into();
        let id = format!("cloud-llm-{}", uuid::Uuid::now_v7());
        let client: Arc<dyn CloudLlmClient> = Arc::new(HttpCloudLlmClient::new(base_url.into(), api_key.into()));
        let tracker = Arc::new(QuotaTracker::new(quota));
        let worker = Arc::new(CloudLlmWorker::new(id, api_type, client, tracker.clone(), cost_per_1k_tokens));
        worker.start().await;
        self.registry.register(worker.clone() as Arc<dyn Worker>).await;
        self.resources.cloud_llm.register(worker.clone(), tracker).await;
        worker
    }

    /// Registers a local-LLM worker against the configured base URL.
    /// Registers an already-constructed worker of any variant directly,
    /// for callers (and tests) that built one outside the three typed
    /// convenience registrars above.
    pub async fn register_worker(&self, worker: Arc<dyn Worker>) {
        worker.start().await;
        self.registry.register(worker).await;
    }

    pub async fn register_local_llm(&self) -> Arc<LocalLlmWorker> {
        let id = format!("local-llm-{}", uuid::Uuid::now_v7());
        let client = Arc::new(HttpLocalLlmClient::new(self.config.local_llm.base_url.clone()));
        let worker = Arc::new(LocalLlmWorker::new(id, client).with_cap(self.config.local_llm.concurrency_cap));
        worker.start().await;
        self.registry.register(worker.clone() as Arc<dyn Worker>).await;
        worker
    }

    /// Registers an out-of-process worker node reachable over HTTP.
    pub async fn register_remote_worker(&self, url: impl Into<String>, auth_token: Option<String>, capabilities: HashSet<Capability>) -> Arc<RemoteWorker> {
        let id = format!("remote-{}", uuid::Uuid::now_v7());
        let worker = Arc::new(RemoteWorker::new(id, url, auth_token, capabilities).with_cap(self.config.remote.default_cap));
        worker.start().await;
        self.registry.register(worker.clone() as Arc<dyn Worker>).await;
        worker
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let local_llm_workers = self.registry.by_capability(Capability::LocalLlm).await.len();
        OrchestratorStatus {
            metrics: self.metrics.snapshot(self.scheduler.len().await),
            registry: self.registry.statistics().await,
            resources: self.resources.stats(local_llm_workers).await,
        }
    }

    pub fn task_history(&self) -> Arc<TaskHistory> {
        self.history.clone()
    }

    pub async fn set_hooks(&self, hooks: OrchestratorHooks) {
        *self.hooks.write().await = hooks;
    }

    /// Signals both background loops to stop, waits up to
    /// `task_timeout_seconds` for them to drain, then aborts any stragglers
    /// and stops every registered worker. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        info!("orchestrator stopping");
        let _ = self.shutdown_tx.send(true);

        let drain_window = Duration::from_secs(self.config.concurrency.task_timeout_seconds.min(30));
        let mut loops = self.loops.lock().await;
        if let Some(handle) = loops.scheduler.take() {
            if tokio::time::timeout(drain_window, handle).await.is_err() {
                warn!("scheduler loop did not drain in time, continuing shutdown");
            }
        }
        if let Some(handle) = loops.health.take() {
            handle.abort();
        }
        drop(loops);

        for worker in self.registry.all_workers().await {
            worker.stop().await;
        }
        info!("orchestrator stopped");
    }

    async fn scheduler_loop(self: Arc<Self>, shutdown: &mut watch::Receiver<bool>) {
        // A configured tick of zero means "as fast as practical" rather than
        // a full second, so tests (and latency-sensitive deployments) are
        // not forced onto a whole-second cadence.
        let tick_period = if self.config.concurrency.scheduler_tick_secs == 0 {
            Duration::from_millis(50)
        } else {
            Duration::from_secs(self.config.concurrency.scheduler_tick_secs)
        };
        let mut ticker = tokio::time::interval(tick_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.scheduler_tick().await,
                _ = shutdown.changed() => {
                    debug!("scheduler loop received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn scheduler_tick(self: &Arc<Self>) {
        let failed = self.history.failed_ids().await;
        for blocked in self.scheduler.drain_dependency_failed(&failed).await {
            let reason = format!("upstream dependency failed for task {}", blocked.id);
            let result = OrchestratorError::Dependency(reason).into_result();
            self.finish_task(blocked, result).await;
        }

        let completed = self.router.completed_snapshot().await;
        let batch = self.scheduler.next_batch(self.config.concurrency.max_concurrent_tasks, &completed).await;
        for task in batch {
            let this = self.clone();
            tokio::spawn(async move { this.dispatch(task).await });
        }
    }

    /// Runs one task through the router and, on a retryable failure,
    /// sleeps the backoff delay before re-enqueuing it; on success or a
    /// terminal failure, records the outcome in history/metrics and fires
    /// hooks. Spawned per-dispatch so a single slow task never blocks the
    /// scheduler tick from picking up the rest of the batch.
    async fn dispatch(self: Arc<Self>, mut task: Task) {
        task.mark_running();
        self.history.update(task.clone()).await;
        self.resources.reservations.allocate(
            &task.id,
            task.requirements.cpu_cores,
            task.requirements.memory_mb,
            task.requirements.gpu,
        );

        let result = self.router.run(&task).await;
        let hooks = self.hooks.read().await.clone();

        if result.success {
            self.resources.reservations.release(&task.id);
            task.mark_completed(result.clone());
            self.history.update(task.clone()).await;
            hooks.fire(&task, &result);
            self.metrics.record_completion(true, result.execution_time_ms);
            self.metrics.record_active_delta(-1);
            return;
        }

        let retryable = is_retryable_failure(result.error.as_deref().unwrap_or(""));
        let will_retry = task.mark_failed(result.clone(), retryable);
        self.history.update(task.clone()).await;

        if will_retry {
            let delay = task.backoff_delay(task.retry_count.saturating_sub(1));
            debug!(task_id = %task.id, retry_count = task.retry_count, delay_ms = delay.as_millis() as u64, "requeuing after backoff");
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                scheduler.enqueue(task).await;
            });
        } else {
            self.resources.reservations.release(&task.id);
            hooks.fire(&task, &result);
            self.metrics.record_completion(false, result.execution_time_ms);
            self.metrics.record_active_delta(-1);
        }
    }

    /// Applies a terminal result to a task that bypassed the dispatch path
    /// (dependency-blocked tasks, and the `submit_batch(wait = true)` path).
    async fn finish_task(&self, mut task: Task, result: TaskResult) {
        let success = result.success;
        let exec_ms = result.execution_time_ms;
        if success {
            task.mark_completed(result.clone());
        } else {
            task.mark_failed(result.clone(), false);
        }
        self.history.update(task.clone()).await;
        self.hooks.read().await.fire(&task, &result);
        self.metrics.record_completion(success, exec_ms);
        self.metrics.record_active_delta(-1);
    }

    async fn health_loop(self: Arc<Self>, shutdown: &mut watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.health.health_check_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.registry.health_check_all().await;
                    self.maybe_auto_scale().await;
                }
                _ = shutdown.changed() => {
                    debug!("health loop received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Scales the container pool up by one worker when the queue is deeper
    /// than `available_workers * auto_scale_queue_multiplier`. There is no
    /// scale-down path: shrinking a live pool is left as an operator
    /// decision, not an automatic one.
    async fn maybe_auto_scale(&self) {
        if !self.config.container.auto_scale {
            return;
        }
        let Some(pool) = self.container_pool.read().await.clone() else {
            return;
        };

        let queue_size = self.scheduler.len().await;
        let available = self.registry.available_worker_count().await.max(1);
        if queue_size > available * self.config.health.auto_scale_queue_multiplier {
            let (added, _) = pool.resize(1).await;
            for worker in pool.workers().await {
                if added.contains(&worker.id().to_string()) {
                    info!(worker_id = %worker.id(), queue_size, available, "auto-scaled container pool up");
                    self.registry.register(worker.clone() as Arc<dyn Worker>).await;
                }
            }
        }
    }
}
