//! Task router: kind-to-capability routing policy, dependency analysis, and
//! the three execution entry points the scheduler and orchestrator call
//! through (`run`, `run_parallel`, `run_with_retry`).

pub mod dag;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::{Task, TaskResult};
use crate::error::OrchestratorError;
use crate::registry::WorkerRegistry;

pub struct TaskRouter {
    registry: Arc<WorkerRegistry>,
    completed: Mutex<HashSet<String>>,
}

impl TaskRouter {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry, completed: Mutex::new(HashSet::new()) }
    }

    /// Registry best-fit selection for every kind; `prefers_first_available`
    /// kinds get the first capable worker instead of the load/cost-ranked
    /// pick, per the routing policy table.
    pub async fn route(&self, task: &Task) -> Option<Arc<dyn crate::worker::Worker>> {
        if task.kind.prefers_first_available() {
            self.registry.available_for(task).await.into_iter().next()
        } else {
            self.registry.best_for(task).await
        }
    }

    pub async fn is_completed(&self, task_id: &str) -> bool {
        self.completed.lock().await.contains(task_id)
    }

    /// A snapshot of every task id this router has marked completed, used by
    /// the scheduler to decide readiness without duplicating the set.
    pub async fn completed_snapshot(&self) -> HashSet<String> {
        self.completed.lock().await.clone()
    }

    async fn mark_completed(&self, task_id: &str) {
        self.completed.lock().await.insert(task_id.to_string());
    }

    /// Routes, submits, and on success marks the task id completed. A
    /// routing failure (no capable worker) is reported as a failed result
    /// without ever calling a worker.
    pub async fn run(&self, task: &Task) -> TaskResult {
        let Some(worker) = self.route(task).await else {
            warn!(task_id = %task.id, kind = %task.kind, "no capable worker available");
            return OrchestratorError::Routing(format!("no worker available for kind {}", task.kind)).into_result();
        };

        debug!(task_id = %task.id, worker_id = %worker.id(), "dispatching task");
        let result = worker.submit(task).await;
        if result.success {
            self.mark_completed(&task.id).await;
        }
        result
    }

    /// Groups `tasks` into dependency levels and runs each level with up to
    /// `max_concurrent` tasks in flight, preserving the input order in the
    /// returned results. On a dependency cycle, every task fails with a
    /// "circular dependency" error and no worker is ever invoked.
    pub async fn run_parallel(&self, tasks: &[Task], max_concurrent: usize) -> Vec<TaskResult> {
        let levels = match dag::dependency_levels(tasks) {
            Ok(levels) => levels,
            Err(cycle) => {
                warn!(cycle = ?cycle, "circular dependency detected in batch");
                let reason = format!("circular dependency detected: {}", cycle.join(" -> "));
                return tasks.iter().map(|_| OrchestratorError::Dependency(reason.clone()).into_result()).collect();
            }
        };

        let mut results: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        for level in levels {
            let succeeded = self.completed_snapshot().await;
            let mut handles = Vec::with_capacity(level.len());
            for idx in level {
                let task = &tasks[idx];
                if !task.is_ready(&succeeded) {
                    warn!(task_id = %task.id, "dependency failed, skipping dispatch");
                    let reason = format!("upstream dependency failed for task {}", task.id);
                    results[idx] = Some(OrchestratorError::Dependency(reason).into_result());
                    continue;
                }
                let task = task.clone();
                let permit = semaphore.clone();
                let registry = self.registry.clone();
                handles.push((idx, tokio::spawn(async move {
                    let _permit = permit.acquire().await;
                    let router = TaskRouter { registry, completed: Mutex::new(HashSet::new()) };
                    router.run(&task).await
                })));
            }
            for (idx, handle) in handles {
                let result = handle.await.unwrap_or_else(|e| OrchestratorError::Worker(format!("task join error: {e}")).into_result());
                if result.success {
                    self.mark_completed(&tasks[idx].id).await;
                }
                results[idx] = Some(result);
            }
        }

        results.into_iter().map(|r| r.expect("every index is visited by some level")).collect()
    }

    /// Attempts up to `retries + 1` times, sleeping `base_delay * 2^attempt`
    /// between attempts. The final failure carries the last error string.
    pub async fn run_with_retry(&self, task: &Task, retries: u32) -> TaskResult {
        let mut attempt = 0;
        loop {
            let result = self.run(task).await;
            if result.success || attempt >= retries {
                if !result.success {
                    info!(task_id = %task.id, attempt, "giving up after exhausting retries");
                }
                return result;
            }
            let delay = task.backoff_delay(attempt);
            debug!(task_id = %task.id, attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
