//! Smart scheduler: a priority-ordered, dependency-gated ready queue.
//!
//! Holds queued tasks in a `BinaryHeap<QueueEntry>` guarded by a single
//! `tokio::sync::Mutex`, held only briefly on enqueue/dispense — the same
//! locking shape as the teacher's `Scheduler::inner`.

use std::collections::{BinaryHeap, HashSet};

use tokio::sync::Mutex;
use tracing::debug;

use super::queue::{QueueEntry, SchedulerStats};
use crate::domain::Task;

pub struct SmartScheduler {
    queue: Mutex<BinaryHeap<QueueEntry>>,
    stats: Mutex<SchedulerStats>,
}

impl Default for SmartScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SmartScheduler {
    pub fn new() -> Self {
        Self { queue: Mutex::new(BinaryHeap::new()), stats: Mutex::new(SchedulerStats::default()) }
    }

    pub async fn enqueue(&self, mut task: Task) {
        task.mark_queued();
        debug!(task_id = %task.id, priority = %task.priority, "enqueuing task");
        let mut queue = self.queue.lock().await;
        queue.push(QueueEntry::new(task));
        let mut stats = self.stats.lock().await;
        stats.total_enqueued += 1;
        stats.peak_queue_depth = stats.peak_queue_depth.max(queue.len());
    }

    pub async fn enqueue_batch(&self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            self.enqueue(task).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Scans the queue in priority order and selects up to `max_size` tasks
    /// whose dependencies are all present in `completed`. Selected tasks are
    /// removed from the queue; everything else is pushed back unchanged.
    pub async fn next_batch(&self, max_size: usize, completed: &HashSet<String>) -> Vec<Task> {
        let mut queue = self.queue.lock().await;
        let mut drained = Vec::with_capacity(queue.len());
        while let Some(entry) = queue.pop() {
            drained.push(entry);
        }

        let mut selected = Vec::with_capacity(max_size.min(drained.len()));
        let mut remaining = Vec::with_capacity(drained.len());
        for entry in drained {
            if selected.len() < max_size && entry.task.is_ready(completed) {
                selected.push(entry.task);
            } else {
                remaining.push(entry);
            }
        }

        for entry in remaining {
            queue.push(entry);
        }

        if !selected.is_empty() {
            let mut stats = self.stats.lock().await;
            stats.total_dispensed += selected.len() as u64;
        }
        selected
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.lock().await.clone()
    }

    /// Removes queued tasks whose dependency set intersects `failed`, so the
    /// orchestrator can fail them terminally instead of leaving them queued
    /// forever behind a dependency that will never complete.
    pub async fn drain_dependency_failed(&self, failed: &HashSet<String>) -> Vec<Task> {
        if failed.is_empty() {
            return Vec::new();
        }
        let mut queue = self.queue.lock().await;
        let mut drained = Vec::with_capacity(queue.len());
        while let Some(entry) = queue.pop() {
            drained.push(entry);
        }

        let mut blocked = Vec::new();
        for entry in drained {
            if entry.task.depends_on.iter().any(|dep| failed.contains(dep)) {
                blocked.push(entry.task);
            } else {
                queue.push(entry);
            }
        }
        blocked
    }
}
