//! Aggregate orchestrator-wide counters, updated only from the scheduler
//! loop and worker-completion paths.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_execution_time_ms: f64,
    pub active_count: usize,
    pub queued_count: usize,
}

#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    total_execution_time_ms: AtomicU64,
    active_count: AtomicUsize,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_active_delta(&self, delta: i64) {
        if delta >= 0 {
            self.active_count.fetch_add(delta as usize, Ordering::Relaxed);
        } else {
            self.active_count.fetch_sub(delta.unsigned_abs() as usize, Ordering::Relaxed);
        }
    }

    pub fn record_completion(&self, success: bool, execution_time_ms: u64) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_execution_time_ms.fetch_add(execution_time_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued_count: usize) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let finished = completed + failed;
        let average_execution_time_ms = if finished == 0 {
            0.0
        } else {
            self.total_execution_time_ms.load(Ordering::Relaxed) as f64 / finished as f64
        };
        MetricsSnapshot {
            tasks_submitted: self.submitted.load(Ordering::Relaxed),
            tasks_completed: completed,
            tasks_failed: failed,
            average_execution_time_ms,
            active_count: self.active_count.load(Ordering::Relaxed),
            queued_count,
        }
    }
}
