//! Worker registry: lookup by id and by capability, best-worker selection,
//! and a bounded-concurrency health sweep.
//!
//! The registry's indexes are protected by a single `RwLock` held only
//! across map mutations.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::{Capability, Task};
use crate::worker::{Worker, WorkerStatus};

const HEALTH_CHECK_CONCURRENCY: usize = 8;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RegistryStatistics {
    pub total_workers: usize,
    pub by_status: HashMap<String, usize>,
    pub by_capability: HashMap<String, usize>,
}

pub struct WorkerRegistry {
    by_id: RwLock<HashMap<String, Arc<dyn Worker>>>,
    by_capability: RwLock<HashMap<Capability, Vec<String>>>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self { by_id: RwLock::new(HashMap::new()), by_capability: RwLock::new(HashMap::new()) }
    }

    /// Insert a worker; idempotent on id collision (replaces in place).
    pub async fn register(&self, worker: Arc<dyn Worker>) {
        let id = worker.id().to_string();
        debug!(worker_id = %id, "registering worker");
        let caps: Vec<Capability> = worker.capabilities().iter().copied().collect();

        let mut by_id = self.by_id.write().await;
        let mut by_capability = self.by_capability.write().await;
        by_id.insert(id.clone(), worker);
        for cap in caps {
            let list = by_capability.entry(cap).or_default();
            if !list.contains(&id) {
                list.push(id.clone());
            }
        }
    }

    /// Stops the worker and removes it from both indexes.
    pub async fn deregister(&self, id: &str) {
        info!(worker_id = %id, "deregistering worker");
        let worker = {
            let mut by_id = self.by_id.write().await;
            by_id.remove(id)
        };
        if let Some(worker) = worker {
            worker.stop().await;
        }
        let mut by_capability = self.by_capability.write().await;
        for list in by_capability.values_mut() {
            list.retain(|existing| existing != id);
        }
    }

    pub async fn by_capability(&self, cap: Capability) -> Vec<Arc<dyn Worker>> {
        let ids = self.by_capability.read().await.get(&cap).cloned().unwrap_or_default();
        let by_id = self.by_id.read().await;
        ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Worker>> {
        self.by_id.read().await.get(id).cloned()
    }

    /// Filters every registered worker by `can_handle(task)`.
    pub async fn available_for(&self, task: &Task) -> Vec<Arc<dyn Worker>> {
        let by_id = self.by_id.read().await;
        let mut matches: Vec<Arc<dyn Worker>> = by_id.values().filter(|w| w.can_handle(task)).cloned().collect();
        matches.sort_by(|a, b| a.id().cmp(b.id()));
        matches
    }

    /// Among available workers, prefer lowest current load; tie-break by
    /// cheapest `cost_per_1k_tokens` when present, else by worker id.
    pub async fn best_for(&self, task: &Task) -> Option<Arc<dyn Worker>> {
        let mut candidates = self.available_for(task).await;
        candidates.sort_by(|a, b| {
            a.load()
                .cmp(&b.load())
                .then_with(|| match (a.cost_per_1k_tokens(), b.cost_per_1k_tokens()) {
                    (Some(ac), Some(bc)) => ac.partial_cmp(&bc).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.id().cmp(b.id()))
        });
        candidates.into_iter().next()
    }

    /// Invokes every worker's `health_check` concurrently, bounded by a
    /// semaphore so a large fleet cannot spike outbound connections.
    pub async fn health_check_all(&self) {
        let workers: Vec<Arc<dyn Worker>> = self.by_id.read().await.values().cloned().collect();
        let semaphore = Arc::new(Semaphore::new(HEALTH_CHECK_CONCURRENCY));
        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let permit = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                let healthy = worker.health_check().await;
                if !healthy {
                    warn!(worker_id = %worker.id(), "worker failed health check");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub async fn statistics(&self) -> RegistryStatistics {
        let by_id = self.by_id.read().await;
        let mut stats = RegistryStatistics { total_workers: by_id.len(), ..Default::default() };
        for worker in by_id.values() {
            let status_key = format!("{:?}", worker.status()).to_lowercase();
            *stats.by_status.entry(status_key).or_insert(0) += 1;
            for cap in worker.capabilities() {
                *stats.by_capability.entry(cap.to_string()).or_insert(0) += 1;
            }
        }
        stats
    }

    pub async fn available_worker_count(&self) -> usize {
        self.by_id.read().await.values().filter(|w| w.status() == WorkerStatus::Idle).count()
    }

    pub async fn all_workers(&self) -> Vec<Arc<dyn Worker>> {
        self.by_id.read().await.values().cloned().collect()
    }
}
