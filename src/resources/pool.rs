//! Cloud-LLM pool: workers paired with their quota tracker, with
//! cost-preferring selection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::quota::{ApiQuota, QuotaTracker};
use crate::worker::{CloudLlmWorker, Worker, WorkerStatus};

struct PoolEntry {
    worker: Arc<CloudLlmWorker>,
    quota: Arc<QuotaTracker>,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct UsageSummary {
    pub per_worker: HashMap<String, WorkerUsage>,
    pub total_requests_today: u64,
    pub total_tokens_today: u64,
    pub total_cost_today: f64,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct WorkerUsage {
    pub requests_today: u32,
    pub tokens_today: u64,
    pub cost_today: f64,
}

#[derive(Default)]
pub struct CloudLlmPool {
    entries: RwLock<HashMap<String, PoolEntry>>,
}

impl CloudLlmPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// `quota` must be the same tracker handed to the worker at
    /// construction, so the pool's quota-filtered `select` and the worker's
    /// own `check_quota`/`record_usage` agree on one counter.
    pub async fn register(&self, worker: Arc<CloudLlmWorker>, quota: Arc<QuotaTracker>) {
        debug!(worker_id = %worker.id(), "registering cloud llm worker");
        self.entries.write().await.insert(worker.id().to_string(), PoolEntry { worker, quota });
    }

    pub async fn deregister(&self, id: &str) {
        if let Some(entry) = self.entries.write().await.remove(id) {
            entry.worker.stop().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Scans workers matching `api_type` (or all, if `None`), filters by
    /// quota-ok and availability, then sorts by cost (or load, if cost
    /// preference is off).
    pub async fn select(&self, api_type: Option<&str>, prefer_low_cost: bool) -> Option<Arc<CloudLlmWorker>> {
        let entries = self.entries.read().await;
        let mut candidates: Vec<&PoolEntry> = entries
            .values()
            .filter(|e| api_type.is_none_or(|t| e.worker.api_type() == t))
            .filter(|e| e.worker.status() == WorkerStatus::Idle && e.worker.load() < e.worker.cap())
            .filter(|e| e.quota.check_quota().is_ok())
            .collect();

        if prefer_low_cost {
            candidates.sort_by(|a, b| {
                a.worker
                    .cost_per_1k_tokens()
                    .partial_cmp(&b.worker.cost_per_1k_tokens())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.worker.id().cmp(b.worker.id()))
            });
        } else {
            candidates.sort_by(|a, b| a.worker.load().cmp(&b.worker.load()).then_with(|| a.worker.id().cmp(b.worker.id())));
        }

        candidates.first().map(|e| e.worker.clone())
    }

    pub async fn usage_summary(&self) -> UsageSummary {
        let entries = self.entries.read().await;
        let mut summary = UsageSummary::default();
        for (id, entry) in entries.iter() {
            let (requests, tokens, cost) = entry.quota.usage_today();
            summary.total_requests_today += requests as u64;
            summary.total_tokens_today += tokens;
            summary.total_cost_today += cost;
            summary.per_worker.insert(id.clone(), WorkerUsage { requests_today: requests, tokens_today: tokens, cost_today: cost });
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::worker::CloudLlmClient;

    struct NoopClient;

    #[async_trait]
    impl CloudLlmClient for NoopClient {
        async fn complete(&self, _prompt: &str) -> Result<(String, u64), String> {
            Ok(("ok".into(), 1))
        }
    }

    fn make_worker(id: &str, api_type: &str, cost: f64) -> (Arc<CloudLlmWorker>, Arc<QuotaTracker>) {
        let quota = Arc::new(QuotaTracker::new(ApiQuota::default()));
        let worker = Arc::new(CloudLlmWorker::new(id, api_type, Arc::new(NoopClient), quota.clone(), cost));
        (worker, quota)
    }

    #[tokio::test]
    async fn test_select_prefers_lowest_cost() {
        let pool = CloudLlmPool::new();
        let (cheap, cheap_quota) = make_worker("cheap", "anthropic", 0.001);
        let (expensive, expensive_quota) = make_worker("expensive", "anthropic", 0.01);
        cheap.start().await;
        expensive.start().await;
        pool.register(cheap, cheap_quota).await;
        pool.register(expensive, expensive_quota).await;

        let chosen = pool.select(Some("anthropic"), true).await.unwrap();
        assert_eq!(chosen.id(), "cheap");
    }

    #[tokio::test]
    async fn test_select_filters_by_api_type() {
        let pool = CloudLlmPool::new();
        let (anthropic, anthropic_quota) = make_worker("a1", "anthropic", 0.01);
        let (openai, openai_quota) = make_worker("o1", "openai", 0.01);
        anthropic.start().await;
        openai.start().await;
        pool.register(anthropic, anthropic_quota).await;
        pool.register(openai, openai_quota).await;

        let chosen = pool.select(Some("openai"), true).await.unwrap();
        assert_eq!(chosen.id(), "o1");
    }

    #[tokio::test]
    async fn test_select_none_when_quota_exhausted() {
        let pool = CloudLlmPool::new();
        let quota = Arc::new(QuotaTracker::new(ApiQuota::default().with_requests_per_minute(0)));
        let worker = Arc::new(CloudLlmWorker::new("w1", "anthropic", Arc::new(NoopClient), quota.clone(), 0.01));
        worker.start().await;
        pool.register(worker, quota).await;
        assert!(pool.select(Some("anthropic"), true).await.is_none());
    }
}
