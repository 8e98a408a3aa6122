//! Cloud-LLM-API worker: wraps a remote provider endpoint.
//!
//! Before every call it consults the resource manager's quota tracker; on
//! exhaustion it fails with a `RATE_LIMITED`-flavored error and its status
//! transitions momentarily to `Draining`, then back to `Idle` once the
//! caller retries after the window rolls over. Wire-protocol details
//! (OpenAI/Anthropic request shapes) are a non-goal — only the minimal
//! "send prompt, get completion + tokens + cost" contract is implemented.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LoadGuard, StatusCell, Worker, WorkerMetrics, WorkerStatus};
use crate::domain::{Capability, Task, TaskResult};
use crate::resources::quota::QuotaTracker;

#[async_trait]
pub trait CloudLlmClient: Send + Sync {
    /// Returns (completion text, tokens consumed).
    async fn complete(&self, prompt: &str) -> Result<(String, u64), String>;
}

pub struct HttpCloudLlmClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpCloudLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: api_key.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl CloudLlmClient for HttpCloudLlmClient {
    async fn complete(&self, prompt: &str) -> Result<(String, u64), String> {
        let resp = self
            .client
            .post(format!("{}/v1/complete", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("cloud llm endpoint returned {}", resp.status()));
        }
        let body: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
        let text = body.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let tokens = body.get("tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok((text, tokens))
    }
}

pub struct CloudLlmWorker {
    id: String,
    api_type: String,
    capabilities: HashSet<Capability>,
    cap: usize,
    load: AtomicUsize,
    status: StatusCell,
    metrics: WorkerMetrics,
    client: Arc<dyn CloudLlmClient>,
    quota: Arc<QuotaTracker>,
    cost_per_1k_tokens: f64,
}

impl CloudLlmWorker {
    pub fn new(
        id: impl Into<String>,
        api_type: impl Into<String>,
        client: Arc<dyn CloudLlmClient>,
        quota: Arc<QuotaTracker>,
        cost_per_1k_tokens: f64,
    ) -> Self {
        Self {
            id: id.into(),
            api_type: api_type.into(),
            capabilities: [Capability::LlmInference].into_iter().collect(),
            cap: 10,
            load: AtomicUsize::new(0),
            status: StatusCell::new(WorkerStatus::Idle),
            metrics: WorkerMetrics::default(),
            client,
            quota,
            cost_per_1k_tokens,
        }
    }

    pub fn api_type(&self) -> &str {
        &self.api_type
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    fn cached_status(&self) -> WorkerStatus {
        self.status.inner.try_lock().map(|g| *g).unwrap_or(WorkerStatus::Busy)
    }
}

#[async_trait]
impl Worker for CloudLlmWorker {
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

    fn cost_per_1k_tokens(&self) -> Option<f64> {
        Some(self.cost_per_1k_tokens)
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
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
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

        if let Err(reason) = self.quota.check_quota() {
            self.status.set(WorkerStatus::Draining).await;
            self.status.set(WorkerStatus::Idle).await;
            let elapsed = started.elapsed().as_millis() as u64;
            self.metrics.record(false, elapsed);
            return TaskResult::failure(reason).with_worker_id(&self.id).with_execution_time_ms(elapsed);
        }

        let prompt = task.payload.get("prompt").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let result = match self.client.complete(&prompt).await {
            Ok((text, tokens)) => {
                let cost = (tokens as f64 / 1000.0) * self.cost_per_1k_tokens;
                self.quota.record_usage(tokens, cost);
                TaskResult::success(&self.id, serde_json::json!({ "completion": text }), 0)
                    .with_metric("tokens", serde_json::json!(tokens))
                    .with_metric("cost", serde_json::json!(cost))
            }
            Err(e) => TaskResult::failure(e).with_worker_id(&self.id),
        };

        let elapsed = started.elapsed().as_millis() as u64;
        self.metrics.record(result.success, elapsed);
        result.with_execution_time_ms(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskKind};
    use crate::resources::quota::ApiQuota;

    struct FixedClient(Result<(&'static str, u64), &'static str>);

    #[async_trait]
    impl CloudLlmClient for FixedClient {
        async fn complete(&self, _prompt: &str) -> Result<(String, u64), String> {
            self.0.map(|(s, t)| (s.to_string(), t)).map_err(|s| s.to_string())
        }
    }

    #[tokio::test]
    async fn test_submit_records_tokens_and_cost() {
        let quota = Arc::new(QuotaTracker::new(ApiQuota::default()));
        let worker = CloudLlmWorker::new("c1", "anthropic", Arc::new(FixedClient(Ok(("hi", 100)))), quota, 0.01);
        worker.start().await;
        let task = Task::new(TaskKind::LlmRequest, Priority::Normal);
        let result = worker.submit(&task).await;
        assert!(result.success);
        assert_eq!(result.metrics["tokens"], serde_json::json!(100));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_fails_without_calling_client() {
        let quota = Arc::new(QuotaTracker::new(ApiQuota::default().with_requests_per_minute(2)));
        let worker = CloudLlmWorker::new("c1", "anthropic", Arc::new(FixedClient(Ok(("hi", 1)))), quota, 0.01);
        worker.start().await;
        let task = Task::new(TaskKind::LlmRequest, Priority::Normal);
        assert!(worker.submit(&task).await.success);
        assert!(worker.submit(&task).await.success);
        let third = worker.submit(&task).await;
        assert!(!third.success);
        assert!(third.error.unwrap().to_lowercase().contains("minute request limit"));
    }

    #[tokio::test]
    async fn test_worker_recovers_to_idle_after_quota_denial() {
        let quota = Arc::new(QuotaTracker::new(ApiQuota::default().with_requests_per_minute(1)));
        let worker = CloudLlmWorker::new("c1", "anthropic", Arc::new(FixedClient(Ok(("hi", 1)))), quota, 0.01);
        worker.start().await;
        let task = Task::new(TaskKind::LlmRequest, Priority::Normal);
        worker.submit(&task).await;
        worker.submit(&task).await;
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }
}
