//! Local-LLM worker: wraps a local inference endpoint (e.g. an Ollama-style
//! HTTP server). The wire protocol itself is a non-goal; only the minimal
//! "send prompt, get completion" contract is implemented via the pluggable
//! [`LocalLlmClient`].

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LoadGuard, StatusCell, Worker, WorkerMetrics, WorkerStatus};
use crate::domain::{Capability, Task, TaskResult};

#[async_trait]
pub trait LocalLlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, String>;
    async fn ping(&self) -> bool;
}

/// Default client talking to a local inference server over HTTP.
pub struct HttpLocalLlmClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLocalLlmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LocalLlmClient for HttpLocalLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("local llm endpoint returned {}", resp.status()));
        }
        resp.text().await.map_err(|e| e.to_string())
    }

    async fn ping(&self) -> bool {
        self.client
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Concurrency cap defaults low (2) to match a single-GPU machine, per the
/// expanded spec's worker-variant guidance.
pub struct LocalLlmWorker {
    id: String,
    capabilities: HashSet<Capability>,
    cap: usize,
    load: AtomicUsize,
    status: StatusCell,
    metrics: WorkerMetrics,
    client: Arc<dyn LocalLlmClient>,
}

impl LocalLlmWorker {
    pub fn new(id: impl Into<String>, client: Arc<dyn LocalLlmClient>) -> Self {
        Self {
            id: id.into(),
            capabilities: [Capability::LocalLlm, Capability::LlmInference].into_iter().collect(),
            cap: 2,
            load: AtomicUsize::new(0),
            status: StatusCell::new(WorkerStatus::Idle),
            metrics: WorkerMetrics::default(),
            client,
        }
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
impl Worker for LocalLlmWorker {
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
        let ok = self.client.ping().await;
        self.status.set(if ok { WorkerStatus::Idle } else { WorkerStatus::Unhealthy }).await;
        ok
    }

    async fn stop(&self) {
        self.status.set(WorkerStatus::Draining).await;
        while self.load() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.status.set(WorkerStatus::Stopped).await;
    }

    async fn health_check(&self) -> bool {
        let ok = self.client.ping().await;
        self.status.set(if ok { WorkerStatus::Idle } else { WorkerStatus::Unhealthy }).await;
        ok
    }

    async fn submit(&self, task: &Task) -> TaskResult {
        let _guard = LoadGuard::acquire(&self.load);
        let started = std::time::Instant::now();

        let prompt = task.payload.get("prompt").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let result = match self.client.complete(&prompt).await {
            Ok(text) => TaskResult::success(&self.id, serde_json::json!({ "completion": text }), 0),
            Err(e) => TaskResult::failure(e).with_worker_id(&self.id),
        };

        let elapsed = started.elapsed().as_millis() as u64;
        self.metrics.record(result.success, elapsed);
        result.with_execution_time_ms(elapsed)
    }
}
