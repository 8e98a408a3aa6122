//! Remote worker: proxies to an out-of-process orchestrator node over
//! HTTP/RPC. The RPC itself is a non-goal; the contract is just the Worker
//! interface plus a URL and optional auth token.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LoadGuard, StatusCell, Worker, WorkerMetrics, WorkerStatus};
use crate::domain::{Capability, Task, TaskResult};

pub struct RemoteWorker {
    id: String,
    url: String,
    auth_token: Option<String>,
    capabilities: HashSet<Capability>,
    cap: usize,
    load: AtomicUsize,
    status: StatusCell,
    metrics: WorkerMetrics,
    client: reqwest::Client,
}

impl RemoteWorker {
    pub fn new(id: impl Into<String>, url: impl Into<String>, auth_token: Option<String>, capabilities: HashSet<Capability>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            auth_token,
            capabilities,
            cap: 8,
            load: AtomicUsize::new(0),
            status: StatusCell::new(WorkerStatus::Idle),
            metrics: WorkerMetrics::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(format!("{}{}", self.url, path));
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn cached_status(&self) -> WorkerStatus {
        self.status.inner.try_lock().map(|g| *g).unwrap_or(WorkerStatus::Busy)
    }
}

#[async_trait]
impl Worker for RemoteWorker {
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
        let ok = self.request("/health").send().await.map(|r| r.status().is_success()).unwrap_or(false);
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
        let ok = self.request("/health").send().await.map(|r| r.status().is_success()).unwrap_or(false);
        self.status.set(if ok { WorkerStatus::Idle } else { WorkerStatus::Unhealthy }).await;
        ok
    }

    async fn submit(&self, task: &Task) -> TaskResult {
        let _guard = LoadGuard::acquire(&self.load);
        let started = std::time::Instant::now();

        let result = match self.request("/tasks").json(&task.payload).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(data) => TaskResult::success(&self.id, data, 0),
                Err(e) => TaskResult::failure(format!("malformed remote response: {e}")).with_worker_id(&self.id),
            },
            Ok(resp) => TaskResult::failure(format!("remote worker returned {}", resp.status())).with_worker_id(&self.id),
            Err(e) => TaskResult::failure(format!("remote worker unreachable: {e}")).with_worker_id(&self.id),
        };

        let elapsed = started.elapsed().as_millis() as u64;
        self.metrics.record(result.success, elapsed);
        result.with_execution_time_ms(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_cap_to_eight() {
        let worker = RemoteWorker::new("r1", "http://example.invalid", None, [Capability::Remote].into_iter().collect());
        assert_eq!(worker.cap(), 8);
    }

    #[test]
    fn test_with_cap_overrides() {
        let worker =
            RemoteWorker::new("r1", "http://example.invalid", None, [Capability::Remote].into_iter().collect()).with_cap(20);
        assert_eq!(worker.cap(), 20);
    }
}
