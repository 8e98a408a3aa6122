//! TaskResult: the outcome of a worker's `submit` call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Created by the worker, owned by the [`super::task::Task`] it resulted
/// from, exposed to the orchestrator. Every error path in the core ends up
/// as a `TaskResult` with `success = false` rather than a propagated
/// exception (see the error taxonomy in the expanded spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
    pub metrics: HashMap<String, serde_json::Value>,
    pub execution_time_ms: u64,
    pub worker_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(worker_id: impl Into<String>, data: serde_json::Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metrics: HashMap::new(),
            execution_time_ms,
            worker_id: Some(worker_id.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            metrics: HashMap::new(),
            execution_time_ms: 0,
            worker_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_execution_time_ms(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_result() {
        let result = TaskResult::success("worker-1", serde_json::json!({"ok": true}), 42);
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.worker_id.as_deref(), Some("worker-1"));
        assert_eq!(result.execution_time_ms, 42);
    }

    #[test]
    fn test_failure_result() {
        let result = TaskResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.worker_id.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let result = TaskResult::failure("quota exceeded")
            .with_worker_id("cloud-1")
            .with_metric("tokens", serde_json::json!(128))
            .with_execution_time_ms(7);
        assert_eq!(result.worker_id.as_deref(), Some("cloud-1"));
        assert_eq!(result.metrics.get("tokens"), Some(&serde_json::json!(128)));
        assert_eq!(result.execution_time_ms, 7);
    }
}
