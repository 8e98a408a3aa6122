//! Error taxonomy.
//!
//! Every kind named in the error handling design is a distinguishable
//! variant here, not a bare string, so callers can match on kind. None of
//! these ever escape the task-execution boundary as a panic: the router and
//! orchestrator convert any `OrchestratorError` into a failed `TaskResult`
//! via [`OrchestratorError::into_result`] before it reaches a caller.

use thiserror::Error;

use crate::domain::TaskResult;

#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("quota error: {0}")]
    Quota(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("cancelled: {0}")]
    Cancellation(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl OrchestratorError {
    pub fn into_result(self) -> TaskResult {
        TaskResult::failure(self.to_string())
    }

    /// Whether a router retry makes sense for this error kind. Validation,
    /// routing, dependency, and cancellation errors are never retried;
    /// worker-internal, quota, and timeout errors may be.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Worker(_) | Self::Quota(_) | Self::Timeout(_))
    }
}
