//! Task kinds and the routing capability each one requires.

use serde::{Deserialize, Serialize};

use super::capability::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ToolCall,
    LlmRequest,
    LocalLlmRequest,
    CodeExecution,
    Background,
    ApiRequest,
    ContainerTask,
    RemoteCompute,
    ParallelBatch,
    Custom,
}

impl TaskKind {
    /// The capability a worker must advertise to accept this kind, per the
    /// routing policy table. `Background`, `ParallelBatch`, and `Custom`
    /// fall through to the registry best-fit default (no single capability
    /// is mandatory) and return `None`.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Self::LocalLlmRequest => Some(Capability::LocalLlm),
            Self::LlmRequest | Self::ApiRequest => Some(Capability::LlmInference),
            Self::ContainerTask => Some(Capability::Container),
            Self::CodeExecution => Some(Capability::CodeExecution),
            Self::ToolCall => Some(Capability::ToolCall),
            Self::Background | Self::RemoteCompute | Self::ParallelBatch | Self::Custom => None,
        }
    }

    /// True when the routing preference is "first available" rather than
    /// "lowest load, then lowest cost".
    pub fn prefers_first_available(&self) -> bool {
        matches!(self, Self::LocalLlmRequest | Self::ContainerTask | Self::CodeExecution)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ToolCall => "tool_call",
            Self::LlmRequest => "llm_request",
            Self::LocalLlmRequest => "local_llm_request",
            Self::CodeExecution => "code_execution",
            Self::Background => "background",
            Self::ApiRequest => "api_request",
            Self::ContainerTask => "container_task",
            Self::RemoteCompute => "remote_compute",
            Self::ParallelBatch => "parallel_batch",
            Self::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tool_call" => Ok(Self::ToolCall),
            "llm_request" => Ok(Self::LlmRequest),
            "local_llm_request" => Ok(Self::LocalLlmRequest),
            "code_execution" => Ok(Self::CodeExecution),
            "background" => Ok(Self::Background),
            "api_request" => Ok(Self::ApiRequest),
            "container_task" => Ok(Self::ContainerTask),
            "remote_compute" => Ok(Self::RemoteCompute),
            "parallel_batch" => Ok(Self::ParallelBatch),
            "custom" => Ok(Self::Custom),
            other => Err(format!("Unknown task kind: {other}")),
        }
    }
}
