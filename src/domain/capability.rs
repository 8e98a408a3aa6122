//! Capability tags attached to workers and required by task kinds.
//!
//! Capability is the routing primitive: a worker advertises the set of
//! capabilities it supports, a task kind requires one (see
//! [`super::kind::TaskKind::required_capability`]), and the registry/router
//! match on capability membership rather than worker type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    LocalLlm,
    LlmInference,
    Container,
    CodeExecution,
    ToolCall,
    Remote,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LocalLlm => "local_llm",
            Self::LlmInference => "llm_inference",
            Self::Container => "container",
            Self::CodeExecution => "code_execution",
            Self::ToolCall => "tool_call",
            Self::Remote => "remote",
        };
        write!(f, "{s}")
    }
}
