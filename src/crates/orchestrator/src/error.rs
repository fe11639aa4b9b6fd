//! The orchestrator's error taxonomy.
//!
//! Every fallible core operation returns `Result<T, OrchestratorError>`. The
//! variants below line up with the failure modes the coordinator and
//! supervisor must treat specially (reproduction gating, strategy-loop
//! halts, lock contention) rather than simply propagating.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A node transitioned into `execution`/`repair-agent` with no
    /// reproduction command on the current diagnosis.
    #[error("reproduction command required before executing a fix")]
    ReproductionMissing,

    /// The strategy/convergence detector halted the group.
    #[error("strategy loop detected: {0}")]
    StrategyLoopDetected(String),

    /// The diagnosis pipeline could not produce a usable diagnosis.
    #[error("diagnosis failed: {0}")]
    DiagnosisFailed(String),

    /// The LM proposed a path the workspace does not contain, and the
    /// ambiguity could not be resolved automatically.
    #[error("path hallucination: {0}")]
    PathHallucination(String),

    /// A file-reservation could not be acquired before its timeout.
    #[error("lock contention on {path}: held by group {holder}")]
    LockContention { path: String, holder: String },

    /// The sandbox rejected or failed an operation.
    #[error("sandbox error: {0}")]
    SandboxError(String),

    /// A collaborator port returned an error.
    #[error("collaborator port error: {0}")]
    PortError(String),

    /// State could not be read, merged, or serialized.
    #[error("state error: {0}")]
    State(String),

    /// Catch-all for everything else.
    #[error("orchestrator error: {0}")]
    General(String),

    /// Serialization/deserialization of state or prompt payloads failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<langgraph_core::GraphError> for OrchestratorError {
    fn from(err: langgraph_core::GraphError) -> Self {
        OrchestratorError::General(err.to_string())
    }
}

impl From<llm::LlmError> for OrchestratorError {
    fn from(err: llm::LlmError) -> Self {
        OrchestratorError::PortError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_contention_formats_path_and_holder() {
        let err = OrchestratorError::LockContention {
            path: "src/lib.rs".into(),
            holder: "group-1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("src/lib.rs"));
        assert!(msg.contains("group-1"));
    }
}
