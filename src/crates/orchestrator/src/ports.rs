//! Collaborator ports: the seams node handlers and the diagnosis pipeline
//! depend on instead of concrete infrastructure. The `LanguageModel` port
//! itself lives in the `llm` crate and is re-exported here so callers only
//! need one import path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::state::{ErrorCategory, GraphState};

pub use llm::LanguageModel;

/// A raw log line with enough provenance to localize a failure to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub source: String,
    pub text: String,
    pub timestamp: Option<i64>,
}

/// Fetches the raw CI logs for a failing run. Implementations talk to
/// whatever CI provider hosts the workflow; this crate only consumes the
/// result.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_logs(&self, run_id: &str) -> Result<Vec<LogLine>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: ErrorCategory,
    pub confidence: f64,
    pub suggested_action: String,
}

/// Maps a filtered failure signal to one of the fixed error categories.
/// The Analysis node calls this first; when it errors or returns low
/// confidence, the rule-based router (`router::evaluator`) is consulted
/// as a fallback.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, log_excerpt: &str) -> Result<ClassificationResult>;
}

/// Estimates how hard a subproblem is to fix, on the same scale as
/// `GraphState::problem_complexity` (the loop detector treats values above
/// 15 as elevated). Used by Decomposition to set `ErrorNode::complexity`
/// and by the loop detector to build `complexity_history`.
#[async_trait]
pub trait ComplexityEstimator: Send + Sync {
    async fn estimate(&self, problem_statement: &str, affected_files: &[String]) -> Result<i64>;
}

/// Resolves an LM-proposed path against the real workspace, surfacing
/// ambiguity so a node can raise `PathHallucination` rather than silently
/// picking a candidate. The loop detector's hallucinated-path tracking
/// depends on this port telling the truth about what the workspace
/// actually contains.
#[async_trait]
pub trait FileDiscovery: Send + Sync {
    /// All workspace paths whose file name matches `name`.
    async fn find_by_name(&self, name: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Numeric/counter telemetry. Distinct from the supervisor's human-facing
/// `log` callback — sinks implementing this are expected to forward into a
/// metrics backend, not a terminal. Write-only: the coordinator never
/// reads a metric back to make a decision.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// One call per terminal outcome of a fix attempt.
    async fn record_fix_attempt(
        &self,
        group_id: &str,
        success: bool,
        iterations: u32,
        latency_ms: u64,
        reason: Option<&str>,
    );

    async fn record_iteration(&self, group_id: &str, iteration: u32, complexity: i64);

    async fn record_outcome(&self, group_id: &str, status: &str);

    async fn record_error(&self, group_id: &str, category: ErrorCategory);
}

/// The narrow persistence boundary: snapshot and restore a group's
/// `GraphState`, plus write-only file-modification and reward-signal
/// records for learning loops. No read API beyond state restore is
/// required by the core.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn save_state(&self, group_id: &str, state: &GraphState) -> Result<()>;

    async fn load_state(&self, group_id: &str) -> Result<Option<GraphState>>;

    async fn delete_state(&self, group_id: &str) -> Result<()>;

    /// One call per successful sandbox write.
    async fn record_file_modification(&self, group_id: &str, path: &str);

    /// Optional reward signal for learning loops; `payload` is an
    /// arbitrary structured value the host interprets.
    async fn record_reward_signal(&self, group_id: &str, reward: f64, payload: Value);
}

/// Arbitrary structured payload a node wants a human or audit log to see,
/// distinct from the log-level enum in `state::LogLevel` which only
/// classifies severity.
pub type StateCallbackPayload = Value;
