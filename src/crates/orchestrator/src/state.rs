//! The data model shared by the coordinator, supervisor, and node handlers:
//! `RunGroup`, `GraphState` and its nested records, plus the `Phase`
//! and error-category enums used at the supervisor's external boundary.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One failing CI workflow conceptually fixed as a unit. Created by the
/// supervisor, destroyed when its group reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGroup {
    pub id: String,
    pub name: String,
    pub failing_run_ids: Vec<String>,
    pub main_run_id: String,
    pub head_sha: String,
}

/// Node names the coordinator dispatches on. A closed set, kept as data
/// (not a trait hierarchy) so the dispatch table can be a plain map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeName {
    Analysis,
    Decomposition,
    Planning,
    Execution,
    Verification,
    RepairAgent,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Working,
    Waiting,
    Success,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    Edit,
    Command,
    Create,
}

/// The diagnosis pipeline's output: what is wrong, and how to fix and
/// verify it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnosis {
    pub summary: String,
    pub file_path: Option<String>,
    pub fix_action: Option<FixAction>,
    pub suggested_command: Option<String>,
    pub reproduction_command: Option<String>,
    pub confidence: f64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Diagnosis {
    pub fn failed(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            fix_action: Some(FixAction::Edit),
            confidence: 0.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub confidence: f64,
    pub affected_files: Vec<String>,
    pub suggested_action: String,
}

/// A single subproblem in an `ErrorDAG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorNode {
    pub id: String,
    pub problem: String,
    pub category: String,
    pub affected_files: Vec<String>,
    pub dependencies: Vec<String>,
    pub complexity: i64,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEdge {
    pub from: String,
    pub to: String,
}

/// A DAG of subproblems produced by Decomposition. Invariant: edges induce
/// a DAG and every node id is unique within the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDag {
    pub nodes: Vec<ErrorNode>,
    pub edges: Vec<ErrorEdge>,
    pub root_problem: String,
}

impl ErrorDag {
    /// Node ids are unique and every edge endpoint names a real node.
    pub fn is_valid(&self) -> bool {
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return false;
            }
        }
        self.edges
            .iter()
            .all(|e| seen.contains(e.from.as_str()) && seen.contains(e.to.as_str()))
    }

    /// The minimal-in-degree, highest-priority unsolved node; Decomposition
    /// picks this as the next `currentNodeId`.
    pub fn next_node(&self, solved: &BTreeSet<String>) -> Option<&ErrorNode> {
        let in_degree = |id: &str| -> usize {
            self.edges.iter().filter(|e| e.to == id).count()
        };
        self.nodes
            .iter()
            .filter(|n| !solved.contains(&n.id))
            .min_by_key(|n| (in_degree(&n.id), std::cmp::Reverse(n.priority)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// `{ path, original, modified, status, agentReasoning? }`. Invariant:
/// `status = modified` iff `original != modified`; `status = added` iff
/// `original` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub original: String,
    pub modified: String,
    pub status: FileStatus,
    pub agent_reasoning: Option<String>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, original: String, modified: String) -> Self {
        let status = if original.is_empty() {
            FileStatus::Added
        } else if original == modified {
            FileStatus::Unchanged
        } else {
            FileStatus::Modified
        };
        Self {
            path: path.into(),
            original,
            modified,
            status,
            agent_reasoning: None,
        }
    }
}

/// Used by the loop detector to fingerprint an iteration's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStateSnapshot {
    pub iteration: u32,
    pub files_changed: Vec<String>,
    pub content_checksum: String,
    pub error_fingerprint: String,
    pub timestamp: i64,
}

/// Per-RunGroup state, owned by the Coordinator. Node handlers receive a
/// `&GraphState` and return a `GraphStateDelta`; the coordinator is the only
/// thing that mutates a `GraphState` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: RunStatus,
    pub current_node: NodeName,
    pub diagnosis: Option<Diagnosis>,
    pub classification: Option<Classification>,
    pub refined_problem_statement: String,
    pub file_reservations: Vec<String>,
    pub files: HashMap<String, FileChange>,
    pub active_file_change: Option<FileChange>,
    pub feedback: Vec<String>,
    pub complexity_history: Vec<i64>,
    pub problem_complexity: i64,
    pub error_dag: Option<ErrorDag>,
    pub current_node_id: Option<String>,
    pub solved_nodes: BTreeSet<String>,
    pub reproduction_command_missing: bool,
    pub message: Option<String>,
    pub failure_reason: Option<String>,
}

impl GraphState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            status: RunStatus::Working,
            current_node: NodeName::Analysis,
            diagnosis: None,
            classification: None,
            refined_problem_statement: String::new(),
            file_reservations: Vec::new(),
            files: HashMap::new(),
            active_file_change: None,
            feedback: Vec::new(),
            complexity_history: Vec::new(),
            problem_complexity: 0,
            error_dag: None,
            current_node_id: None,
            solved_nodes: BTreeSet::new(),
            reproduction_command_missing: false,
            message: None,
            failure_reason: None,
        }
    }

    /// `complexityHistory.length == iteration` at every tick boundary.
    pub fn complexity_history_matches_iteration(&self) -> bool {
        self.complexity_history.len() as u32 == self.iteration
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Success | RunStatus::Failed | RunStatus::Stopped
        ) || self.current_node == NodeName::Finish
            || self.iteration >= self.max_iterations
    }
}

/// A sparse update a node handler returns; the coordinator merges it into
/// the authoritative `GraphState`. `None` fields leave the corresponding
/// `GraphState` field untouched — in particular `current_node: None` keeps
/// the present node (used for in-place retries like a lint failure).
#[derive(Debug, Clone, Default)]
pub struct GraphStateDelta {
    pub status: Option<RunStatus>,
    pub current_node: Option<NodeName>,
    pub diagnosis: Option<Diagnosis>,
    pub classification: Option<Classification>,
    pub refined_problem_statement: Option<String>,
    pub file_reservations: Option<Vec<String>>,
    pub files: Vec<FileChange>,
    pub active_file_change: Option<Option<FileChange>>,
    pub feedback_append: Vec<String>,
    pub problem_complexity: Option<i64>,
    pub error_dag: Option<ErrorDag>,
    pub current_node_id: Option<Option<String>>,
    pub solved_nodes_append: Vec<String>,
    pub reproduction_command_missing: Option<bool>,
    pub message: Option<String>,
    pub failure_reason: Option<String>,
}

impl GraphStateDelta {
    pub fn apply(self, state: &mut GraphState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(node) = self.current_node {
            state.current_node = node;
        }
        if let Some(diagnosis) = self.diagnosis {
            state.diagnosis = Some(diagnosis);
        }
        if let Some(classification) = self.classification {
            state.classification = Some(classification);
        }
        if let Some(stmt) = self.refined_problem_statement {
            state.refined_problem_statement = stmt;
        }
        if let Some(reservations) = self.file_reservations {
            state.file_reservations = reservations;
        }
        for file in self.files {
            state.files.insert(file.path.clone(), file);
        }
        if let Some(active) = self.active_file_change {
            state.active_file_change = active;
        }
        state.feedback.extend(self.feedback_append);
        if let Some(complexity) = self.problem_complexity {
            state.problem_complexity = complexity;
        }
        if let Some(dag) = self.error_dag {
            state.error_dag = Some(dag);
        }
        if let Some(node_id) = self.current_node_id {
            state.current_node_id = node_id;
        }
        for solved in self.solved_nodes_append {
            state.solved_nodes.insert(solved);
        }
        if let Some(missing) = self.reproduction_command_missing {
            state.reproduction_command_missing = missing;
        }
        if let Some(message) = self.message {
            state.message = Some(message);
        }
        if let Some(reason) = self.failure_reason {
            state.failure_reason = Some(reason);
        }
    }
}

/// Operator-facing phase of a run, distinct from the internal `NodeName` —
/// emitted on the state-callback boundary for progress UIs. Ordering
/// is fixed: it is meaningful for a UI to render as a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    InitRepo,
    Understand,
    Reproduce,
    Explore,
    Plan,
    PlanApproval,
    AcquireLock,
    ToolUse,
    Implement,
    Verify,
    ReleaseLock,
    Consolidate,
    Testing,
    Success,
    Failure,
    PartialSuccess,
    EnvironmentSetup,
    Provisioning,
}

/// The fixed error-category taxonomy, used by `Classifier` and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DiskSpace,
    Network,
    Authentication,
    Dependency,
    DependencyConflict,
    Syntax,
    Runtime,
    Build,
    TestFailure,
    Timeout,
    Configuration,
    PatchPackageFailure,
    MswError,
    EnvironmentUnstable,
    Infrastructure,
    Unknown,
}

/// Log level for the supervisor's operator-facing `log` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Success,
    Tool,
    Verbose,
}
