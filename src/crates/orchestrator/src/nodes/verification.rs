//! Verification node: runs the reproduction command and judges whether
//! the fix actually worked.

use crate::state::{FixAction, GraphState, GraphStateDelta, NodeName, RunStatus};

use super::context::NodeContext;

/// Runtimes that emit this on stderr when `node`/`npm` is actually a Bun
/// shim; retrying under `bun` once resolves the mismatch without the
/// round-trip through Analysis.
const BUN_MISMATCH_MARKER: &str = "bun: command not found";

/// Picks a reasonable test invocation for a changed file when the
/// diagnosis didn't already supply a reproduction command. Callers needing
/// project-specific selection can swap this out; kept as a free function
/// (not a trait) since nothing here depends on external state.
pub fn select_test_command(files: &[String]) -> String {
    if files.iter().any(|f| f.ends_with(".py")) {
        "pytest".to_string()
    } else if files.iter().any(|f| f.ends_with(".rs")) {
        "cargo test".to_string()
    } else if files.iter().any(|f| f.ends_with(".ts") || f.ends_with(".tsx")) {
        "npx vitest run".to_string()
    } else {
        "npm test".to_string()
    }
}

pub async fn run(state: &GraphState, ctx: &NodeContext<'_>) -> GraphStateDelta {
    let Some(diagnosis) = state.diagnosis.clone() else {
        return halt_no_reproduction();
    };

    let command = match diagnosis.fix_action {
        Some(FixAction::Command) => match &diagnosis.reproduction_command {
            Some(cmd) => cmd.clone(),
            None => return halt_no_reproduction(),
        },
        _ => diagnosis.reproduction_command.clone().unwrap_or_else(|| {
            let changed: Vec<String> = state.files.keys().cloned().collect();
            select_test_command(&changed)
        }),
    };

    let output = match ctx.sandbox.run_command(&command).await {
        Ok(o) => o,
        Err(e) => {
            return GraphStateDelta {
                current_node: Some(NodeName::Analysis),
                feedback_append: vec![format!("Verification Failed: {e}")],
                ..Default::default()
            };
        }
    };

    if output.succeeded() {
        return GraphStateDelta {
            status: Some(RunStatus::Success),
            current_node: Some(NodeName::Finish),
            ..Default::default()
        };
    }

    if output.stderr.contains(BUN_MISMATCH_MARKER) {
        let bun_command = format!("bun {}", strip_runtime_prefix(&command));
        if let Ok(retry) = ctx.sandbox.run_command(&bun_command).await {
            if retry.succeeded() {
                return GraphStateDelta {
                    status: Some(RunStatus::Success),
                    current_node: Some(NodeName::Finish),
                    ..Default::default()
                };
            }
            return verification_failed_feedback(&retry);
        }
    }

    verification_failed_feedback(&output)
}

fn strip_runtime_prefix(command: &str) -> String {
    command
        .strip_prefix("node ")
        .or_else(|| command.strip_prefix("npm "))
        .unwrap_or(command)
        .to_string()
}

fn verification_failed_feedback(output: &crate::sandbox::CommandOutput) -> GraphStateDelta {
    GraphStateDelta {
        current_node: Some(NodeName::Analysis),
        feedback_append: vec![format!(
            "Verification Failed: exit code {} stdout {} stderr {}",
            output.exit_code, output.stdout, output.stderr
        )],
        ..Default::default()
    }
}

fn halt_no_reproduction() -> GraphStateDelta {
    GraphStateDelta {
        status: Some(RunStatus::Failed),
        current_node: Some(NodeName::Finish),
        reproduction_command_missing: Some(true),
        failure_reason: Some("Reproduction command required".into()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_detector::HallucinationTracker;
    use crate::ports::test_support::*;
    use crate::sandbox::test_support::FakeSandbox;
    use crate::sandbox::CommandOutput;
    use crate::state::{Diagnosis, ErrorCategory};
    use llm::test_support::FakeLanguageModel;
    use std::sync::Mutex;

    fn ctx<'a>(
        sandbox: &'a FakeSandbox,
        model: &'a FakeLanguageModel,
        log_source: &'a FakeLogSource,
        classifier: &'a FakeClassifier,
        estimator: &'a FakeComplexityEstimator,
        discovery: &'a FakeFileDiscovery,
        metrics: &'a RecordingMetricsSink,
        persistence: &'a InMemoryPersistence,
        hallucinations: &'a Mutex<HallucinationTracker>,
        retry: &'a llm::RetryConfig,
    ) -> NodeContext<'a> {
        NodeContext {
            group_id: "group-1",
            run_id: "run-1",
            sandbox,
            model,
            log_source,
            classifier,
            complexity_estimator: estimator,
            file_discovery: discovery,
            metrics,
            persistence,
            hallucinations,
            byte_budget: 8000,
            retry,
        }
    }

    fn default_classifier() -> FakeClassifier {
        FakeClassifier {
            result: crate::ports::ClassificationResult {
                category: ErrorCategory::Unknown,
                confidence: 0.0,
                suggested_action: "none".into(),
            },
        }
    }

    #[tokio::test]
    async fn halts_when_reproduction_command_missing() {
        let sandbox = FakeSandbox::new("sbx");
        let model = FakeLanguageModel::new(vec![]);
        let log_source = FakeLogSource {
            logs: Default::default(),
        };
        let classifier = default_classifier();
        let estimator = FakeComplexityEstimator { value: 0 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let node_ctx = ctx(
            &sandbox, &model, &log_source, &classifier, &estimator, &discovery, &metrics,
            &persistence, &hallucinations, &retry,
        );

        let mut state = GraphState::new(5);
        state.diagnosis = Some(Diagnosis {
            summary: "boom".into(),
            file_path: Some("f.py".into()),
            fix_action: Some(FixAction::Command),
            suggested_command: Some("docker ps".into()),
            reproduction_command: None,
            confidence: 0.8,
            kind: None,
        });

        let delta = run(&state, &node_ctx).await;
        assert_eq!(delta.status, Some(RunStatus::Failed));
        assert_eq!(delta.current_node, Some(NodeName::Finish));
        assert_eq!(delta.reproduction_command_missing, Some(true));
        assert_eq!(
            delta.failure_reason.as_deref(),
            Some("Reproduction command required")
        );
    }

    #[tokio::test]
    async fn succeeds_on_exit_zero() {
        let sandbox = FakeSandbox::new("sbx");
        sandbox.push_command_result(CommandOutput {
            stdout: "all good".into(),
            stderr: String::new(),
            exit_code: 0,
        });
        let model = FakeLanguageModel::new(vec![]);
        let log_source = FakeLogSource {
            logs: Default::default(),
        };
        let classifier = default_classifier();
        let estimator = FakeComplexityEstimator { value: 0 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let node_ctx = ctx(
            &sandbox, &model, &log_source, &classifier, &estimator, &discovery, &metrics,
            &persistence, &hallucinations, &retry,
        );

        let mut state = GraphState::new(5);
        state.diagnosis = Some(Diagnosis {
            summary: "boom".into(),
            file_path: Some("f.py".into()),
            fix_action: Some(FixAction::Edit),
            suggested_command: None,
            reproduction_command: Some("pytest f.py".into()),
            confidence: 0.8,
            kind: None,
        });

        let delta = run(&state, &node_ctx).await;
        assert_eq!(delta.status, Some(RunStatus::Success));
        assert_eq!(delta.current_node, Some(NodeName::Finish));
    }

    #[tokio::test]
    async fn failure_routes_back_to_analysis_with_feedback() {
        let sandbox = FakeSandbox::new("sbx");
        sandbox.push_command_result(CommandOutput {
            stdout: String::new(),
            stderr: "AssertionError".into(),
            exit_code: 1,
        });
        let model = FakeLanguageModel::new(vec![]);
        let log_source = FakeLogSource {
            logs: Default::default(),
        };
        let classifier = default_classifier();
        let estimator = FakeComplexityEstimator { value: 0 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let node_ctx = ctx(
            &sandbox, &model, &log_source, &classifier, &estimator, &discovery, &metrics,
            &persistence, &hallucinations, &retry,
        );

        let mut state = GraphState::new(5);
        state.diagnosis = Some(Diagnosis {
            summary: "boom".into(),
            file_path: Some("f.py".into()),
            fix_action: Some(FixAction::Edit),
            suggested_command: None,
            reproduction_command: Some("pytest f.py".into()),
            confidence: 0.8,
            kind: None,
        });

        let delta = run(&state, &node_ctx).await;
        assert_eq!(delta.current_node, Some(NodeName::Analysis));
        assert!(delta.feedback_append[0].starts_with("Verification Failed"));
    }
}
