//! Planning node: produces an approved plan and must set
//! `diagnosis.reproductionCommand` before any transition into execution.

use langgraph_core::Message;
use llm::PromptBundle;
use serde::{Deserialize, Serialize};

use crate::diagnosis::reproduction;
use crate::state::{GraphState, GraphStateDelta, NodeName};

use super::context::NodeContext;

const MAX_REVISE_CYCLES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub description: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub tasks: Vec<PlanTask>,
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    approved: bool,
    #[serde(default)]
    feedback: Option<String>,
}

pub async fn run(state: &GraphState, ctx: &NodeContext<'_>) -> GraphStateDelta {
    let mut plan = fallback_plan(state);
    let mut feedback_trail = Vec::new();

    for _ in 0..MAX_REVISE_CYCLES {
        let proposal = match propose_plan(ctx, state, &feedback_trail).await {
            Some(p) => p,
            None => break,
        };
        match judge_plan(ctx, &proposal).await {
            Some(verdict) if verdict.approved => {
                plan = proposal;
                plan.approved = true;
                break;
            }
            Some(verdict) => {
                plan = proposal;
                if let Some(fb) = verdict.feedback {
                    feedback_trail.push(fb);
                }
            }
            None => {
                plan = proposal;
                break;
            }
        }
    }

    let mut delta = GraphStateDelta {
        current_node: Some(route_after_plan(state)),
        ..Default::default()
    };

    // Invariant: reproductionCommand must be set before execution/repair-agent.
    let needs_reproduction = state
        .diagnosis
        .as_ref()
        .map(|d| d.reproduction_command.is_none())
        .unwrap_or(true);

    if needs_reproduction {
        if let Some(mut diagnosis) = state.diagnosis.clone() {
            if let Some(inferred) = infer_reproduction_command(ctx, state).await {
                diagnosis.reproduction_command = Some(inferred);
                delta.diagnosis = Some(diagnosis);
            } else {
                delta.reproduction_command_missing = Some(true);
            }
        } else {
            delta.reproduction_command_missing = Some(true);
        }
    }

    delta.message = Some(serde_json::to_string(&plan).unwrap_or_default());
    delta
}

fn fallback_plan(state: &GraphState) -> Plan {
    Plan {
        goal: state.refined_problem_statement.clone(),
        tasks: vec![PlanTask {
            id: "task-1".into(),
            description: state.refined_problem_statement.clone(),
            status: "pending".into(),
        }],
        approved: true,
    }
}

fn route_after_plan(state: &GraphState) -> NodeName {
    if state.error_dag.is_some() && state.current_node_id.is_some() {
        NodeName::Execution
    } else {
        NodeName::Execution
    }
}

async fn propose_plan(
    ctx: &NodeContext<'_>,
    state: &GraphState,
    feedback_trail: &[String],
) -> Option<Plan> {
    let feedback_text = feedback_trail.join("\n");
    let prompt = format!(
        "Produce a plan {{goal, tasks:[{{id, description, status}}], approved}} for: {}\n\
         Prior feedback: {}",
        state.refined_problem_statement, feedback_text
    );
    let bundle = PromptBundle::new(vec![Message::human(prompt)]).json();
    let response = llm::generate_with_retry(ctx.model, bundle, ctx.retry).await.ok()?;
    serde_json::from_str(&response.text).ok()
}

async fn judge_plan(ctx: &NodeContext<'_>, plan: &Plan) -> Option<JudgeVerdict> {
    let plan_json = serde_json::to_string(plan).ok()?;
    let prompt = format!(
        "Judge this plan and respond with JSON {{approved, feedback?}}:\n{plan_json}"
    );
    let bundle = PromptBundle::new(vec![Message::human(prompt)]).json();
    let response = llm::generate_with_retry(ctx.model, bundle, ctx.retry).await.ok()?;
    serde_json::from_str(&response.text).ok()
}

async fn infer_reproduction_command(ctx: &NodeContext<'_>, state: &GraphState) -> Option<String> {
    if let Some(result) = reproduction::from_signature_match(&state.refined_problem_statement) {
        return Some(result.command);
    }
    let files: Vec<String> = state.files.keys().cloned().collect();
    if let Some(result) = reproduction::from_manifest(&files) {
        return Some(result.command);
    }
    if let Ok(Some(result)) =
        reproduction::from_lm_retry(ctx.model, ctx.retry, &state.refined_problem_statement).await
    {
        return Some(result.command);
    }
    reproduction::from_safe_scan(&files).map(|r| r.command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_detector::HallucinationTracker;
    use crate::ports::test_support::*;
    use crate::sandbox::test_support::FakeSandbox;
    use crate::state::{Diagnosis, ErrorCategory, FixAction};
    use llm::test_support::FakeLanguageModel;
    use llm::GenerationResponse;
    use std::sync::Mutex;

    fn make_ctx<'a>(
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

    #[tokio::test]
    async fn planning_sets_reproduction_command_when_missing() {
        let sandbox = FakeSandbox::new("sbx");
        let propose = GenerationResponse::text_only(
            r#"{"goal":"fix it","tasks":[{"id":"t1","description":"fix","status":"pending"}],"approved":false}"#,
        );
        let judge = GenerationResponse::text_only(r#"{"approved":true}"#);
        let model = FakeLanguageModel::new(vec![Ok(propose), Ok(judge)]);
        let log_source = FakeLogSource {
            logs: Default::default(),
        };
        let classifier = FakeClassifier {
            result: crate::ports::ClassificationResult {
                category: ErrorCategory::Runtime,
                confidence: 0.8,
                suggested_action: "edit".into(),
            },
        };
        let estimator = FakeComplexityEstimator { value: 3 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let ctx = make_ctx(
            &sandbox, &model, &log_source, &classifier, &estimator, &discovery, &metrics,
            &persistence, &hallucinations, &retry,
        );

        let mut state = GraphState::new(5);
        state.diagnosis = Some(Diagnosis {
            summary: "boom".into(),
            file_path: Some("f.py".into()),
            fix_action: Some(FixAction::Edit),
            suggested_command: None,
            reproduction_command: None,
            confidence: 0.8,
            kind: None,
        });
        state.files.insert(
            "pytest.ini".into(),
            crate::state::FileChange::new("pytest.ini", String::new(), "[pytest]".into()),
        );

        let delta = run(&state, &ctx).await;
        assert_eq!(delta.current_node, Some(NodeName::Execution));
        assert!(delta.reproduction_command_missing.is_none());
    }

    #[tokio::test]
    async fn planning_flags_missing_reproduction_when_no_diagnosis() {
        let sandbox = FakeSandbox::new("sbx");
        let propose = GenerationResponse::text_only(
            r#"{"goal":"fix it","tasks":[{"id":"t1","description":"fix","status":"pending"}],"approved":true}"#,
        );
        let model = FakeLanguageModel::new(vec![Ok(propose)]);
        let log_source = FakeLogSource {
            logs: Default::default(),
        };
        let classifier = FakeClassifier {
            result: crate::ports::ClassificationResult {
                category: ErrorCategory::Runtime,
                confidence: 0.8,
                suggested_action: "edit".into(),
            },
        };
        let estimator = FakeComplexityEstimator { value: 3 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let ctx = make_ctx(
            &sandbox, &model, &log_source, &classifier, &estimator, &discovery, &metrics,
            &persistence, &hallucinations, &retry,
        );

        let state = GraphState::new(5);
        let delta = run(&state, &ctx).await;
        assert_eq!(delta.reproduction_command_missing, Some(true));
    }
}
