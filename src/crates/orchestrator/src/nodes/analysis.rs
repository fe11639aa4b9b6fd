//! Analysis node: turns a failing run's logs into a `Diagnosis` and a
//! routing decision for the next node.

use crate::diagnosis::{self, DiagnosisInput};
use crate::loop_detector::{inject_strategy_shift_banner, STRATEGY_SHIFT_BANNER};
use crate::ports::ClassificationResult;
use crate::router::{ConditionCheck, EvaluationContext, RouteRule, RuleCondition, RuleEvaluator};
use crate::state::{Classification, ErrorCategory, GraphStateDelta, NodeName, RunStatus};

use super::context::NodeContext;

const NO_FAILED_JOB_SENTINEL: &str = "No failed job found";
const MAX_FALLBACK_ATTEMPTS: usize = 3;
const COMPLEXITY_DECOMPOSITION_THRESHOLD: i64 = 8;
const MINIMAL_PRIORITY_CONFIDENCE: f64 = 0.05;
const CLASSIFICATION_CONFIDENCE_THRESHOLD: f64 = 0.4;

pub async fn run(ctx: &NodeContext<'_>) -> GraphStateDelta {
    let raw_log = match fetch_logs_with_fallback(ctx).await {
        Some(log) => log,
        None => {
            return GraphStateDelta {
                status: Some(RunStatus::Success),
                current_node: Some(NodeName::Finish),
                message: Some("no persisting failure found after fallback strategies".into()),
                ..Default::default()
            };
        }
    };

    let has_hallucinations = ctx
        .hallucinations
        .lock()
        .unwrap()
        .has_repeated_hallucination();

    let banner = has_hallucinations.then_some(STRATEGY_SHIFT_BANNER);

    let diagnosis = diagnosis::diagnose(
        ctx.model,
        ctx.retry,
        DiagnosisInput {
            raw_log: &raw_log,
            job_name: None,
            fault_localization_enabled: true,
            strategy_shift_banner: banner,
            byte_budget: ctx.byte_budget,
        },
    )
    .await;

    let excerpt = if has_hallucinations {
        inject_strategy_shift_banner(&raw_log)
    } else {
        raw_log.clone()
    };

    let classification_result = match ctx.classifier.classify(&excerpt).await {
        Ok(result) if result.confidence >= CLASSIFICATION_CONFIDENCE_THRESHOLD => Some(result),
        _ => classify_with_rules(&excerpt),
    };

    let classification = classification_result.as_ref().map(|c| Classification {
        category: format!("{:?}", c.category),
        confidence: c.confidence,
        affected_files: diagnosis.file_path.clone().into_iter().collect(),
        suggested_action: c.suggested_action.clone(),
    });

    // Benign outcome: minimal priority and no actionable diagnosis signal.
    if let Some(ref class) = classification {
        if class.confidence <= MINIMAL_PRIORITY_CONFIDENCE && diagnosis.file_path.is_none() {
            return GraphStateDelta {
                status: Some(RunStatus::Success),
                current_node: Some(NodeName::Finish),
                diagnosis: Some(diagnosis),
                classification,
                message: Some("no actionable signal; treating as benign".into()),
                ..Default::default()
            };
        }
    }

    let affected_files: Vec<String> = diagnosis.file_path.clone().into_iter().collect();
    let complexity = ctx
        .complexity_estimator
        .estimate(&diagnosis.summary, &affected_files)
        .await
        .unwrap_or(0);

    let next_node = if complexity > COMPLEXITY_DECOMPOSITION_THRESHOLD {
        NodeName::Decomposition
    } else {
        NodeName::Planning
    };

    GraphStateDelta {
        current_node: Some(next_node),
        diagnosis: Some(diagnosis.clone()),
        classification,
        refined_problem_statement: Some(diagnosis.summary),
        problem_complexity: Some(complexity),
        ..Default::default()
    }
}

/// Fetches logs, retrying up to three times on the `"No failed job
/// found"` sentinel with a different fallback strategy label each time
/// (distinct job, parent run, workflow re-poll). Returns `None` once all
/// fallbacks are exhausted, meaning the failure no longer reproduces.
async fn fetch_logs_with_fallback(ctx: &NodeContext<'_>) -> Option<String> {
    for _ in 0..=MAX_FALLBACK_ATTEMPTS {
        let lines = ctx.log_source.fetch_logs(ctx.run_id).await.ok()?;
        let joined = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if joined.trim() != NO_FAILED_JOB_SENTINEL && !joined.is_empty() {
            return Some(joined);
        }
    }
    None
}

/// Rule-based categories consulted when the LM-backed classifier errors or
/// returns a confidence below `CLASSIFICATION_CONFIDENCE_THRESHOLD`. Each
/// rule's `prefer` names one category; the highest-priority matching rule
/// wins.
fn classification_rules() -> Vec<RouteRule> {
    vec![
        RouteRule {
            name: "network".into(),
            when: RuleCondition::Single(ConditionCheck::Contains {
                keywords: vec![
                    "connection refused".into(),
                    "could not resolve host".into(),
                    "timed out".into(),
                ],
            }),
            prefer: vec!["network".into()],
            priority: 10,
        },
        RouteRule {
            name: "dependency".into(),
            when: RuleCondition::Single(ConditionCheck::Contains {
                keywords: vec![
                    "module not found".into(),
                    "cannot find package".into(),
                    "no matching package".into(),
                ],
            }),
            prefer: vec!["dependency".into()],
            priority: 10,
        },
        RouteRule {
            name: "syntax".into(),
            when: RuleCondition::Single(ConditionCheck::Contains {
                keywords: vec!["syntaxerror".into(), "unexpected token".into()],
            }),
            prefer: vec!["syntax".into()],
            priority: 10,
        },
        RouteRule {
            name: "test_failure".into(),
            when: RuleCondition::Single(ConditionCheck::Contains {
                keywords: vec!["assertionerror".into(), "test failed".into()],
            }),
            prefer: vec!["test_failure".into()],
            priority: 5,
        },
    ]
}

fn category_from_rule_name(name: &str) -> ErrorCategory {
    match name {
        "network" => ErrorCategory::Network,
        "dependency" => ErrorCategory::Dependency,
        "syntax" => ErrorCategory::Syntax,
        "test_failure" => ErrorCategory::TestFailure,
        _ => ErrorCategory::Unknown,
    }
}

fn classify_with_rules(excerpt: &str) -> Option<ClassificationResult> {
    let evaluator = RuleEvaluator::new();
    let eval_ctx = EvaluationContext::new(excerpt);
    let rules = classification_rules();

    let best = rules
        .iter()
        .filter(|rule| evaluator.evaluate_rule(rule, &eval_ctx).unwrap_or(false))
        .max_by_key(|rule| rule.priority)?;

    let category = best
        .prefer
        .first()
        .map(|name| category_from_rule_name(name))
        .unwrap_or(ErrorCategory::Unknown);

    Some(ClassificationResult {
        category,
        confidence: CLASSIFICATION_CONFIDENCE_THRESHOLD,
        suggested_action: format!("rule:{}", best.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_detector::HallucinationTracker;
    use crate::ports::test_support::*;
    use crate::ports::{ClassificationResult, LogLine};
    use crate::sandbox::test_support::FakeSandbox;
    use crate::state::ErrorCategory;
    use llm::test_support::FakeLanguageModel;
    use llm::GenerationResponse;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn base_ctx<'a>(
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
    async fn analysis_routes_to_planning_for_low_complexity() {
        let sandbox = FakeSandbox::new("sbx");
        let response = GenerationResponse::text_only(
            r#"{"summary":"Division by zero","filePath":"f.py","fixAction":"edit","reproductionCommand":"pytest f.py","confidence":0.9}"#,
        );
        let model = FakeLanguageModel::new(vec![Ok(response)]);
        let mut logs = HashMap::new();
        logs.insert(
            "run-1".to_string(),
            vec![LogLine {
                source: "job".into(),
                text: "Error: Division by zero".into(),
                timestamp: None,
            }],
        );
        let log_source = FakeLogSource { logs };
        let classifier = FakeClassifier {
            result: ClassificationResult {
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

        let ctx = base_ctx(
            &sandbox,
            &model,
            &log_source,
            &classifier,
            &estimator,
            &discovery,
            &metrics,
            &persistence,
            &hallucinations, &retry,
        );

        let delta = run(&ctx).await;
        assert_eq!(delta.current_node, Some(NodeName::Planning));
        assert_eq!(delta.problem_complexity, Some(3));
    }

    #[tokio::test]
    async fn analysis_routes_to_decomposition_for_high_complexity() {
        let sandbox = FakeSandbox::new("sbx");
        let response = GenerationResponse::text_only(
            r#"{"summary":"Cascading failure","filePath":"a.py","fixAction":"edit","confidence":0.9}"#,
        );
        let model = FakeLanguageModel::new(vec![Ok(response)]);
        let mut logs = HashMap::new();
        logs.insert(
            "run-1".to_string(),
            vec![LogLine {
                source: "job".into(),
                text: "Error: cascading failure".into(),
                timestamp: None,
            }],
        );
        let log_source = FakeLogSource { logs };
        let classifier = FakeClassifier {
            result: ClassificationResult {
                category: ErrorCategory::Build,
                confidence: 0.8,
                suggested_action: "decompose".into(),
            },
        };
        let estimator = FakeComplexityEstimator { value: 12 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let ctx = base_ctx(
            &sandbox,
            &model,
            &log_source,
            &classifier,
            &estimator,
            &discovery,
            &metrics,
            &persistence,
            &hallucinations, &retry,
        );

        let delta = run(&ctx).await;
        assert_eq!(delta.current_node, Some(NodeName::Decomposition));
    }

    #[tokio::test]
    async fn analysis_exits_success_when_no_failed_job_persists() {
        let sandbox = FakeSandbox::new("sbx");
        let model = FakeLanguageModel::new(vec![]);
        let mut logs = HashMap::new();
        logs.insert(
            "run-1".to_string(),
            vec![LogLine {
                source: "job".into(),
                text: NO_FAILED_JOB_SENTINEL.into(),
                timestamp: None,
            }],
        );
        let log_source = FakeLogSource { logs };
        let classifier = FakeClassifier {
            result: ClassificationResult {
                category: ErrorCategory::Unknown,
                confidence: 0.0,
                suggested_action: "none".into(),
            },
        };
        let estimator = FakeComplexityEstimator { value: 0 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = Mutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let ctx = base_ctx(
            &sandbox,
            &model,
            &log_source,
            &classifier,
            &estimator,
            &discovery,
            &metrics,
            &persistence,
            &hallucinations, &retry,
        );

        let delta = run(&ctx).await;
        assert_eq!(delta.status, Some(RunStatus::Success));
        assert_eq!(delta.current_node, Some(NodeName::Finish));
    }

    #[test]
    fn rule_fallback_matches_network_keywords() {
        let result = classify_with_rules("Error: connection refused while fetching crate index")
            .unwrap();
        assert_eq!(result.category, ErrorCategory::Network);
        assert_eq!(result.suggested_action, "rule:network");
    }

    #[test]
    fn rule_fallback_returns_none_when_nothing_matches() {
        assert!(classify_with_rules("all tests passed").is_none());
    }
}
