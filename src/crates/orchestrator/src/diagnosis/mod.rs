//! The diagnosis pipeline: turns a raw CI log into a `Diagnosis`, running
//! seven stages in sequence. Any stage panic or propagated error is caught
//! at the top and turned into the pipeline's own degraded-diagnosis
//! failure value rather than aborting the node.

pub mod filter;
pub mod reproduction;
pub mod sanitize;
pub mod summarize;

use langgraph_core::Message;
use llm::PromptBundle;
use serde::Deserialize;

use crate::context::{smart_thin_log, ContextItem, ContextManager, ItemType, Priority};
use crate::ports::LanguageModel;
use crate::state::{Diagnosis, FixAction};

#[derive(Debug, Clone, Deserialize)]
struct RawLmDiagnosis {
    summary: String,
    #[serde(rename = "filePath")]
    file_path: Option<String>,
    #[serde(rename = "fixAction")]
    fix_action: Option<String>,
    #[serde(rename = "suggestedCommand")]
    suggested_command: Option<String>,
    #[serde(rename = "reproductionCommand")]
    reproduction_command: Option<String>,
    confidence: f64,
}

/// Input the caller assembles for one diagnosis pass.
pub struct DiagnosisInput<'a> {
    pub raw_log: &'a str,
    pub job_name: Option<&'a str>,
    pub fault_localization_enabled: bool,
    pub strategy_shift_banner: Option<&'a str>,
    pub byte_budget: usize,
}

/// Runs stages 1-6 (stage 7, reproduction inference, is invoked
/// separately by the Analysis/Planning handlers once a diagnosis exists,
/// since it may need workspace/workflow context the pipeline itself
/// doesn't have).
pub async fn diagnose(
    model: &dyn LanguageModel,
    retry: &llm::RetryConfig,
    input: DiagnosisInput<'_>,
) -> Diagnosis {
    match run_stages(model, retry, &input).await {
        Ok(diagnosis) => diagnosis,
        Err(_) => Diagnosis::failed("Diagnosis Failed"),
    }
}

async fn run_stages(
    model: &dyn LanguageModel,
    retry: &llm::RetryConfig,
    input: &DiagnosisInput<'_>,
) -> crate::error::Result<Diagnosis> {
    // Stage 1: Filter.
    let filtered = filter::filter_logs(input.raw_log);
    let thinned = smart_thin_log(&filtered, 200);

    // Stage 2: Summarize.
    let summary = summarize::summarize(&thinned, input.job_name);

    // Stage 3: Localize.
    let frames = summarize::parse_stack_frames(&thinned);
    let localization = if input.fault_localization_enabled {
        summarize::localize(model, retry, &thinned, &frames).await?
    } else {
        None
    };

    // Stage 4: LM Diagnose — assemble via the byte-budgeted Context
    // Manager so a strategy-shift banner always outranks log content.
    let mut context = ContextManager::new(input.byte_budget);
    if let Some(banner) = input.strategy_shift_banner {
        context.add(ContextItem::new(
            "strategy-shift",
            ItemType::Text,
            Priority::Critical,
            banner,
        ));
    }
    context.add(ContextItem::new(
        "summary",
        ItemType::Text,
        Priority::High,
        &summary.sentence,
    ));
    context.add(ContextItem::new(
        "log",
        ItemType::Log,
        Priority::Medium,
        &thinned,
    ));

    let prompt = format!(
        "Diagnose this CI failure and respond with a strict JSON object with fields \
         {{summary, filePath, fixAction, suggestedCommand?, reproductionCommand?, confidence}}.\n\n{}",
        context.compile()
    );
    let bundle = PromptBundle::new(vec![Message::human(prompt)]).json();
    let response = llm::generate_with_retry(model, bundle, retry).await?;

    let raw: RawLmDiagnosis = serde_json::from_str(&response.text)
        .map_err(|e| crate::error::OrchestratorError::DiagnosisFailed(e.to_string()))?;

    // Stage 5: Sanitize suggestedCommand.
    let suggested_command = raw
        .suggested_command
        .as_deref()
        .map(sanitize::clean_suggested_command)
        .filter(|s| !s.is_empty());

    // Stage 6: Path cleaning.
    let file_path = localization
        .map(|l| l.file)
        .or(raw.file_path)
        .map(|p| filter::clean_file_path(&p))
        .filter(|p| !p.is_empty());

    let fix_action = match raw.fix_action.as_deref() {
        Some("command") => FixAction::Command,
        Some("create") => FixAction::Create,
        _ => FixAction::Edit,
    };

    Ok(Diagnosis {
        summary: raw.summary,
        file_path,
        fix_action: Some(fix_action),
        suggested_command,
        reproduction_command: raw.reproduction_command,
        confidence: raw.confidence,
        kind: None,
    })
}
