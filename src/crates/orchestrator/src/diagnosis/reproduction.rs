//! Stage 7 (Reproduction-command inference): the five-strategy cascade run
//! when `Diagnosis.reproductionCommand` is absent, in order, stopping on
//! the first strategy that returns a non-empty command.

use regex::Regex;

use crate::ports::LanguageModel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    WorkflowExtraction,
    SignatureMatch,
    ManifestMapping,
    LmRetry,
    SafeScan,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::WorkflowExtraction => "workflow_extraction",
            Strategy::SignatureMatch => "signature_match",
            Strategy::ManifestMapping => "manifest_mapping",
            Strategy::LmRetry => "lm_retry",
            Strategy::SafeScan => "safe_scan",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReproductionInferenceResult {
    pub command: String,
    pub confidence: f64,
    pub strategy: Strategy,
    pub reasoning: String,
}

/// Known test-runner invocations keyed by a signature pattern matched
/// against the raw failing log (strategy b).
const SIGNATURE_PATTERNS: &[(&str, &str)] = &[
    ("pytest", "pytest"),
    ("jest", "npx jest"),
    ("vitest", "npx vitest run"),
    ("go test", "go test ./..."),
    ("cargo test", "cargo test"),
];

/// Build manifests mapped to their canonical test command (strategy c).
const MANIFEST_COMMANDS: &[(&str, &str)] = &[
    ("package.json", "npm test"),
    ("Cargo.toml", "cargo test"),
    ("pyproject.toml", "pytest"),
    ("go.mod", "go test ./..."),
];

/// (a) extract a reproduction hint from the originating workflow file's
/// `run:` steps.
pub fn from_workflow_file(workflow_yaml: &str) -> Option<ReproductionInferenceResult> {
    let re = Regex::new(r"(?m)^\s*run:\s*(.+)$").ok()?;
    let command = re.captures(workflow_yaml)?.get(1)?.as_str().trim().to_string();
    if command.is_empty() {
        return None;
    }
    Some(ReproductionInferenceResult {
        command,
        confidence: 0.8,
        strategy: Strategy::WorkflowExtraction,
        reasoning: "extracted from failing workflow step".to_string(),
    })
}

/// (b) signature match against well-known test-runner invocation patterns
/// found anywhere in the log.
pub fn from_signature_match(log: &str) -> Option<ReproductionInferenceResult> {
    let lower = log.to_lowercase();
    for (signature, command) in SIGNATURE_PATTERNS {
        if lower.contains(signature) {
            return Some(ReproductionInferenceResult {
                command: command.to_string(),
                confidence: 0.6,
                strategy: Strategy::SignatureMatch,
                reasoning: format!("log references {signature}"),
            });
        }
    }
    None
}

/// (c) detect a build manifest among workspace file names and map it to
/// its canonical test command.
pub fn from_manifest(workspace_files: &[String]) -> Option<ReproductionInferenceResult> {
    for (manifest, command) in MANIFEST_COMMANDS {
        if workspace_files.iter().any(|f| f.ends_with(manifest)) {
            return Some(ReproductionInferenceResult {
                command: command.to_string(),
                confidence: 0.5,
                strategy: Strategy::ManifestMapping,
                reasoning: format!("found {manifest} in workspace"),
            });
        }
    }
    None
}

/// (d) LM-retry with the repo manifest as context.
pub async fn from_lm_retry(
    model: &dyn LanguageModel,
    retry: &llm::RetryConfig,
    manifest_excerpt: &str,
) -> crate::error::Result<Option<ReproductionInferenceResult>> {
    use langgraph_core::Message;
    use llm::PromptBundle;

    let prompt = format!(
        "Given this project manifest, what single shell command would run this \
         project's test suite? Respond with just the command.\n\n{manifest_excerpt}"
    );
    let bundle = PromptBundle::new(vec![Message::human(prompt)]);
    let response = llm::generate_with_retry(model, bundle, retry).await?;
    let command = response.text.trim().to_string();
    if command.is_empty() {
        return Ok(None);
    }
    Ok(Some(ReproductionInferenceResult {
        command,
        confidence: 0.4,
        strategy: Strategy::LmRetry,
        reasoning: "inferred from manifest via LM".to_string(),
    }))
}

/// (e) safe-scan: find a root-level test file or conventional `tests/`
/// directory and return a best-effort invocation.
pub fn from_safe_scan(workspace_files: &[String]) -> Option<ReproductionInferenceResult> {
    if let Some(path) = workspace_files
        .iter()
        .find(|f| !f.contains('/') && f.starts_with("test") && f.ends_with(".py"))
    {
        return Some(ReproductionInferenceResult {
            command: format!("python {path}"),
            confidence: 0.2,
            strategy: Strategy::SafeScan,
            reasoning: format!("found root-level test file {path}"),
        });
    }
    if workspace_files.iter().any(|f| f.starts_with("tests/")) {
        return Some(ReproductionInferenceResult {
            command: "tests/".to_string(),
            confidence: 0.1,
            strategy: Strategy::SafeScan,
            reasoning: "found conventional tests/ directory".to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_extraction_pulls_run_step() {
        let yaml = "steps:\n  - name: test\n    run: pytest tests/\n";
        let result = from_workflow_file(yaml).unwrap();
        assert_eq!(result.command, "pytest tests/");
        assert_eq!(result.strategy, Strategy::WorkflowExtraction);
    }

    #[test]
    fn signature_match_detects_known_runner() {
        let log = "Running jest suite...\nFAIL src/app.test.ts";
        let result = from_signature_match(log).unwrap();
        assert_eq!(result.command, "npx jest");
    }

    #[test]
    fn manifest_mapping_prefers_first_match() {
        let files = vec!["Cargo.toml".to_string(), "package.json".to_string()];
        let result = from_manifest(&files).unwrap();
        assert_eq!(result.command, "npm test");
    }

    #[test]
    fn safe_scan_finds_root_test_file() {
        let files = vec!["README.md".to_string(), "test.py".to_string()];
        let result = from_safe_scan(&files).unwrap();
        assert_eq!(result.command, "python test.py");
        assert_eq!(result.strategy, Strategy::SafeScan);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn safe_scan_returns_none_when_nothing_found() {
        let files = vec!["README.md".to_string()];
        assert!(from_safe_scan(&files).is_none());
    }

    #[test]
    fn reproduction_inference_cascade_falls_through_to_safe_scan() {
        // No workflow hint, no signature match, no manifest mapping — but
        // the root contains test.py.
        let log = "plain build output with no test-runner signature";
        let files = vec!["test.py".to_string(), "main.py".to_string()];
        assert!(from_signature_match(log).is_none());
        assert!(from_manifest(&files).is_none());
        let result = from_safe_scan(&files).unwrap();
        assert_eq!(result.command, "python test.py");
        assert_eq!(result.strategy, Strategy::SafeScan);
        assert!(result.confidence > 0.0);
    }
}
