//! Stage 2 (Summarize) and Stage 3 (Localize) of the Diagnosis Pipeline.

use regex::Regex;

use crate::error::Result;
use crate::ports::LanguageModel;
use langgraph_core::Message;
use llm::{GenerationConfig, PromptBundle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct LogSummary {
    pub exit_code: Option<i32>,
    pub job_name: Option<String>,
    pub error_keyword_count: usize,
    pub sentence: String,
}

/// Heuristic extraction: exit code, failing job name, and a count of
/// error-keyword occurrences, folded into a one-sentence summary.
pub fn summarize(filtered_log: &str, job_name: Option<&str>) -> LogSummary {
    let exit_code = extract_exit_code(filtered_log);
    let error_keyword_count = filtered_log.to_lowercase().matches("error").count()
        + filtered_log.to_lowercase().matches("fail").count();

    let sentence = match (job_name, exit_code) {
        (Some(job), Some(code)) => {
            format!("Job \"{job}\" failed with exit code {code} ({error_keyword_count} error indicators found)")
        }
        (Some(job), None) => {
            format!("Job \"{job}\" failed ({error_keyword_count} error indicators found)")
        }
        (None, Some(code)) => {
            format!("Build failed with exit code {code} ({error_keyword_count} error indicators found)")
        }
        (None, None) => format!("Build failed ({error_keyword_count} error indicators found)"),
    };

    LogSummary {
        exit_code,
        job_name: job_name.map(str::to_string),
        error_keyword_count,
        sentence,
    }
}

fn extract_exit_code(log: &str) -> Option<i32> {
    let re = Regex::new(r"(?i)exit(?:ed)?\s*(?:code|status)?\s*[:=]?\s*(\d+)").ok()?;
    re.captures(log)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

#[derive(Debug, Clone)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
}

/// Parses stack frames out of an already-filtered log, accepting both
/// Python (`File "x.py", line 12`) and JS/TS (`at foo (x.ts:12:4)`) shapes.
pub fn parse_stack_frames(filtered_log: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let python_re = Regex::new(r#"File "([^"]+)", line (\d+)"#).unwrap();
    let js_re = Regex::new(r"at .*?\(?([^\s():]+):(\d+):\d+\)?").unwrap();

    for caps in python_re.captures_iter(filtered_log) {
        if let Ok(line) = caps[2].parse::<u32>() {
            frames.push(StackFrame {
                file: caps[1].to_string(),
                line,
            });
        }
    }
    for caps in js_re.captures_iter(filtered_log) {
        if let Ok(line) = caps[2].parse::<u32>() {
            frames.push(StackFrame {
                file: caps[1].to_string(),
                line,
            });
        }
    }
    frames
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub file: String,
    pub line: u32,
    pub confidence: f64,
}

const LOCALIZATION_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Calls the LM to refine a `{file, line, confidence}` guess from parsed
/// stack frames. Returns `None` when there are no frames to refine, or
/// when the LM's confidence doesn't clear the threshold that licenses
/// overriding `Diagnosis.filePath`.
pub async fn localize(
    model: &dyn LanguageModel,
    retry: &llm::RetryConfig,
    filtered_log: &str,
    frames: &[StackFrame],
) -> Result<Option<LocalizationResult>> {
    if frames.is_empty() {
        return Ok(None);
    }

    let frame_list = frames
        .iter()
        .map(|f| format!("{}:{}", f.file, f.line))
        .collect::<Vec<_>>()
        .join(", ");
    let prompt = format!(
        "Given this failing log and candidate stack frames [{frame_list}], return the single \
         most likely fault location as JSON {{file, line, confidence}}.\n\nLog:\n{filtered_log}"
    );

    let bundle = PromptBundle::new(vec![Message::human(prompt)])
        .json()
        .with_config(GenerationConfig {
            temperature: Some(0.0),
            max_tokens: Some(256),
        });
    let response = llm::generate_with_retry(model, bundle, retry).await?;
    let parsed: LocalizationResult = match serde_json::from_str(&response.text) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    if parsed.confidence > LOCALIZATION_CONFIDENCE_THRESHOLD {
        Ok(Some(parsed))
    } else {
        Ok(None)
    }
}
