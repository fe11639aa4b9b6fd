//! Execution node: applies the diagnosis's fix, either by running a
//! shell command (with one self-heal retry for a missing tool) or by
//! editing a file.

use regex::Regex;

use langgraph_core::Message;
use llm::PromptBundle;
use tooling::validation::Validator;

use crate::state::{FileChange, GraphState, GraphStateDelta, NodeName};

use super::context::NodeContext;

/// Maps a missing-tool name (as it appears in a `command not found`
/// message) to the Debian/Ubuntu package that provides it.
const SELF_HEAL_PACKAGES: &[(&str, &str)] = &[
    ("docker", "docker.io"),
    ("pip", "python3-pip"),
    ("npm", "nodejs"),
    ("git", "git"),
    ("curl", "curl"),
    ("zip", "zip"),
    ("unzip", "unzip"),
];

const MISSING_TOOL_EXIT_CODE: i32 = 127;

pub async fn run(state: &GraphState, ctx: &NodeContext<'_>) -> GraphStateDelta {
    let Some(diagnosis) = state.diagnosis.clone() else {
        return GraphStateDelta {
            current_node: Some(NodeName::Analysis),
            feedback_append: vec!["Execution Failed: no diagnosis to act on".into()],
            ..Default::default()
        };
    };

    match diagnosis.fix_action {
        Some(crate::state::FixAction::Command) => {
            run_command_fix(diagnosis.suggested_command.as_deref().unwrap_or(""), ctx).await
        }
        _ => run_edit_fix(state, &diagnosis, ctx).await,
    }
}

async fn run_command_fix(command: &str, ctx: &NodeContext<'_>) -> GraphStateDelta {
    if command.is_empty() {
        return GraphStateDelta {
            current_node: Some(NodeName::Analysis),
            feedback_append: vec!["Execution Failed: empty suggested command".into()],
            ..Default::default()
        };
    }

    let output = match ctx.sandbox.run_command(command).await {
        Ok(o) => o,
        Err(e) => {
            return GraphStateDelta {
                current_node: Some(NodeName::Analysis),
                feedback_append: vec![format!("Execution Failed: {e}")],
                ..Default::default()
            };
        }
    };

    if output.succeeded() {
        return GraphStateDelta {
            current_node: Some(NodeName::Verification),
            ..Default::default()
        };
    }

    if output.exit_code == MISSING_TOOL_EXIT_CODE {
        if let Some(tool) = missing_tool_name(&output.stderr) {
            if let Some(package) = self_heal_package(&tool) {
                let install_cmd = format!("apt-get update && apt-get install -y {package}");
                if ctx.sandbox.run_command(&install_cmd).await.is_ok() {
                    if let Ok(retry) = ctx.sandbox.run_command(command).await {
                        if retry.succeeded() {
                            return GraphStateDelta {
                                current_node: Some(NodeName::Verification),
                                ..Default::default()
                            };
                        }
                        return command_failed_feedback(&retry);
                    }
                }
            }
        }
    }

    command_failed_feedback(&output)
}

fn command_failed_feedback(output: &crate::sandbox::CommandOutput) -> GraphStateDelta {
    GraphStateDelta {
        current_node: Some(NodeName::Analysis),
        feedback_append: vec![format!(
            "Command Failed (Exit Code {}): stdout {} stderr {}",
            output.exit_code, output.stdout, output.stderr
        )],
        ..Default::default()
    }
}

fn missing_tool_name(stderr: &str) -> Option<String> {
    let re = Regex::new(r": ([A-Za-z0-9_.-]+): (command )?not found").ok()?;
    re.captures(stderr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn self_heal_package(tool: &str) -> Option<&'static str> {
    SELF_HEAL_PACKAGES
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, pkg)| *pkg)
}

async fn run_edit_fix(
    state: &GraphState,
    diagnosis: &crate::state::Diagnosis,
    ctx: &NodeContext<'_>,
) -> GraphStateDelta {
    let Some(path) = diagnosis.file_path.clone() else {
        return GraphStateDelta {
            current_node: Some(NodeName::Analysis),
            feedback_append: vec!["Execution Failed: no file path on diagnosis".into()],
            ..Default::default()
        };
    };

    let matches = match ctx.file_discovery.find_by_name(file_name(&path)).await {
        Ok(m) => m,
        Err(e) => {
            return GraphStateDelta {
                current_node: Some(NodeName::Analysis),
                feedback_append: vec![format!("Execution Failed: {e}")],
                ..Default::default()
            };
        }
    };

    if matches.len() > 1 {
        let listed = matches.join(", ");
        ctx.hallucinations.lock().unwrap().record(&path);
        return GraphStateDelta {
            current_node: Some(NodeName::Analysis),
            feedback_append: vec![format!(
                "Path Hallucination: Multiple files named {} found: {}",
                file_name(&path),
                listed
            )],
            ..Default::default()
        };
    }

    if matches.is_empty() {
        let exists = ctx.file_discovery.exists(&path).await.unwrap_or(false);
        if !exists {
            ctx.hallucinations.lock().unwrap().record(&path);
            return GraphStateDelta {
                current_node: Some(NodeName::Analysis),
                feedback_append: vec![format!("Path Hallucination: {path} does not exist")],
                ..Default::default()
            };
        }
    }

    let resolved_path = matches.into_iter().next().unwrap_or(path);

    let original = ctx
        .sandbox
        .read_file(&resolved_path)
        .await
        .unwrap_or_default();

    let prompt = format!(
        "Apply this fix to `{}`. Respond with the complete, corrected file contents \
         inside a single fenced code block and nothing else.\n\nDiagnosis: {}\n\n\
         Current contents:\n{}",
        resolved_path, diagnosis.summary, original
    );
    let bundle = PromptBundle::new(vec![Message::human(prompt)]);
    let response = match llm::generate_with_retry(ctx.model, bundle, ctx.retry).await {
        Ok(r) => r,
        Err(e) => {
            return GraphStateDelta {
                current_node: Some(NodeName::Analysis),
                feedback_append: vec![format!("Execution Failed: {e}")],
                ..Default::default()
            };
        }
    };

    let modified = match extract_code_block(&response.text) {
        Some(code) => code,
        None => {
            return GraphStateDelta {
                current_node: Some(NodeName::Analysis),
                feedback_append: vec![
                    "Execution Failed: no fenced code block in fix response".into(),
                ],
                ..Default::default()
            };
        }
    };

    if let Err(e) = lint_fix(&modified) {
        return GraphStateDelta {
            feedback_append: vec![format!("Lint Error: {e}")],
            ..Default::default()
        };
    }

    if let Err(e) = ctx.sandbox.write_file(&resolved_path, &modified).await {
        return GraphStateDelta {
            current_node: Some(NodeName::Analysis),
            feedback_append: vec![format!("Execution Failed: {e}")],
            ..Default::default()
        };
    }

    ctx.persistence
        .record_file_modification(ctx.group_id, &resolved_path)
        .await;

    let file_change = FileChange::new(resolved_path.clone(), original, modified);

    let next_node = if let (Some(dag), Some(node_id)) = (&state.error_dag, &state.current_node_id)
    {
        let _ = (dag, node_id);
        NodeName::Planning
    } else {
        NodeName::Verification
    };

    GraphStateDelta {
        current_node: Some(next_node),
        files: vec![file_change.clone()],
        active_file_change: Some(Some(file_change)),
        ..Default::default()
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Only a fenced code block counts as a proposed edit; prose surrounding
/// it is never treated as file content.
fn extract_code_block(text: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[a-zA-Z0-9]*\n(.*?)```").ok()?;
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Rejects an empty fix or one still carrying unresolved merge-conflict
/// markers before it ever reaches the sandbox.
fn lint_fix(content: &str) -> Result<(), String> {
    Validator::new(content.to_string(), "fix")
        .not_empty()
        .custom(|v: &String| {
            if v.contains("<<<<<<<") || v.contains(">>>>>>>") {
                Err("leftover merge-conflict marker".to_string())
            } else {
                Ok(())
            }
        })
        .validate()
        .map_err(|e| e.to_string())?;
    Ok(())
}
