//! Minimal chat-message types for building LM prompt bundles.
//!
//! Just enough structure for the orchestrator's context manager and
//! diagnosis pipeline to assemble a `LanguageModel` prompt out of
//! system/human/assistant turns, plus a reducer for appending new turns to a
//! running history without duplicating by id.

use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Instructions/context given to the model.
    System,
    /// A human (or orchestrator, acting on behalf of one) turn.
    Human,
    /// A model response turn.
    Ai,
    /// The result of a tool/command invocation.
    Tool,
}

/// A single turn in a conversation with a language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable id, used by [`add_messages`] to detect replacement vs. append.
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Ai, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Rough byte length used by byte-budgeted context assembly; this
    /// crate does not do model-specific token counting.
    pub fn byte_len(&self) -> usize {
        self.content.len()
    }
}

/// Merge `new` into `existing`, replacing any message whose id already
/// appears in `existing` and appending the rest in order. Dedup-by-id
/// semantics without the deletion-sentinel machinery a full reducer
/// would need.
pub fn add_messages(existing: Vec<Message>, new: Vec<Message>) -> Vec<Message> {
    let mut merged = existing;

    for msg in new {
        if let Some(id) = &msg.id {
            if let Some(pos) = merged.iter().position(|m| m.id.as_deref() == Some(id)) {
                merged[pos] = msg;
                continue;
            }
        }
        merged.push(msg);
    }

    merged
}
