//! Runtime types for tool execution.
//!
//! This module provides the request/response shapes used between the
//! orchestrator's sandbox boundary and whatever executes a command inside
//! it, plus the [`context`] and [`error`] submodules describing the
//! execution environment a command runs in.

pub mod context;
pub mod error;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool name/identifier.
    pub tool: String,

    /// Tool arguments.
    pub args: HashMap<String, serde_json::Value>,

    /// Request ID for tracking.
    pub request_id: Option<String>,

    /// Session ID for context.
    pub session_id: Option<String>,

    /// Request metadata.
    pub metadata: HashMap<String, String>,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: HashMap::new(),
            request_id: None,
            session_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Response from tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool: String,
    pub request_id: Option<String>,
    pub status: ToolStatus,
    pub ok: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub duration_ms: Option<u64>,
    pub metadata: HashMap<String, String>,
}

impl ToolResponse {
    pub fn success(tool: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            request_id: None,
            status: ToolStatus::Success,
            ok: true,
            result: Some(result),
            error: None,
            warnings: Vec::new(),
            duration_ms: None,
            metadata: HashMap::new(),
        }
    }

    pub fn error(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            request_id: None,
            status: ToolStatus::Error,
            ok: false,
            result: None,
            error: Some(error.into()),
            warnings: Vec::new(),
            duration_ms: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Tool execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_request_builder_sets_fields() {
        let request = ToolRequest::new("test_tool")
            .with_arg("arg1", json!("value1"))
            .with_session_id("session123")
            .with_metadata("key1", "meta1");

        assert_eq!(request.tool, "test_tool");
        assert_eq!(request.args.len(), 1);
        assert_eq!(request.session_id, Some("session123".to_string()));
        assert_eq!(request.metadata.get("key1"), Some(&"meta1".to_string()));
    }

    #[test]
    fn tool_response_success_sets_ok() {
        let response = ToolResponse::success("test_tool", json!({"result": "data"}));
        assert_eq!(response.status, ToolStatus::Success);
        assert!(response.ok);
        assert!(response.error.is_none());
    }

    #[test]
    fn tool_response_error_sets_message() {
        let response = ToolResponse::error("test_tool", "boom");
        assert_eq!(response.status, ToolStatus::Error);
        assert!(!response.ok);
        assert_eq!(response.error, Some("boom".to_string()));
    }
}
