//! The `LanguageModel` collaborator port.
//!
//! This crate defines the shape every language model the repair orchestrator
//! talks to must satisfy: a single `generate` call taking a prompt bundle and
//! returning a complete value (a provider may stream internally, but callers
//! never see partial output). No concrete provider adapter (Claude, OpenAI,
//! Ollama, ...) lives here — those are named out of scope, the same way the
//! orchestrator itself never knows which provider is behind the trait object
//! it was handed.
//!
//! ```rust,ignore
//! use llm::{LanguageModel, PromptBundle};
//! use langgraph_core::Message;
//!
//! async fn ask(model: &dyn LanguageModel) -> llm::Result<String> {
//!     let bundle = PromptBundle::new(vec![Message::human("What is Rust?")]);
//!     let response = model.generate(bundle).await?;
//!     Ok(response.text)
//! }
//! ```

pub mod config;
pub mod error;

use async_trait::async_trait;
use langgraph_core::Message;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub use config::{GenerationConfig, RetryConfig};
pub use error::{LlmError, Result};

/// Whether the model should return free text or a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A tool the model may choose to invoke instead of (or alongside) text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Usage/latency metadata returned alongside generated text, purely for
/// observability — nothing downstream branches on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    #[serde(with = "duration_millis")]
    pub latency: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Everything a `LanguageModel::generate` call needs: the conversation so
/// far, which model to address (provider-specific default if `None`), any
/// generation knobs, the expected response shape, and whether the caller
/// wants the response schema-validated before it comes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBundle {
    pub contents: Vec<Message>,
    pub model: Option<String>,
    pub config: Option<GenerationConfig>,
    pub response_format: ResponseFormat,
    pub validate: Option<bool>,
}

impl PromptBundle {
    pub fn new(contents: Vec<Message>) -> Self {
        Self {
            contents,
            model: None,
            config: None,
            response_format: ResponseFormat::Text,
            validate: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }
}

/// What a `LanguageModel` returns for a single `generate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub metrics: Option<GenerationMetrics>,
}

impl GenerationResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            metrics: None,
        }
    }
}

/// The collaborator port the orchestrator's diagnosis pipeline and node
/// handlers call through. A provider implementation may stream tokens
/// internally but must resolve `generate` to a single complete value.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, bundle: PromptBundle) -> Result<GenerationResponse>;
}

/// Calls `model.generate` with bounded exponential-backoff retry on
/// transient errors (network, 5xx, rate limit, timeout), matching the
/// "retry transient network/5xx with exponential backoff up to 3 attempts"
/// requirement every caller of this port must honor.
pub async fn generate_with_retry(
    model: &dyn LanguageModel,
    bundle: PromptBundle,
    retry: &RetryConfig,
) -> Result<GenerationResponse> {
    let mut attempt = 0;
    loop {
        let started = Instant::now();
        match model.generate(bundle.clone()).await {
            Ok(mut response) => {
                if response.metrics.is_none() {
                    response.metrics = Some(GenerationMetrics {
                        prompt_tokens: None,
                        completion_tokens: None,
                        latency: started.elapsed(),
                    });
                }
                return Ok(response);
            }
            Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                tracing::warn!(attempt, error = %err, "retrying language model call");
                tokio::time::sleep(retry.backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
