//! Generation and retry configuration for `LanguageModel` callers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call generation parameters, attached to a `PromptBundle`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Retry policy for a `LanguageModel::generate` call.
///
/// Grounds the same exponential-backoff-with-jitter shape the orchestrator
/// uses for its own transient-error retries, so both layers read the same
/// way; this copy is self-contained so the `llm` crate has no dependency on
/// `tooling`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before the given attempt (0-indexed), with +/-25% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval.as_secs_f64());
        let jitter = rand::random::<f64>() * 0.5 + 0.75; // 0.75..=1.25
        Duration::from_secs_f64(capped * jitter)
    }
}
